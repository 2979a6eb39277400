//! OpenWeatherMap adapter (current conditions, metric units).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use ttb_core::{errors::Error, ports::WeatherService, Result};

pub const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org/data/2.5/weather";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DISABLED: &str = "[Bot] Weather feature is disabled (check API key/library).";

#[derive(Clone, Debug)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenWeatherClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("weather client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl WeatherService for OpenWeatherClient {
    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn weather(&self, location: &str) -> String {
        if !self.is_enabled() {
            return DISABLED.to_string();
        }

        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("appid", self.api_key.as_str()),
                ("q", location),
                ("units", "metric"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!(location = %location, "weather request timed out");
                return format!("[Weather Error] Request timed out for '{location}'.");
            }
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "weather request failed");
                return format!("[Weather Error] Could not fetch weather for '{location}'. Check location.");
            }
        };

        match resp.json::<Value>().await {
            Ok(data) => format_report(&data, location),
            Err(e) => {
                tracing::error!(location = %location, error = %e, "unexpected weather response");
                "[Weather Error] An unexpected error occurred.".to_string()
            }
        }
    }
}

/// Render an OpenWeatherMap `weather` response as one chat line.
pub fn format_report(data: &Value, location: &str) -> String {
    let cod_ok = match data.get("cod") {
        Some(Value::Number(n)) => n.as_i64() == Some(200),
        Some(Value::String(s)) => s == "200",
        _ => false,
    };
    if !cod_ok {
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown API error");
        return format!("[Weather Error] {message}.");
    }

    let description = data
        .pointer("/weather/0/description")
        .and_then(Value::as_str)
        .map(capitalize)
        .unwrap_or_else(|| "N/A".to_string());
    let city = data.get("name").and_then(Value::as_str).unwrap_or(location);
    let country = data
        .pointer("/sys/country")
        .and_then(Value::as_str)
        .unwrap_or("");
    let wind = data
        .pointer("/wind/speed")
        .and_then(Value::as_f64)
        .map(|ms| format!("{:.1} km/h", ms * 3.6))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "Weather in {city}, {country}: {description}. Temp: {}°C (Feels like: {}°C). Humidity: {}%. Wind: {wind}.",
        number(data, "/main/temp"),
        number(data, "/main/feels_like"),
        number(data, "/main/humidity"),
    )
}

fn number(data: &Value, pointer: &str) -> String {
    match data.pointer(pointer) {
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

/// First letter upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
