//! Hariku adapter (quotes and public calendar events).
//!
//! Every call is a bearer-authenticated GET returning JSON. Event endpoints
//! return a list of `{ event_name, event_full_date }` objects.

use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use ttb_core::{errors::Error, ports::QuoteService, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.techlabs.lol/hariku";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

const DISABLED: &str = "[Bot] Hariku service is disabled (check API key/library).";
const UNEXPECTED: &str = "[Hariku API Error] An unexpected error occurred.";

/// Request failure, split the way replies are worded.
enum FetchError {
    Request(reqwest::Error),
    Body(reqwest::Error),
}

pub struct HarikuClient {
    api_key: RwLock<String>,
    base_url: String,
    http: reqwest::Client,
}

impl HarikuClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("hariku client build error: {e}")))?;
        Ok(Self {
            api_key: RwLock::new(api_key.into().trim().to_string()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn key(&self) -> String {
        self.api_key.read().map(|k| k.clone()).unwrap_or_default()
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> std::result::Result<Value, FetchError> {
        let url = format!("{}/{path}", self.base_url);
        tracing::debug!(url = %url, "hariku request");
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.key())
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(FetchError::Request)?;
        resp.json().await.map_err(FetchError::Body)
    }

    async fn quote(&self, path: &str, missing: String, failed: &str) -> String {
        if !self.is_enabled() {
            return DISABLED.to_string();
        }
        match self.get(path, &[]).await {
            Ok(data) => format_quote(&data).unwrap_or(missing),
            Err(e) => fetch_failure(e, failed),
        }
    }

    async fn events(&self, path: &str, query: &[(&str, &str)], listing: EventListing<'_>) -> String {
        if !self.is_enabled() {
            return DISABLED.to_string();
        }
        let failed = if listing.is_search() {
            "Failed to fetch search results"
        } else {
            "Failed to fetch events"
        };
        match self.get(path, query).await {
            Ok(data) => listing.render(&data),
            Err(e) => fetch_failure(e, failed),
        }
    }
}

fn fetch_failure(e: FetchError, what: &str) -> String {
    match e {
        FetchError::Request(e) => {
            tracing::error!(error = %e, "hariku request failed");
            format!("[Hariku API Error] {what}: {e}")
        }
        FetchError::Body(e) => {
            tracing::error!(error = %e, "unexpected hariku response");
            UNEXPECTED.to_string()
        }
    }
}

#[async_trait]
impl QuoteService for HarikuClient {
    fn is_enabled(&self) -> bool {
        !self.key().is_empty()
    }

    async fn random_quote(&self, lang: &str) -> String {
        self.quote(
            &format!("quotes/{lang}/random"),
            "[Hariku API] Could not retrieve a quote.".to_string(),
            "Failed to fetch quote",
        )
        .await
    }

    async fn quote_by_id(&self, id: u32, lang: &str) -> String {
        self.quote(
            &format!("quotes/{lang}/id/{id}"),
            format!("[Hariku API] Could not retrieve quote with ID {id}."),
            "Failed to fetch quote by ID",
        )
        .await
    }

    async fn today_events(&self, country: &str) -> String {
        self.events(
            &format!("calendar/{country}/today"),
            &[],
            EventListing::Today { country },
        )
        .await
    }

    async fn events_by_date(&self, country: &str, date: &str) -> String {
        self.events(
            &format!("calendar/{country}/date/{date}"),
            &[],
            EventListing::Date { country, date },
        )
        .await
    }

    async fn events_by_week(&self, country: &str, date: &str) -> String {
        self.events(
            &format!("calendar/{country}/week/{date}"),
            &[],
            EventListing::Week { country, date },
        )
        .await
    }

    async fn events_by_month(&self, country: &str, month: &str) -> String {
        self.events(
            &format!("calendar/{country}/month/{month}"),
            &[],
            EventListing::Period { country, period: month },
        )
        .await
    }

    async fn events_by_year(&self, country: &str, year: &str) -> String {
        self.events(
            &format!("calendar/{country}/year/{year}"),
            &[],
            EventListing::Period { country, period: year },
        )
        .await
    }

    async fn search_events(&self, country: &str, query: &str) -> String {
        self.events(
            &format!("calendar/{country}/search"),
            &[("q", query)],
            EventListing::Search { country, query },
        )
        .await
    }

    /// Probe the random-quote endpoint with `key`; the key is kept only if
    /// the probe succeeds.
    async fn set_api_key(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let probe = self
            .http
            .get(format!("{}/quotes/en/random", self.base_url))
            .bearer_auth(key)
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match probe {
            Ok(_) => {
                if let Ok(mut k) = self.api_key.write() {
                    *k = key.to_string();
                }
                tracing::info!("Hariku API key replaced");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Hariku API key validation failed");
                false
            }
        }
    }
}

// ============== Formatting ==============

pub fn format_quote(data: &Value) -> Option<String> {
    let text = data
        .get("quote_text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?;
    let author = data
        .get("author")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    Some(format!("\"{text}\" - {author}"))
}

/// Which event endpoint a response came from; decides header and line shape.
#[derive(Clone, Copy, Debug)]
pub enum EventListing<'a> {
    Today { country: &'a str },
    Date { country: &'a str, date: &'a str },
    Week { country: &'a str, date: &'a str },
    Period { country: &'a str, period: &'a str },
    Search { country: &'a str, query: &'a str },
}

impl EventListing<'_> {
    fn is_search(&self) -> bool {
        matches!(self, EventListing::Search { .. })
    }

    fn header(&self) -> String {
        match self {
            EventListing::Today { country } => format!("Today's Events in {country}:"),
            EventListing::Date { country, date } => format!("Events on {date} in {country}:"),
            EventListing::Week { country, date } => {
                format!("Events for the week starting {date} in {country}:")
            }
            EventListing::Period { country, period } => format!("Events for {period} in {country}:"),
            EventListing::Search { country, query } => {
                format!("Search results for '{query}' in {country}:")
            }
        }
    }

    fn empty(&self) -> String {
        match self {
            EventListing::Today { country } => format!("No events found for today in {country}."),
            EventListing::Date { country, date } => format!("No events found for {date} in {country}."),
            EventListing::Week { country, date } => {
                format!("No events found for the week starting {date} in {country}.")
            }
            EventListing::Period { country, period } => {
                format!("No events found for {period} in {country}.")
            }
            EventListing::Search { country, query } => {
                format!("No events found for '{query}' in {country}.")
            }
        }
    }

    fn shows_dates(&self) -> bool {
        !matches!(self, EventListing::Today { .. } | EventListing::Date { .. })
    }

    pub fn render(&self, data: &Value) -> String {
        let events = match data.as_array() {
            Some(events) if !events.is_empty() => events,
            _ => return self.empty(),
        };

        let mut lines = vec![self.header()];
        for event in events {
            let name = event
                .get("event_name")
                .and_then(Value::as_str)
                .unwrap_or("None");
            if self.shows_dates() {
                let date = event
                    .get("event_full_date")
                    .and_then(Value::as_str)
                    .filter(|d| !d.is_empty())
                    .unwrap_or("N/A");
                lines.push(format!("- {name} ({date})"));
            } else {
                lines.push(format!("- {name}"));
            }
        }
        lines.join("\n")
    }
}
