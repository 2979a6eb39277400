//! Gemini adapter (text generation).
//!
//! Talks to the Generative Language REST API (`v1beta`). Model names are kept
//! without the `models/` prefix internally and reported with it.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use ttb_core::{errors::Error, history::HistoryEntry, ports::AiService, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Concurrent generateContent calls allowed at once.
const MAX_CONCURRENT_CALLS: usize = 5;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const NOT_AVAILABLE: &str = "[Gemini Error] Service not available.";
const CONTACT_ERROR: &str = "[Bot Error] Error contacting Gemini.";
const EMPTY_RESPONSE: &str = "[Gemini] (Received an empty response)";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model_name: String,
    pub system_instructions: String,
    pub welcome_instructions: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_name: "gemini-1.5-flash-latest".to_string(),
            system_instructions: String::new(),
            welcome_instructions: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct State {
    api_key: String,
    model: String,
    system_instructions: String,
    welcome_instructions: String,
    enabled: bool,
}

pub struct GeminiService {
    http: reqwest::Client,
    base_url: String,
    state: Mutex<State>,
    permits: Semaphore,
}

impl GeminiService {
    /// Build the client and verify the configured key by listing models.
    ///
    /// A missing or rejected key leaves the service disabled; it can still be
    /// enabled later through [`AiService::set_api_key`].
    pub async fn connect(cfg: GeminiConfig) -> Self {
        let svc = Self::disabled(cfg);
        let key = svc.snapshot().api_key;
        if !key.is_empty() {
            let ok = svc.verify(&key).await;
            svc.update(|s| s.enabled = ok);
        }
        svc
    }

    /// A service that does not talk to the API until a key is set.
    pub fn disabled(cfg: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            state: Mutex::new(State {
                api_key: cfg.api_key,
                model: strip_model_prefix(&cfg.model_name).to_string(),
                system_instructions: cfg.system_instructions,
                welcome_instructions: cfg.welcome_instructions,
                enabled: false,
            }),
            permits: Semaphore::new(MAX_CONCURRENT_CALLS),
        }
    }

    fn snapshot(&self) -> State {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
    }

    async fn verify(&self, key: &str) -> bool {
        match self.fetch_models(key).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Gemini API key verification failed");
                false
            }
        }
    }

    async fn get_json(&self, url: &str, key: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .header("x-goog-api-key", key)
            .send()
            .await
            .map_err(|e| Error::External(format!("gemini request error: {e}")))?;
        read_json(resp).await
    }

    /// Names (with prefix) of models that support generateContent.
    async fn fetch_models(&self, key: &str) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models?pageSize=1000", self.base_url);
        let v = self.get_json(&url, key).await?;
        Ok(generative_model_names(&v))
    }

    async fn model_exists(&self, key: &str, model: &str) -> Result<bool> {
        let url = format!("{}/v1beta/{}", self.base_url, add_model_prefix(model));
        let v = self.get_json(&url, key).await?;
        Ok(v.get("name").and_then(Value::as_str).is_some())
    }

    async fn call_generate(&self, state: &State, body: &Value) -> Result<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::External(format!("gemini semaphore closed: {e}")))?;

        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            add_model_prefix(&state.model)
        );
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &state.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::External(format!("gemini request error: {e}")))?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::External(format!(
            "gemini request failed: {status} {}",
            body.chars().take(200).collect::<String>()
        )));
    }
    resp.json()
        .await
        .map_err(|e| Error::External(format!("gemini json error: {e}")))
}

#[async_trait]
impl AiService for GeminiService {
    fn is_enabled(&self) -> bool {
        self.snapshot().enabled
    }

    fn current_model(&self) -> String {
        add_model_prefix(&self.snapshot().model)
    }

    async fn generate(&self, prompt: &str, history: &[HistoryEntry]) -> String {
        let state = self.snapshot();
        if !state.enabled {
            return NOT_AVAILABLE.to_string();
        }

        let body = request_body(&state.system_instructions, history, prompt);
        match self.call_generate(&state, &body).await {
            Ok(v) => extract_reply(&v),
            Err(e) => {
                tracing::error!(model = %state.model, error = %e, "Gemini call failed");
                CONTACT_ERROR.to_string()
            }
        }
    }

    async fn generate_welcome(&self, nickname: &str) -> String {
        let fallback = format!("Welcome, {nickname}!");
        if !self.is_enabled() {
            return fallback;
        }
        let prompt = welcome_prompt(&self.snapshot().welcome_instructions, nickname);
        let reply = self.generate(&prompt, &[]).await;
        // Tagged replies are errors, not greetings.
        if reply.starts_with('[') || reply.trim().is_empty() {
            fallback
        } else {
            reply.trim().to_string()
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let key = self.snapshot().api_key;
        if key.is_empty() {
            return Vec::new();
        }
        match self.fetch_models(&key).await {
            Ok(models) => models,
            Err(e) => {
                tracing::error!(error = %e, "failed to list Gemini models");
                Vec::new()
            }
        }
    }

    async fn set_model(&self, name: &str) -> bool {
        let state = self.snapshot();
        if state.api_key.is_empty() {
            return false;
        }
        let model = strip_model_prefix(name.trim());
        if model.is_empty() {
            return false;
        }
        match self.model_exists(&state.api_key, model).await {
            Ok(true) => {
                self.update(|s| {
                    s.model = model.to_string();
                    s.enabled = true;
                });
                tracing::info!(model = %model, "Gemini model switched");
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::error!(model = %model, error = %e, "failed to switch Gemini model");
                false
            }
        }
    }

    async fn set_api_key(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        if self.verify(key).await {
            self.update(|s| {
                s.api_key = key.to_string();
                s.enabled = true;
            });
            tracing::info!("Gemini API key replaced");
            true
        } else {
            // Old key stays; the caller switches the AI features off.
            self.update(|s| s.enabled = false);
            false
        }
    }

    fn set_system_instructions(&self, text: &str) {
        self.update(|s| s.system_instructions = text.to_string());
    }

    fn set_welcome_instructions(&self, text: &str) {
        self.update(|s| s.welcome_instructions = text.to_string());
    }
}

// ============== Wire helpers ==============

pub fn strip_model_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

pub fn add_model_prefix(name: &str) -> String {
    if name.is_empty() || name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{name}")
    }
}

fn request_body(system_instructions: &str, history: &[HistoryEntry], prompt: &str) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|e| {
            let role = if e.is_bot { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": e.text }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));

    let safety: Vec<Value> = SAFETY_CATEGORIES
        .iter()
        .map(|c| json!({ "category": c, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
        .collect();

    let mut body = json!({ "contents": contents, "safetySettings": safety });
    if !system_instructions.trim().is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system_instructions }] });
    }
    body
}

fn extract_reply(v: &Value) -> String {
    let text: String = v
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !text.trim().is_empty() {
        return text;
    }

    if let Some(reason) = v
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return format!("[Gemini Error] Request blocked: {reason}");
    }
    EMPTY_RESPONSE.to_string()
}

fn generative_model_names(v: &Value) -> Vec<String> {
    v.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter(|m| {
                    m.get("supportedGenerationMethods")
                        .and_then(Value::as_array)
                        .is_some_and(|methods| {
                            methods.iter().any(|x| x.as_str() == Some("generateContent"))
                        })
                })
                .filter_map(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn welcome_prompt(instructions: &str, nickname: &str) -> String {
    if instructions.trim().is_empty() {
        format!(
            "Write a short, friendly one-sentence welcome for a user named {nickname} \
             who just joined the voice chat channel."
        )
    } else {
        format!("{}\nThe user's nickname is {nickname}.", instructions.trim())
    }
}
