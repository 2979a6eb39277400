//! Ports for the third-party services the bot relays to.
//!
//! Every operation returns display text. Failures come back as text tagged
//! with the service (`[Gemini Error] ...`, `[Weather Error] ...`,
//! `[Hariku API Error] ...`), never as `Err`, so handlers can forward the
//! answer to chat unchanged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::history::HistoryEntry;

#[async_trait]
pub trait AiService: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn current_model(&self) -> String;

    /// Answer `prompt`, giving the model `history` (oldest first) as prior turns.
    async fn generate(&self, prompt: &str, history: &[HistoryEntry]) -> String;
    async fn generate_welcome(&self, nickname: &str) -> String;

    async fn list_models(&self) -> Vec<String>;
    /// Switch model; `false` leaves the previous model in place.
    async fn set_model(&self, name: &str) -> bool;
    /// Replace the API key; the key is validated and reverted on failure.
    async fn set_api_key(&self, key: &str) -> bool;

    fn set_system_instructions(&self, text: &str);
    fn set_welcome_instructions(&self, text: &str);
}

#[async_trait]
pub trait WeatherService: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn weather(&self, location: &str) -> String;
}

#[async_trait]
pub trait QuoteService: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn random_quote(&self, lang: &str) -> String;
    async fn quote_by_id(&self, id: u32, lang: &str) -> String;

    async fn today_events(&self, country: &str) -> String;
    async fn events_by_date(&self, country: &str, date: &str) -> String;
    async fn events_by_week(&self, country: &str, date: &str) -> String;
    async fn events_by_month(&self, country: &str, month: &str) -> String;
    async fn events_by_year(&self, country: &str, year: &str) -> String;
    async fn search_events(&self, country: &str, query: &str) -> String;

    async fn set_api_key(&self, key: &str) -> bool;
}

/// Service handles shared by every bot instance built by the supervisor.
#[derive(Clone)]
pub struct Services {
    pub ai: Arc<dyn AiService>,
    pub weather: Arc<dyn WeatherService>,
    pub quotes: Arc<dyn QuoteService>,
}
