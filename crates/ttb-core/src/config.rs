use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{errors::Error, Result};

/// Typed configuration, persisted as TOML with `[connection]` and `[bot]`
/// sections. Missing keys fall back to the defaults below.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub bot: BotSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub channel: String,
    pub channel_password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10333,
            username: "guest".to_string(),
            password: String::new(),
            nickname: "PyBot+".to_string(),
            channel: "/".to_string(),
            channel_password: String::new(),
        }
    }
}

/// How the bot greets users joining its channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WelcomeMode {
    #[default]
    #[serde(rename = "template")]
    Template,
    #[serde(rename = "gemini", alias = "ai")]
    Ai,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub client_name: String,
    #[serde(deserialize_with = "list_or_csv")]
    pub admin_usernames: Vec<String>,
    pub gemini_api_key: String,
    pub gemini_model_name: String,
    pub status_message: String,
    pub reconnect_delay_min: u64,
    pub reconnect_delay_max: u64,
    pub weather_api_key: String,
    pub hariku_api_key: String,
    #[serde(deserialize_with = "list_or_csv")]
    pub filtered_words: Vec<String>,
    pub context_history_retention_minutes: u64,
    pub context_history_max_messages: usize,
    pub context_history_enabled: bool,
    pub debug_logging_enabled: bool,
    pub ai_system_instructions: String,
    pub welcome_message_instructions: String,
    pub announce_join_leave: bool,
    pub allow_channel_messages: bool,
    pub allow_broadcast: bool,
    pub allow_ai_pm: bool,
    pub allow_ai_channel: bool,
    /// Unset means "on when the word list is non-empty".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_enabled: Option<bool>,
    pub welcome_message_mode: WelcomeMode,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            client_name: "AI bot".to_string(),
            admin_usernames: Vec::new(),
            gemini_api_key: String::new(),
            gemini_model_name: "gemini-1.5-flash-latest".to_string(),
            status_message: String::new(),
            reconnect_delay_min: 5,
            reconnect_delay_max: 15,
            weather_api_key: String::new(),
            hariku_api_key: String::new(),
            filtered_words: Vec::new(),
            context_history_retention_minutes: 60,
            context_history_max_messages: 40,
            context_history_enabled: true,
            debug_logging_enabled: false,
            ai_system_instructions: String::new(),
            welcome_message_instructions: String::new(),
            announce_join_leave: true,
            allow_channel_messages: true,
            allow_broadcast: true,
            allow_ai_pm: true,
            allow_ai_channel: true,
            filter_enabled: None,
            welcome_message_mode: WelcomeMode::Template,
        }
    }
}

impl Settings {
    /// Parse a TOML document. Both sections must be present; keys inside them
    /// are optional.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            connection: Option<ConnectionSettings>,
            bot: Option<BotSettings>,
        }

        let raw: Raw = toml::from_str(s)?;
        let connection = raw
            .connection
            .ok_or_else(|| Error::Config("missing [connection] section".to_string()))?;
        let bot = raw
            .bot
            .ok_or_else(|| Error::Config("missing [bot] section".to_string()))?;

        let mut settings = Self { connection, bot };
        settings.normalize();
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Secrets from the environment (non-empty values) replace file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_str("GEMINI_API_KEY").and_then(non_empty) {
            self.bot.gemini_api_key = v;
        }
        if let Some(v) = env_str("WEATHER_API_KEY").and_then(non_empty) {
            self.bot.weather_api_key = v;
        }
        if let Some(v) = env_str("HARIKU_API_KEY").and_then(non_empty) {
            self.bot.hariku_api_key = v;
        }
        if let Some(v) = env_str("TTB_PASSWORD").and_then(non_empty) {
            self.connection.password = v;
        }
    }

    fn normalize(&mut self) {
        let bot = &mut self.bot;
        if bot.reconnect_delay_min > bot.reconnect_delay_max {
            std::mem::swap(&mut bot.reconnect_delay_min, &mut bot.reconnect_delay_max);
        }
        bot.admin_usernames = clean_list(std::mem::take(&mut bot.admin_usernames), false);
        bot.filtered_words = clean_list(std::mem::take(&mut bot.filtered_words), true);
    }
}

// ============== Store ==============

/// Where settings are loaded from and written back to.
///
/// Saves always write the full snapshot.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// TOML file on disk.
#[derive(Clone, Debug)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlFileStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.is_file() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                self.path.display()
            )));
        }
        let text = fs::read_to_string(&self.path)?;
        Settings::from_toml_str(&text).map_err(|e| Error::ConfigFile {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let text = settings.to_toml_string()?;
        fs::write(&self.path, text)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// In-memory store (tests, local runs without a file).
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<Settings>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Settings> {
        Ok(self.snapshot())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| Error::Config("settings lock poisoned".to_string()))?;
        *guard = settings.clone();
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}

/// Load `.env` from the working directory when present; existing variables
/// are not overridden. Returns the loaded path, or `None` when there is no file.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    load_dotenv_from(Path::new(".env"))
}

pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
    }
}

fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(v) => v,
        ListOrCsv::Csv(s) => s.split(',').map(|p| p.to_string()).collect(),
    })
}

fn clean_list(items: Vec<String>, lowercase: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let item = if lowercase {
            item.to_lowercase()
        } else {
            item.to_string()
        };
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
