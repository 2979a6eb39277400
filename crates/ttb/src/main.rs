mod cli;
mod shell;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use clap::Parser;
use ttb_core::{
    config::{self, ConfigStore, Settings, TomlFileStore},
    domain::{ChannelId, UserId, UserRights},
    ports::{AiService, Services},
    supervisor::{Supervisor, TransportFactory},
    transport::{
        local::{user, LocalTransport, ROOT_CHANNEL},
        Transport,
    },
};
use ttb_gemini::{GeminiConfig, GeminiService};
use ttb_hariku::HarikuClient;
use ttb_weather::OpenWeatherClient;

const LOG_FILE: &str = "bot.log";
const BOT_ID: UserId = UserId(1);
const OPERATOR_ID: UserId = UserId(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing so `TTB_CONFIG` may come from `.env`; reported once logging is up.
    let dotenv = config::load_dotenv();

    let path = cli::Cli::parse().config;
    let store = Arc::new(TomlFileStore::new(&path));
    let mut settings = store
        .load()
        .with_context(|| format!("loading {}", path.display()))?;
    settings.apply_env_overrides();

    let log = ttb_core::logging::init(
        "ttb",
        Path::new(LOG_FILE),
        settings.bot.debug_logging_enabled,
    )?;
    match dotenv {
        Ok(Some(env_file)) => tracing::debug!(path = %env_file.display(), "loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }
    tracing::info!(config = %path.display(), "starting ttb");

    let services = build_services(&settings).await?;
    let transport = Arc::new(local_server(&settings));

    let factory_transport = transport.clone();
    let factory: TransportFactory =
        Arc::new(move || factory_transport.clone() as Arc<dyn Transport>);

    let (supervisor, handle) = Supervisor::new(store, factory, services, log)?;
    let worker = tokio::spawn(supervisor.run());

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            ctrl_c.shutdown();
        }
    });

    shell::run(handle.clone(), transport, OPERATOR_ID).await?;
    handle.shutdown();

    worker.await.context("supervisor task panicked")??;
    tracing::info!("ttb stopped");
    Ok(())
}

async fn build_services(settings: &Settings) -> anyhow::Result<Services> {
    let bot = &settings.bot;
    let ai = GeminiService::connect(GeminiConfig {
        api_key: bot.gemini_api_key.clone(),
        model_name: bot.gemini_model_name.clone(),
        system_instructions: bot.ai_system_instructions.clone(),
        welcome_instructions: bot.welcome_message_instructions.clone(),
        ..GeminiConfig::default()
    })
    .await;
    tracing::info!(enabled = ai.is_enabled(), "Gemini service ready");

    Ok(Services {
        ai: Arc::new(ai),
        weather: Arc::new(OpenWeatherClient::new(bot.weather_api_key.clone())?),
        quotes: Arc::new(HarikuClient::new(bot.hariku_api_key.clone())?),
    })
}

/// In-process server: a root channel, a lobby and the console operator.
///
/// The operator signs in with the first configured admin username, so admin
/// commands work from the console.
fn local_server(settings: &Settings) -> LocalTransport {
    let rights = UserRights::KICK_USERS
        | UserRights::BAN_USERS
        | UserRights::MOVE_USERS
        | UserRights::TEXTMESSAGE_BROADCAST
        | UserRights::VIEW_ALL_USERS;
    let transport = LocalTransport::new(BOT_ID, rights);
    transport.add_channel(ChannelId(2), ROOT_CHANNEL, "Lobby");

    let username = settings
        .bot
        .admin_usernames
        .first()
        .cloned()
        .unwrap_or_else(|| "operator".to_string());
    transport.add_user(user(OPERATOR_ID.0, "Operator", &username, ROOT_CHANNEL));
    transport
}
