//! Restart coordinator.
//!
//! Owns the lifetime of bot workers: builds a bot from the stored settings,
//! runs it on its own task, forwards control requests to it, and replaces it
//! on restart. Only one restart may be in flight at a time.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    bot::{Bot, BotControl, BotDeps, SessionExit},
    config::{ConfigStore, Settings},
    history::ContextHistory,
    logging::LogHandle,
    ports::Services,
    session::{Feature, StatusSnapshot},
    transport::Transport,
    Result,
};

/// How long a stopping worker gets before it is declared stuck.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause before rebuilding a worker that exited unexpectedly.
pub const RETRY_DELAY: Duration = Duration::from_secs(15);

const COMMAND_CAPACITY: usize = 32;

/// Creates the transport for each new worker.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

#[derive(Debug)]
enum SupervisorCommand {
    Control(BotControl),
    Restart,
}

/// Cheap handle used by presentation layers.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<StatusSnapshot>,
    restart_in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl SupervisorHandle {
    pub async fn toggle(&self, feature: Feature) -> bool {
        self.send(SupervisorCommand::Control(BotControl::Toggle(feature)))
            .await
    }

    pub async fn set_retention(&self, minutes: u64) -> bool {
        self.send(SupervisorCommand::Control(BotControl::SetRetention(minutes)))
            .await
    }

    /// Ask for a fresh worker. Returns `false` when a restart is already in
    /// progress or the supervisor is gone.
    pub async fn restart(&self) -> bool {
        if self.restart_in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("restart already in progress; request ignored");
            return false;
        }
        if self.send(SupervisorCommand::Restart).await {
            true
        } else {
            self.restart_in_flight.store(false, Ordering::SeqCst);
            false
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    async fn send(&self, cmd: SupervisorCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }
}

pub struct Supervisor {
    store: Arc<dyn ConfigStore>,
    transport: TransportFactory,
    services: Services,
    history: Arc<ContextHistory>,
    log: LogHandle,
    status: watch::Sender<StatusSnapshot>,
    commands: mpsc::Receiver<SupervisorCommand>,
    restart_in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        transport: TransportFactory,
        services: Services,
        log: LogHandle,
    ) -> Result<(Self, SupervisorHandle)> {
        let settings = load_settings(store.as_ref())?;
        let history = Arc::new(ContextHistory::new(
            settings.bot.context_history_retention_minutes,
            settings.bot.context_history_max_messages,
        ));
        let (status, status_rx) = watch::channel(StatusSnapshot::default());
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let restart_in_flight = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let handle = SupervisorHandle {
            tx,
            status: status_rx,
            restart_in_flight: Arc::clone(&restart_in_flight),
            shutdown: shutdown.clone(),
        };
        let supervisor = Self {
            store,
            transport,
            services,
            history,
            log,
            status,
            commands,
            restart_in_flight,
            shutdown,
        };
        Ok((supervisor, handle))
    }

    fn build_bot(&self) -> Result<Bot> {
        let settings = load_settings(self.store.as_ref())?;
        Ok(Bot::new(
            settings,
            BotDeps {
                transport: (self.transport)(),
                services: self.services.clone(),
                history: Arc::clone(&self.history),
                store: Arc::clone(&self.store),
                log: self.log.clone(),
                status: self.status.clone(),
            },
        ))
    }

    /// Run workers until quit or shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut generation: u64 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            generation += 1;

            let bot = match self.build_bot() {
                Ok(bot) => bot,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build bot; retrying");
                    self.restart_in_flight.store(false, Ordering::SeqCst);
                    if !self.pause(RETRY_DELAY).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            let (control_tx, control_rx) = mpsc::channel(COMMAND_CAPACITY);
            let cancel = self.shutdown.child_token();
            let mut worker = tokio::spawn(bot.run(control_rx, cancel.clone()));
            self.restart_in_flight.store(false, Ordering::SeqCst);
            tracing::info!(generation, "bot worker started");

            let exit = loop {
                tokio::select! {
                    res = &mut worker => {
                        break res.unwrap_or_else(|e| SessionExit::Failed(format!("worker task failed: {e}")));
                    }
                    cmd = self.commands.recv() => match cmd {
                        Some(SupervisorCommand::Control(msg)) => {
                            if control_tx.send(msg).await.is_err() {
                                tracing::debug!("worker gone; control request dropped");
                            }
                        }
                        Some(SupervisorCommand::Restart) => {
                            stop_worker(&cancel, &mut worker).await;
                            break SessionExit::Restart;
                        }
                        None => {
                            stop_worker(&cancel, &mut worker).await;
                            break SessionExit::Stopped;
                        }
                    },
                    _ = self.shutdown.cancelled() => {
                        stop_worker(&cancel, &mut worker).await;
                        break SessionExit::Stopped;
                    }
                }
            };

            match exit {
                SessionExit::Quit => {
                    tracing::info!("quit requested; shutting down");
                    self.shutdown.cancel();
                    return Ok(());
                }
                SessionExit::Stopped => {
                    tracing::info!("bot stopped");
                    return Ok(());
                }
                SessionExit::Restart => {
                    self.restart_in_flight.store(true, Ordering::SeqCst);
                    tracing::info!("restarting bot");
                }
                SessionExit::Failed(reason) => {
                    tracing::error!(%reason, retry_secs = RETRY_DELAY.as_secs(), "bot worker exited unexpectedly");
                    if !self.pause(RETRY_DELAY).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep unless shut down first. Returns `false` on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }
}

fn load_settings(store: &dyn ConfigStore) -> Result<Settings> {
    let mut settings = store.load()?;
    settings.apply_env_overrides();
    Ok(settings)
}

async fn stop_worker(cancel: &CancellationToken, worker: &mut JoinHandle<SessionExit>) {
    cancel.cancel();
    match tokio::time::timeout(STOP_TIMEOUT, &mut *worker).await {
        Ok(_) => tracing::debug!("previous bot worker stopped"),
        Err(_) => {
            tracing::error!(
                timeout_secs = STOP_TIMEOUT.as_secs(),
                "bot worker did not stop in time; treating it as stuck"
            );
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MemoryStore,
        domain::{ChannelId, Recipient, UserId, UserRights},
        history::HistoryEntry,
        lifecycle::Phase,
        ports::{AiService, QuoteService, WeatherService},
        transport::{local::user, LocalTransport, Outbound},
    };
    use async_trait::async_trait;

    struct NoAi;

    #[async_trait]
    impl AiService for NoAi {
        fn is_enabled(&self) -> bool {
            false
        }
        fn current_model(&self) -> String {
            String::new()
        }
        async fn generate(&self, _prompt: &str, _history: &[HistoryEntry]) -> String {
            String::new()
        }
        async fn generate_welcome(&self, nickname: &str) -> String {
            format!("Welcome, {nickname}!")
        }
        async fn list_models(&self) -> Vec<String> {
            Vec::new()
        }
        async fn set_model(&self, _name: &str) -> bool {
            false
        }
        async fn set_api_key(&self, _key: &str) -> bool {
            false
        }
        fn set_system_instructions(&self, _text: &str) {}
        fn set_welcome_instructions(&self, _text: &str) {}
    }

    struct NoWeather;

    #[async_trait]
    impl WeatherService for NoWeather {
        fn is_enabled(&self) -> bool {
            false
        }
        async fn weather(&self, _location: &str) -> String {
            String::new()
        }
    }

    struct NoQuotes;

    #[async_trait]
    impl QuoteService for NoQuotes {
        fn is_enabled(&self) -> bool {
            false
        }
        async fn random_quote(&self, _lang: &str) -> String {
            String::new()
        }
        async fn quote_by_id(&self, _id: u32, _lang: &str) -> String {
            String::new()
        }
        async fn today_events(&self, _country: &str) -> String {
            String::new()
        }
        async fn events_by_date(&self, _country: &str, _date: &str) -> String {
            String::new()
        }
        async fn events_by_week(&self, _country: &str, _date: &str) -> String {
            String::new()
        }
        async fn events_by_month(&self, _country: &str, _month: &str) -> String {
            String::new()
        }
        async fn events_by_year(&self, _country: &str, _year: &str) -> String {
            String::new()
        }
        async fn search_events(&self, _country: &str, _query: &str) -> String {
            String::new()
        }
        async fn set_api_key(&self, _key: &str) -> bool {
            false
        }
    }

    fn setup() -> (Arc<LocalTransport>, Supervisor, SupervisorHandle) {
        let transport = Arc::new(LocalTransport::new(UserId(1), UserRights::KICK_USERS));
        transport.add_user(user(2, "Boss", "boss", ChannelId(1)));

        let mut settings = Settings::default();
        settings.bot.admin_usernames = vec!["boss".to_string()];
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new(settings));

        let shared = Arc::clone(&transport);
        let factory: TransportFactory = Arc::new(move || -> Arc<dyn Transport> { shared.clone() });
        let services = Services {
            ai: Arc::new(NoAi),
            weather: Arc::new(NoWeather),
            quotes: Arc::new(NoQuotes),
        };
        let (supervisor, handle) =
            Supervisor::new(store, factory, services, LogHandle::noop()).unwrap();
        (transport, supervisor, handle)
    }

    async fn wait_in_channel(handle: &SupervisorHandle) {
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.phase == Phase::InChannel).await.unwrap();
    }

    fn connects(transport: &LocalTransport) -> usize {
        transport
            .outbound()
            .iter()
            .filter(|o| matches!(o, Outbound::Connect { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_worker_once() {
        let (transport, supervisor, handle) = setup();
        let task = tokio::spawn(supervisor.run());
        wait_in_channel(&handle).await;
        assert_eq!(connects(&transport), 1);

        assert!(handle.restart().await);
        assert!(!handle.restart().await);

        while connects(&transport) < 2 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        wait_in_channel(&handle).await;
        assert!(handle.restart().await);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn quit_command_ends_the_supervisor() {
        let (transport, supervisor, handle) = setup();
        let task = tokio::spawn(supervisor.run());
        wait_in_channel(&handle).await;

        transport.say(UserId(2), Recipient::User(UserId(1)), "q");
        task.await.unwrap().unwrap();

        assert!(handle.is_shut_down());
        assert!(transport
            .texts_to(Recipient::User(UserId(2)))
            .contains(&"Acknowledged. Quitting...".to_string()));
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_reach_the_running_worker() {
        let (_transport, supervisor, handle) = setup();
        let task = tokio::spawn(supervisor.run());
        wait_in_channel(&handle).await;

        assert!(handle.status().toggles.allow_broadcast);
        assert!(handle.toggle(Feature::Broadcast).await);
        let mut rx = handle.subscribe();
        rx.wait_for(|s| !s.toggles.allow_broadcast).await.unwrap();

        handle.shutdown();
        task.await.unwrap().unwrap();
    }
}
