//! The session worker: one bot instance bound to one transport connection.
//!
//! Everything here runs serially on a single task. Presentation tasks talk to
//! it through [`BotControl`] messages and observe it through the status watch.

mod dispatch;
mod events;

use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigStore, Settings},
    domain::{ChannelId, Recipient, UserId, MAX_TEXT_LEN},
    history::{channel_key, pm_key, ContextHistory},
    lifecycle::{Lifecycle, Phase},
    logging::LogHandle,
    messaging::split_message,
    polls::PollBook,
    ports::Services,
    reassembler::Reassembler,
    session::{Feature, SessionState, StatusSnapshot, ToggleError},
    transport::Transport,
};

pub use dispatch::CommandContext;

/// How long one transport poll may block before control messages are looked at.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Requests from presentation layers to the running bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotControl {
    Toggle(Feature),
    SetRetention(u64),
    Stop,
}

/// Why a session worker returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionExit {
    /// `q`: shut the whole process down.
    Quit,
    /// `rs`: build a fresh bot.
    Restart,
    /// Cancelled or told to stop.
    Stopped,
    Failed(String),
}

/// Everything a bot needs from the outside, shared across restarts.
#[derive(Clone)]
pub struct BotDeps {
    pub transport: Arc<dyn Transport>,
    pub services: Services,
    pub history: Arc<ContextHistory>,
    pub store: Arc<dyn ConfigStore>,
    pub log: LogHandle,
    pub status: watch::Sender<StatusSnapshot>,
}

pub struct Bot {
    pub(crate) state: SessionState,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) settings: Settings,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) services: Services,
    pub(crate) history: Arc<ContextHistory>,
    pub(crate) polls: PollBook,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) log: LogHandle,
    reassembler: Reassembler,
    status: watch::Sender<StatusSnapshot>,
    rng: StdRng,
    exit: Option<SessionExit>,
}

impl Bot {
    pub fn new(settings: Settings, deps: BotDeps) -> Self {
        let state = SessionState::from_settings(&settings, deps.services.ai.is_enabled());
        let lifecycle = Lifecycle::new(
            settings.bot.reconnect_delay_min,
            settings.bot.reconnect_delay_max,
        );
        deps.history
            .set_retention(settings.bot.context_history_retention_minutes);
        deps.services
            .ai
            .set_system_instructions(&settings.bot.ai_system_instructions);
        deps.services
            .ai
            .set_welcome_instructions(&settings.bot.welcome_message_instructions);

        Self {
            state,
            lifecycle,
            settings,
            transport: deps.transport,
            services: deps.services,
            history: deps.history,
            polls: PollBook::new(),
            store: deps.store,
            log: deps.log,
            reassembler: Reassembler::new(),
            status: deps.status,
            rng: StdRng::from_entropy(),
            exit: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Run until quit, restart, cancellation or a `Stop` control message.
    pub async fn run(
        mut self,
        mut control: mpsc::Receiver<BotControl>,
        shutdown: CancellationToken,
    ) -> SessionExit {
        tracing::info!(
            host = %self.settings.connection.host,
            port = self.settings.connection.port,
            "starting bot session"
        );
        self.connect();
        self.publish_status();

        let transport = Arc::clone(&self.transport);
        loop {
            if let Some(exit) = self.exit.take() {
                self.stop();
                return exit;
            }

            let reconnect_at = self.lifecycle.reconnect_at();
            let reconnect = async move {
                match reconnect_at {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.stop();
                    return SessionExit::Stopped;
                }
                msg = control.recv() => match msg {
                    Some(msg) => self.handle_control(msg),
                    None => {
                        self.stop();
                        return SessionExit::Stopped;
                    }
                },
                _ = reconnect => {
                    if self.lifecycle.take_due_reconnect(now()) {
                        tracing::info!("reconnecting");
                        self.reset_connection_flags();
                        if let Err(e) = self.transport.disconnect() {
                            tracing::debug!(error = %e, "disconnect before reconnect failed");
                        }
                        self.connect();
                    }
                }
                event = transport.poll_event(POLL_TIMEOUT) => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
            }
            self.publish_status();
        }
    }

    fn connect(&mut self) {
        self.lifecycle.begin_connect();
        let conn = &self.settings.connection;
        if let Err(e) = self.transport.connect(&conn.host, conn.port) {
            tracing::error!(error = %e, "connect request failed");
            self.schedule_reconnect();
        }
    }

    fn stop(&mut self) {
        if self.lifecycle.phase() == Phase::Stopping {
            return;
        }
        tracing::info!("stopping bot session");
        self.lifecycle.begin_stop();
        if self.state.logged_in {
            if let Err(e) = self.transport.logout() {
                tracing::debug!(error = %e, "logout failed during stop");
            }
        }
        if let Err(e) = self.transport.disconnect() {
            tracing::debug!(error = %e, "disconnect failed during stop");
        }
        self.reset_connection_flags();
        self.publish_status();
    }

    pub(crate) fn request_exit(&mut self, exit: SessionExit) {
        self.lifecycle.mark_intentional_stop();
        self.exit = Some(exit);
    }

    fn reset_connection_flags(&mut self) {
        self.state.connected = false;
        self.state.logged_in = false;
        self.state.in_channel = false;
        self.reassembler.clear();
    }

    pub(crate) fn schedule_reconnect(&mut self) {
        match self
            .lifecycle
            .on_transport_failure(now(), &mut self.rng)
        {
            Some(delay) => tracing::warn!(delay_secs = delay.as_secs(), "reconnecting after delay"),
            None if self.lifecycle.is_intentional_stop() => {
                tracing::info!("session stopped intentionally; not reconnecting")
            }
            None => tracing::debug!("reconnect already scheduled"),
        }
    }

    fn handle_control(&mut self, msg: BotControl) {
        match msg {
            BotControl::Toggle(feature) => match self.toggle_feature(feature) {
                Ok(on) => tracing::info!("{}", feature.notice(on)),
                Err(e) => tracing::warn!(feature = feature.short_name(), "{e}"),
            },
            BotControl::SetRetention(minutes) => self.set_retention(minutes),
            BotControl::Stop => self.exit = Some(SessionExit::Stopped),
        }
    }

    fn publish_status(&self) {
        let snap = self.state.snapshot(self.lifecycle.phase());
        self.status.send_if_modified(|cur| {
            if *cur == snap {
                false
            } else {
                *cur = snap;
                true
            }
        });
    }

    // ============== Shared operations ==============

    /// Toggle a feature, apply its side effects and persist.
    pub(crate) fn toggle_feature(&mut self, feature: Feature) -> std::result::Result<bool, ToggleError> {
        let on = self.state.toggle(feature)?;
        if feature == Feature::DebugLogging {
            if let Err(e) = self.log.set_debug(on) {
                tracing::warn!(error = %e, "could not switch log level");
            }
        }
        if feature != Feature::Locked {
            self.persist();
        }
        Ok(on)
    }

    pub(crate) fn set_retention(&mut self, minutes: u64) {
        self.history.set_retention(minutes);
        self.settings.bot.context_history_retention_minutes = minutes;
        self.persist();
    }

    /// Write the full configuration snapshot back to the store.
    pub(crate) fn persist(&mut self) {
        self.state.write_to(&mut self.settings);
        if let Err(e) = self.store.save(&self.settings) {
            tracing::error!(error = %e, "failed to save settings");
        }
    }

    // ============== Outbound ==============

    pub(crate) fn send_pm(&self, to: UserId, text: &str) -> bool {
        self.send(Recipient::User(to), text)
    }

    pub(crate) fn send_channel(&self, channel_id: ChannelId, text: &str) -> bool {
        self.send(Recipient::Channel(channel_id), text)
    }

    pub(crate) fn send_broadcast(&self, text: &str) -> bool {
        self.send(Recipient::Broadcast, text)
    }

    /// Gated, chunked send. Channel text is refused while locked or when
    /// channel messages are off; broadcasts likewise. Successful PM and
    /// channel sends are remembered as bot lines in the recipient's history.
    pub(crate) fn send(&self, to: Recipient, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let refused = match to {
            Recipient::Channel(_) => self.state.locked || !self.state.toggles.allow_channel_messages,
            Recipient::Broadcast => self.state.locked || !self.state.toggles.allow_broadcast,
            Recipient::User(_) => false,
        };
        if refused {
            tracing::debug!(recipient = ?to, "outbound message refused by policy");
            return false;
        }

        for chunk in split_message(text, MAX_TEXT_LEN - 1) {
            if let Err(e) = self.transport.send_text(to, &chunk) {
                tracing::warn!(recipient = ?to, error = %e, "failed to send message part");
                return false;
            }
        }

        let key = match to {
            Recipient::User(id) => Some(pm_key(id)),
            Recipient::Channel(id) => Some(channel_key(id)),
            Recipient::Broadcast => None,
        };
        if let Some(key) = key {
            self.history.add(&key, text, &self.state.nickname, true);
        }
        true
    }

    /// Nickname for `user_id`, falling back to a placeholder.
    pub(crate) fn nickname_of(&self, user_id: UserId) -> String {
        self.transport
            .user(user_id)
            .map(|u| u.nickname)
            .unwrap_or_else(|| format!("UserID_{user_id}"))
    }

    pub(crate) fn ensure_channel_path(&self, channel_id: ChannelId) -> String {
        self.transport
            .channel_path(channel_id)
            .unwrap_or_else(|| format!("#{channel_id}"))
    }
}

/// Current time on the runtime clock, so reconnect deadlines follow a paused
/// test clock too.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
