use crate::{
    config::WelcomeMode,
    domain::{MsgType, TextMessage, User, UserId, UserRights},
    history::pm_key,
    security::resolve_admin_ids,
    transport::TransportEvent,
};

use super::Bot;

impl Bot {
    pub(crate) async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectSuccess => self.on_connect_success(),
            TransportEvent::ConnectFailed => {
                tracing::error!(host = %self.settings.connection.host, "failed to connect");
                self.reset_connection_flags();
                self.schedule_reconnect();
            }
            TransportEvent::ConnectionLost => {
                tracing::error!("connection lost");
                self.reset_connection_flags();
                self.schedule_reconnect();
            }
            TransportEvent::CmdError {
                cmd_id,
                error,
                message,
            } => {
                tracing::error!(cmd_id = cmd_id.0, ?error, %message, "server command error");
                if error.is_fatal() {
                    tracing::error!("account-level failure; automatic reconnect disabled");
                    self.lifecycle.mark_intentional_stop();
                }
            }
            TransportEvent::LoggedIn { user_id, rights } => {
                self.on_logged_in(user_id, rights);
            }
            TransportEvent::LoggedOut => {
                tracing::info!("logged out");
                self.state.logged_in = false;
                self.state.in_channel = false;
                self.lifecycle.on_logged_out();
            }
            TransportEvent::UserJoined(user) => self.on_user_joined(user).await,
            TransportEvent::UserLeft { channel_id, user } => {
                if Some(user.id) == self.state.my_user_id {
                    tracing::info!(channel = %self.ensure_channel_path(channel_id), "left channel");
                    self.state.in_channel = false;
                    self.lifecycle.on_left_channel();
                } else {
                    tracing::debug!(nickname = %user.nickname, "user left");
                }
            }
            TransportEvent::TextMessage(msg) => self.on_text_part(msg).await,
            TransportEvent::UserUpdated(user) => self.on_user_updated(user),
        }
        self.recompute_admins();
    }

    fn on_connect_success(&mut self) {
        tracing::info!("connected; logging in");
        self.state.connected = true;
        self.lifecycle.on_connected();
        let conn = &self.settings.connection;
        if let Err(e) = self.transport.login(
            &self.state.nickname,
            &conn.username,
            &conn.password,
            &self.settings.bot.client_name,
        ) {
            tracing::error!(error = %e, "login request failed");
            self.reset_connection_flags();
            self.schedule_reconnect();
        }
    }

    fn on_logged_in(&mut self, user_id: UserId, rights: UserRights) {
        tracing::info!(user_id = user_id.0, rights = %rights, "logged in");
        self.state.logged_in = true;
        self.state.my_user_id = Some(user_id);
        self.state.my_rights = rights;
        self.lifecycle.on_logged_in();

        if !self.state.status_message.is_empty() {
            if let Err(e) = self.transport.change_status(&self.state.status_message) {
                tracing::warn!(error = %e, "failed to set status message");
            }
        }
        self.recompute_admins();

        let path = self.state.target_channel_path.clone();
        let channel_id = match self.transport.channel_id_from_path(&path) {
            Some(id) => id,
            None => {
                tracing::warn!(channel = %path, "target channel not found; joining root");
                self.transport.root_channel_id()
            }
        };
        if !channel_id.is_valid() {
            tracing::error!("no valid channel to join");
            return;
        }
        self.state.target_channel_id = channel_id;
        if let Err(e) = self
            .transport
            .join_channel(channel_id, &self.state.channel_password)
        {
            tracing::error!(channel = %path, error = %e, "join request failed");
        }
    }

    async fn on_user_joined(&mut self, user: User) {
        if Some(user.id) == self.state.my_user_id {
            tracing::info!(channel = %self.ensure_channel_path(user.channel_id), "joined channel");
            self.state.in_channel = true;
            self.lifecycle.on_joined();
            return;
        }

        self.recompute_admins();
        if !self.state.toggles.announce_join_leave
            || !self.state.in_channel
            || user.channel_id != self.transport.my_channel_id()
        {
            return;
        }

        let greeting = if self.state.welcome_mode == WelcomeMode::Ai && self.services.ai.is_enabled() {
            self.services.ai.generate_welcome(&user.nickname).await
        } else {
            format!("Welcome, {}!", user.nickname)
        };
        self.send_channel(user.channel_id, &greeting);
    }

    async fn on_text_part(&mut self, part: TextMessage) {
        let my_id = if self.state.logged_in {
            self.state.my_user_id
        } else {
            None
        };
        let Some(text) = self.reassembler.on_part(my_id, &part) else {
            return;
        };

        let nickname = self.nickname_of(part.from);
        match part.msg_type {
            MsgType::User => {
                tracing::info!(target: "ttb_core::chat", "[PM] <{nickname}> {text}");
                self.history.add(&pm_key(part.from), &text, &nickname, false);
            }
            MsgType::Channel => {
                let path = self.ensure_channel_path(part.channel_id);
                tracing::info!(target: "ttb_core::chat", "[{path}] <{nickname}> {text}");
            }
            MsgType::Broadcast => {
                tracing::info!(target: "ttb_core::chat", "[Broadcast] <{nickname}> {text}");
            }
            MsgType::Custom => return,
        }

        self.dispatch(part.msg_type, part.from, part.channel_id, nickname, text)
            .await;
    }

    fn on_user_updated(&mut self, user: User) {
        if Some(user.id) != self.state.my_user_id {
            return;
        }
        let mut changed = false;
        if user.nickname != self.state.nickname {
            tracing::info!(nickname = %user.nickname, "own nickname changed");
            self.state.nickname = user.nickname;
            changed = true;
        }
        if user.status_message != self.state.status_message {
            tracing::info!(status = %user.status_message, "own status changed");
            self.state.status_message = user.status_message;
            changed = true;
        }
        if changed {
            self.persist();
        }
    }

    /// Rebuild the admin id set from the live user directory.
    pub(crate) fn recompute_admins(&mut self) {
        if !self.state.logged_in {
            return;
        }
        let users = self.transport.server_users();
        self.state.admin_ids = resolve_admin_ids(
            &users,
            &self.settings.bot.admin_usernames,
            &self.settings.connection.username,
            self.state.my_user_id,
        );
    }
}
