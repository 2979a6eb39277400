use std::collections::HashSet;

use crate::{
    bot::{Bot, CommandContext, SessionExit},
    commands::is_unblockable,
    config::WelcomeMode,
    domain::{BanType, User, UserRights},
    session::Feature,
    Result,
};

impl Bot {
    fn find_user_by_nick(&self, nick: &str) -> Option<User> {
        self.transport
            .server_users()
            .into_iter()
            .find(|u| u.nickname.eq_ignore_ascii_case(nick))
    }

    // ============== Bot control ==============

    pub(super) fn handle_toggle(&mut self, ctx: &CommandContext, feature: Feature) -> Result<()> {
        let reply = match self.toggle_feature(feature) {
            Ok(on) => feature.notice(on),
            Err(e) => e.to_string(),
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) fn handle_welcome_mode(&mut self, ctx: &CommandContext) -> Result<()> {
        let reply = match self.state.welcome_mode {
            WelcomeMode::Template if !self.services.ai.is_enabled() => {
                "Error: Cannot switch to Gemini mode, AI not available."
            }
            WelcomeMode::Template => {
                self.state.welcome_mode = WelcomeMode::Ai;
                self.persist();
                "Welcome message mode set to: Gemini."
            }
            WelcomeMode::Ai => {
                self.state.welcome_mode = WelcomeMode::Template;
                self.persist();
                "Welcome message mode set to: Template."
            }
        };
        self.send_pm(ctx.sender, reply);
        Ok(())
    }

    pub(super) fn handle_block(&mut self, ctx: &CommandContext, word: &str) -> Result<()> {
        if word.is_empty() {
            let blocked = if self.state.blocked_commands.is_empty() {
                "None".to_string()
            } else {
                self.state
                    .blocked_commands
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            self.send_pm(
                ctx.sender,
                &format!("Usage: block <command>\nCurrently blocked: {blocked}"),
            );
            return Ok(());
        }
        if is_unblockable(word) {
            self.send_pm(ctx.sender, &format!("Error: Command '{word}' cannot be blocked."));
            return Ok(());
        }

        let state = if self.state.toggle_block(word) {
            "BLOCKED"
        } else {
            "UNBLOCKED"
        };
        tracing::info!(admin = %ctx.nickname, command = %word, state, "command block toggled");
        self.send_pm(ctx.sender, &format!("Command '{word}' has been {state}."));
        Ok(())
    }

    pub(super) fn handle_restart(&mut self, ctx: &CommandContext) -> Result<()> {
        tracing::info!(admin = %ctx.nickname, "restart requested");
        self.send_pm(ctx.sender, "Acknowledged. Restarting bot...");
        self.request_exit(SessionExit::Restart);
        Ok(())
    }

    pub(super) fn handle_quit(&mut self, ctx: &CommandContext) -> Result<()> {
        tracing::info!(admin = %ctx.nickname, "quit requested");
        self.send_pm(ctx.sender, "Acknowledged. Quitting...");
        self.request_exit(SessionExit::Quit);
        Ok(())
    }

    // ============== Configuration ==============

    pub(super) async fn handle_hariku_key(&mut self, ctx: &CommandContext, key: &str) -> Result<()> {
        let reply = if self.services.quotes.set_api_key(key).await {
            self.settings.bot.hariku_api_key = key.to_string();
            self.persist();
            "Hariku API key updated successfully."
        } else {
            "Hariku API key provided is invalid. Key not saved."
        };
        self.send_pm(ctx.sender, reply);
        Ok(())
    }

    pub(super) fn handle_add_word(&mut self, ctx: &CommandContext, word: &str) -> Result<()> {
        self.state.filter.add_word(word);
        self.state.set(Feature::Filter, true);
        self.persist();
        self.send_pm(
            ctx.sender,
            &format!("Word '{word}' added to filter. Filter enabled."),
        );
        Ok(())
    }

    pub(super) fn handle_del_word(&mut self, ctx: &CommandContext, word: &str) -> Result<()> {
        self.state.filter.remove_word(word);
        if self.state.filter.is_empty() {
            self.state.set(Feature::Filter, false);
        }
        self.persist();
        self.send_pm(ctx.sender, &format!("Word '{word}' removed from filter."));
        Ok(())
    }

    // ============== Users and channels ==============

    pub(super) fn handle_list_users(&mut self, ctx: &CommandContext, path: Option<&str>) -> Result<()> {
        let path = path.unwrap_or(self.state.target_channel_path.as_str()).to_string();
        let Some(channel_id) = self.transport.channel_id_from_path(&path) else {
            self.send_pm(ctx.sender, "Error: Channel not found.");
            return Ok(());
        };

        let mut users = self.transport.channel_users(channel_id);
        users.sort_by_key(|u| u.nickname.to_lowercase());
        let reply = if users.is_empty() {
            format!("No users found in '{path}'.")
        } else {
            let mut lines = vec![format!("Users in '{path}':")];
            lines.extend(
                users
                    .iter()
                    .map(|u| format!("- {} (ID:{}, User:{})", u.nickname, u.id, u.username)),
            );
            lines.join("\n")
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) fn handle_list_channels(&mut self, ctx: &CommandContext) -> Result<()> {
        let mut channels = self.transport.server_channels();
        channels.sort_by_key(|c| c.name.to_lowercase());
        let reply = if channels.is_empty() {
            "No channels found.".to_string()
        } else {
            let mut lines = vec!["--- Server Channels ---".to_string()];
            lines.extend(channels.iter().map(|c| {
                format!(
                    "- {} (ID:{}, Path:{})",
                    c.name,
                    c.id,
                    self.ensure_channel_path(c.id)
                )
            }));
            lines.join("\n")
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) fn handle_move(&mut self, ctx: &CommandContext, nick: &str, path: &str) -> Result<()> {
        if !self.state.my_rights.contains(UserRights::MOVE_USERS) {
            self.send_pm(ctx.sender, "Error: Bot cannot move users.");
            return Ok(());
        }
        let Some(user) = self.find_user_by_nick(nick) else {
            self.send_pm(ctx.sender, &format!("Error: User '{nick}' not found."));
            return Ok(());
        };
        let Some(channel_id) = self.transport.channel_id_from_path(path) else {
            self.send_pm(ctx.sender, &format!("Error: Channel '{path}' not found."));
            return Ok(());
        };

        self.transport.move_user(user.id, channel_id)?;
        tracing::info!(admin = %ctx.nickname, target = %nick, channel = %path, "move requested");
        self.send_pm(ctx.sender, &format!("Move command sent for '{nick}'."));
        Ok(())
    }

    pub(super) fn handle_kick(&mut self, ctx: &CommandContext, nick: &str) -> Result<()> {
        if !self.state.my_rights.contains(UserRights::KICK_USERS) {
            self.send_pm(ctx.sender, "Error: Bot cannot kick users.");
            return Ok(());
        }
        if !self.state.in_channel {
            self.send_pm(ctx.sender, "Error: Bot not in a channel to kick from.");
            return Ok(());
        }

        let channel_id = self.state.target_channel_id;
        let Some(user) = self
            .transport
            .channel_users(channel_id)
            .into_iter()
            .find(|u| u.nickname.eq_ignore_ascii_case(nick))
        else {
            self.send_pm(ctx.sender, &format!("Error: User '{nick}' not in my channel."));
            return Ok(());
        };

        self.transport.kick_user(user.id, channel_id)?;
        tracing::info!(admin = %ctx.nickname, target = %nick, "kick requested");
        self.send_pm(ctx.sender, &format!("Kick command sent for '{nick}'."));
        Ok(())
    }

    pub(super) fn handle_ban(&mut self, ctx: &CommandContext, nick: &str) -> Result<()> {
        if !self.state.my_rights.contains(UserRights::BAN_USERS) {
            self.send_pm(ctx.sender, "Error: Bot cannot ban users.");
            return Ok(());
        }
        let Some(user) = self.find_user_by_nick(nick) else {
            self.send_pm(ctx.sender, &format!("Error: User '{nick}' not found."));
            return Ok(());
        };

        self.transport.ban_user(user.id, BanType::Username)?;
        tracing::info!(admin = %ctx.nickname, target = %user.username, "ban requested");
        self.send_pm(
            ctx.sender,
            &format!("Ban command sent for user '{}'.", user.username),
        );
        Ok(())
    }

    pub(super) fn handle_unban(&mut self, ctx: &CommandContext, username: &str) -> Result<()> {
        if !self.state.my_rights.contains(UserRights::BAN_USERS) {
            self.send_pm(ctx.sender, "Error: Bot cannot unban users.");
            return Ok(());
        }
        self.transport.unban_user(username, BanType::Username)?;
        tracing::info!(admin = %ctx.nickname, target = %username, "unban requested");
        self.send_pm(
            ctx.sender,
            &format!("Unban command sent for user '{username}'."),
        );
        Ok(())
    }

    pub(super) fn handle_admins(&mut self, ctx: &CommandContext) -> Result<()> {
        let mut configured: Vec<String> = self
            .settings
            .bot
            .admin_usernames
            .iter()
            .map(|u| u.to_lowercase())
            .collect();
        configured.sort();
        configured.dedup();

        let online: HashSet<String> = self
            .transport
            .server_users()
            .iter()
            .map(|u| u.username.to_lowercase())
            .collect();

        let mut lines = vec!["--- Admin Status ---".to_string()];
        for name in &configured {
            let status = if online.contains(name) { "Online" } else { "Offline" };
            lines.push(format!("- {name} (Configured): {status}"));
        }
        if configured.is_empty() {
            lines.push("No admin usernames configured in bot settings.".to_string());
        }
        self.send_pm(ctx.sender, &lines.join("\n"));
        Ok(())
    }

    pub(super) fn handle_join_channel(
        &mut self,
        ctx: &CommandContext,
        path: &str,
        password: &str,
    ) -> Result<()> {
        let Some(channel_id) = self.transport.channel_id_from_path(path) else {
            self.send_pm(ctx.sender, &format!("Error: Channel '{path}' not found."));
            return Ok(());
        };

        self.state.target_channel_path = path.to_string();
        self.state.channel_password = password.to_string();
        self.state.target_channel_id = channel_id;

        let reply = match self.transport.join_channel(channel_id, password) {
            Ok(_) => format!("Join command sent for '{path}'."),
            Err(e) => {
                tracing::error!(channel = %path, error = %e, "join request failed");
                format!("Error sending join command for '{path}'.")
            }
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }
}
