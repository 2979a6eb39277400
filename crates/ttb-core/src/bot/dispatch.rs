use crate::{
    commands::{is_unblockable, split_command, Command, CommandKind, Origin},
    domain::{ChannelId, MsgType, UserId, UserRights},
    security::WARNING_THRESHOLD,
};

use super::Bot;

/// Who sent a command and from where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub origin: Origin,
    pub sender: UserId,
    pub nickname: String,
    /// The channel the line was posted in (the bot's channel for PMs).
    pub channel_id: ChannelId,
    /// Command word as typed, lowercased and without the channel slash.
    pub word: String,
    /// The full reassembled line.
    pub text: String,
}

impl Bot {
    /// Route one reassembled chat line to its handler.
    pub(crate) async fn dispatch(
        &mut self,
        msg_type: MsgType,
        sender: UserId,
        channel_id: ChannelId,
        nickname: String,
        text: String,
    ) {
        let origin = match msg_type {
            MsgType::User => Origin::Private,
            MsgType::Channel if self.state.in_channel => Origin::Channel,
            _ => return,
        };

        if origin == Origin::Channel && self.apply_word_filter(sender, channel_id, &nickname, &text) {
            return;
        }

        let (word, args) = split_command(&text, origin);
        if word.is_empty() {
            return;
        }

        if self.state.locked && !is_unblockable(&word) {
            if origin == Origin::Private {
                self.send_pm(sender, "Command ignored; bot is locked.");
            }
            return;
        }

        if self.state.blocked_commands.contains(&word) && word != "block" && word != "unblock" {
            if origin == Origin::Private {
                self.send_pm(sender, &format!("Command '{word}' is blocked."));
            }
            return;
        }

        let Some(kind) = CommandKind::resolve(&word, origin) else {
            tracing::debug!(%word, ?origin, "unknown command");
            return;
        };

        if kind.is_admin_only() && !self.state.is_admin(sender) {
            tracing::warn!(user = %nickname, user_id = sender.0, %word, "unauthorized admin command");
            self.send_pm(
                sender,
                &format!("Error: You are not authorized to use '{word}'."),
            );
            return;
        }

        let command = match Command::parse(kind, &args) {
            Ok(command) => command,
            Err(usage) => {
                self.send_pm(sender, &usage);
                return;
            }
        };

        let channel_id = match origin {
            Origin::Channel => channel_id,
            Origin::Private => self.transport.my_channel_id(),
        };
        let ctx = CommandContext {
            origin,
            sender,
            nickname,
            channel_id,
            word,
            text,
        };
        tracing::debug!(word = %ctx.word, user = %ctx.nickname, ?origin, "executing command");
        if let Err(e) = self.execute(&ctx, command).await {
            tracing::error!(word = %ctx.word, error = ?e, "command handler failed");
            self.send_pm(
                sender,
                &format!("An unexpected error occurred executing '{}'.", ctx.word),
            );
        }
    }

    /// Returns `true` when the line tripped the filter and must not run as a
    /// command.
    fn apply_word_filter(
        &mut self,
        sender: UserId,
        channel_id: ChannelId,
        nickname: &str,
        text: &str,
    ) -> bool {
        if !self.state.filter_active() {
            return false;
        }
        let Some(hit) = self.state.filter.inspect(sender, text) else {
            return false;
        };
        tracing::info!(user = %nickname, word = %hit.word, warnings = hit.warnings, "filtered word used");

        self.send_channel(
            channel_id,
            &format!(
                "Warning {}/{WARNING_THRESHOLD} for {nickname}: Please avoid inappropriate language.",
                hit.warnings
            ),
        );

        if hit.threshold_reached() {
            if self.state.my_rights.contains(UserRights::KICK_USERS) {
                match self.transport.kick_user(sender, channel_id) {
                    Ok(_) => {
                        self.send_channel(
                            channel_id,
                            &format!("User {nickname} kicked after {WARNING_THRESHOLD} warnings."),
                        );
                    }
                    Err(e) => tracing::error!(user = %nickname, error = %e, "filter kick failed"),
                }
            } else {
                self.send_channel(
                    channel_id,
                    &format!("{nickname} has {WARNING_THRESHOLD} warnings, but bot cannot kick."),
                );
            }
        }
        true
    }
}
