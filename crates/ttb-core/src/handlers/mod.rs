//! Command handlers, grouped by concern.
//!
//! Each handler runs on the session worker with `&mut Bot`, so it may read
//! and mutate session state directly. Transport failures propagate with `?`
//! and are reported to the caller by the dispatcher.

mod admin;
mod ai;
mod comms;
mod poll;
mod user;

use crate::{
    bot::{Bot, CommandContext},
    commands::{Command, Origin},
    Result,
};

impl Bot {
    pub(crate) async fn execute(&mut self, ctx: &CommandContext, command: Command) -> Result<()> {
        match command {
            // user
            Command::Help => self.handle_help(ctx),
            Command::Ping => {
                self.send_pm(ctx.sender, "Pong!");
                Ok(())
            }
            Command::Info => self.handle_info(ctx),
            Command::WhoAmI => self.handle_whoami(ctx),
            Command::Rights => self.handle_rights(ctx),
            Command::ChangeNick(nick) => self.handle_change_nick(ctx, &nick),
            Command::ChangeStatus(status) => self.handle_change_status(ctx, &status),

            // services
            Command::Weather(location) => self.handle_weather(ctx, &location).await,
            Command::Quote { lang, id } => self.handle_quote(ctx, &lang, id).await,
            Command::Event { country, query } => self.handle_events_query(ctx, &country, &query).await,
            Command::ChannelText(text) => self.handle_channel_text(ctx, &text),
            Command::BroadcastText(text) => self.handle_broadcast(ctx, &text),

            // ai
            Command::Ask(prompt) => match ctx.origin {
                Origin::Private => self.handle_pm_ai(ctx, &prompt).await,
                Origin::Channel => self.handle_channel_ai(ctx, &prompt).await,
            },
            Command::Instruct(text) => self.handle_instruct(ctx, &text),
            Command::SetWelcomeInstruction(text) => self.handle_set_welcome_instruction(ctx, &text),
            Command::GeminiKey(key) => self.handle_gemini_key(ctx, &key).await,
            Command::ListModels => self.handle_list_models(ctx).await,
            Command::SetModel(name) => self.handle_set_model(ctx, &name).await,

            // polls
            Command::Poll(args) => self.handle_poll_create(ctx, &args),
            Command::Vote { poll_id, choice } => self.handle_vote(ctx, poll_id, choice),
            Command::Results(poll_id) => self.handle_results(ctx, poll_id),

            // admin
            Command::Toggle(feature) => self.handle_toggle(ctx, feature),
            Command::WelcomeMode => self.handle_welcome_mode(ctx),
            Command::Block(word) => self.handle_block(ctx, &word),
            Command::Restart => self.handle_restart(ctx),
            Command::Quit => self.handle_quit(ctx),
            Command::HarikuKey(key) => self.handle_hariku_key(ctx, &key).await,
            Command::AddWord(word) => self.handle_add_word(ctx, &word),
            Command::DelWord(word) => self.handle_del_word(ctx, &word),
            Command::SetRetention(minutes) => {
                self.set_retention(minutes);
                self.send_pm(
                    ctx.sender,
                    &format!("Context history retention set to {minutes} minutes."),
                );
                Ok(())
            }
            Command::ListUsers(path) => self.handle_list_users(ctx, path.as_deref()),
            Command::ListChannels => self.handle_list_channels(ctx),
            Command::Move { nick, path } => self.handle_move(ctx, &nick, &path),
            Command::Kick(nick) => self.handle_kick(ctx, &nick),
            Command::Ban(nick) => self.handle_ban(ctx, &nick),
            Command::Unban(username) => self.handle_unban(ctx, &username),
            Command::Admins => self.handle_admins(ctx),
            Command::JoinChannel { path, password } => self.handle_join_channel(ctx, &path, &password),
        }
    }

    /// Reply where the command came from: the channel for channel commands,
    /// a PM otherwise.
    pub(crate) fn reply(&self, ctx: &CommandContext, text: &str) -> bool {
        match ctx.origin {
            Origin::Private => self.send_pm(ctx.sender, text),
            Origin::Channel => self.send_channel(ctx.channel_id, text),
        }
    }
}
