use crate::{
    bot::{Bot, CommandContext},
    config::WelcomeMode,
    domain::MAX_TEXT_LEN,
    session::on_off,
    utils::format_uptime,
    Result,
};

const USER_HELP: &[&str] = &[
    "--- Bot Commands (Send via PM) ---",
    "- h: Show this help.",
    "- ping: Check if the bot is responding.",
    "- info: Display bot status and server info.",
    "- whoami: Show your user info.",
    "- rights: Show the bot's permissions.",
    "- cn <new_nick>: Change bot's nickname.",
    "- cs <new_status>: Change bot's status.",
    "- w <location>: Get weather (also /w in channel).",
    "- c <q>: Ask Gemini AI via PM.",
    "- quote [en|id] [id]: Get a random quote or a quote by ID.",
    "- event [country_code] [YYYY-MM-DD|YYYY-MM|YYYY|query]: Get events for a specific week, month, year, or search by query. If no date/query, gets today's events.",
    "- /c <q>: Ask Gemini AI in bot's channel.",
    "- poll \"Q\" \"A\" \"B\": Create a poll.",
    "- vote <id> <num>: Vote in a poll.",
    "- results <id>: Show poll results.",
    "- setwelcomeinstruction <text>: Set welcome message instructions.",
];

const ADMIN_HELP: &[&str] = &[
    "",
    "--- Admin Commands ---",
    "- gapi: Set Gemini API key.",
    "- harikuapi: Set Hariku API key.",
    "- list_gemini_models / lgm: List available Gemini models.",
    "- set_gemini_model <model_name> / sgm <model_name>: Set the active Gemini model.",
    "- addword <word>: Adds a word to the word filter.",
    "- delword <word>: Removes a word from the word filter.",
    "- set_context_retention: Set context history retention.",
    "- jcl: Toggle join/leave announcements.",
    "- tg_chanmsg: Toggle channel messages.",
    "- tg_broadcast: Toggle broadcast messages.",
    "- tg_gemini_pm: Toggle Gemini PM.",
    "- tg_gemini_chan: Toggle Gemini channel messages.",
    "- tgmmode: Toggle welcome message mode.",
    "- tfilter: Toggle filter.",
    "- tg_context_history: Toggle context history.",
    "- tg_debug_logging: Toggle debug logging.",
    "- lock: Lock/unlock bot.",
    "- block / unblock: Block/unblock commands.",
    "- listusers: List all users.",
    "- listchannels: List all channels.",
    "- move: Move user to channel.",
    "- kick: Kick user.",
    "- ban: Ban user.",
    "- unban: Unban user.",
    "- admins: List configured admins and their online status.",
    "- instruct: Set AI system instructions.",
    "- jc: Join channel.",
    "- ct <msg>: Send message to bot's channel.",
    "- bm <msg>: Send broadcast message.",
    "- rs: Restart bot.",
    "- q: Quit bot.",
];

impl Bot {
    pub(super) fn handle_help(&mut self, ctx: &CommandContext) -> Result<()> {
        let mut lines: Vec<&str> = USER_HELP.to_vec();
        if self.state.is_admin(ctx.sender) {
            lines.extend_from_slice(ADMIN_HELP);
        }
        self.send_pm(ctx.sender, &lines.join("\n"));
        Ok(())
    }

    pub(super) fn handle_info(&mut self, ctx: &CommandContext) -> Result<()> {
        let state = &self.state;
        let bot = &self.settings.bot;
        let ai = &self.services.ai;
        let enabled = |on: bool| if on { "ENABLED" } else { "DISABLED" };

        let current_channel = if state.in_channel {
            self.ensure_channel_path(self.transport.my_channel_id())
        } else {
            "Not in channel".to_string()
        };
        let (server_name, server_version) = match self.transport.server_properties() {
            Some(props) => (props.name, props.version),
            None => ("N/A".to_string(), "N/A".to_string()),
        };
        let instructions = if bot.ai_system_instructions.is_empty() {
            "Not set"
        } else {
            bot.ai_system_instructions.as_str()
        };
        let welcome_mode = match state.welcome_mode {
            WelcomeMode::Template => "TEMPLATE",
            WelcomeMode::Ai => "GEMINI",
        };

        let lines = [
            "--- Bot Info ---".to_string(),
            format!("Name: {}", state.nickname),
            format!("Uptime: {}", format_uptime(Some(state.started_at.elapsed()))),
            format!("Current Channel: {current_channel}"),
            format!("Target Channel: {}", state.target_channel_path),
            format!("Locked: {}", if state.locked { "YES" } else { "NO" }),
            "--- System Info ---".to_string(),
            format!("Operating System: {}", std::env::consts::OS),
            format!("Bot Version: {}", env!("CARGO_PKG_VERSION")),
            "--- Features ---".to_string(),
            format!(
                "Gemini AI: {} (Model: {})",
                enabled(ai.is_enabled()),
                ai.current_model()
            ),
            format!("AI System Instructions: {instructions}"),
            format!("Announce Join/Leave: {}", on_off(state.toggles.announce_join_leave)),
            format!("Allow Channel Messages: {}", on_off(state.toggles.allow_channel_messages)),
            format!("Allow Broadcasts: {}", on_off(state.toggles.allow_broadcast)),
            format!("Allow Gemini PM: {}", on_off(state.toggles.allow_ai_pm)),
            format!("Allow Gemini Channel: {}", on_off(state.toggles.allow_ai_channel)),
            format!("Welcome Message Mode: {welcome_mode}"),
            format!("Filter Enabled: {}", on_off(state.toggles.filter_enabled)),
            format!("Debug Logging: {}", enabled(state.toggles.debug_logging_enabled)),
            format!("Context History: {}", enabled(state.toggles.context_history_enabled)),
            format!(
                "Gemini API Key: {}",
                if bot.gemini_api_key.is_empty() { "NOT SET" } else { "SET" }
            ),
            "--- Server Info ---".to_string(),
            format!("Name: {server_name} ({})", self.settings.connection.host),
            format!("Version: {server_version}"),
        ];
        self.send_pm(ctx.sender, &lines.join("\n"));
        Ok(())
    }

    pub(super) fn handle_whoami(&mut self, ctx: &CommandContext) -> Result<()> {
        let reply = match self.transport.user(ctx.sender) {
            Some(user) => format!(
                "Nick: {}\nID: {}\nUser: {}\nAdmin: {}",
                ctx.nickname,
                user.id,
                user.username,
                if self.state.is_admin(ctx.sender) { "Yes" } else { "No" }
            ),
            None => "Error getting your info: user not found".to_string(),
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) fn handle_rights(&mut self, ctx: &CommandContext) -> Result<()> {
        let rights = self.state.my_rights;
        let mut lines = vec![format!("My Permissions ({rights}):")];
        lines.extend(rights.names().into_iter().map(|name| format!("- {name}")));
        self.send_pm(ctx.sender, &lines.join("\n"));
        Ok(())
    }

    pub(super) fn handle_change_nick(&mut self, ctx: &CommandContext, nick: &str) -> Result<()> {
        if nick.chars().count() > MAX_TEXT_LEN {
            self.send_pm(ctx.sender, "Error: Nickname too long.");
            return Ok(());
        }
        self.transport.change_nickname(nick)?;
        self.send_pm(ctx.sender, &format!("Nickname change to '{nick}' requested."));
        Ok(())
    }

    pub(super) fn handle_change_status(&mut self, ctx: &CommandContext, status: &str) -> Result<()> {
        if status.chars().count() > MAX_TEXT_LEN {
            self.send_pm(ctx.sender, "Error: Status too long.");
            return Ok(());
        }
        self.transport.change_status(status)?;
        self.send_pm(ctx.sender, "Status change requested.");
        Ok(())
    }
}
