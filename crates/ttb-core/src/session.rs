use std::{
    collections::{BTreeSet, HashSet},
    time::Instant,
};

use crate::{
    config::{Settings, WelcomeMode},
    domain::{ChannelId, UserId, UserRights},
    lifecycle::Phase,
    security::WordFilter,
};

/// Runtime switches an admin can flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    AnnounceJoinLeave,
    ChannelMessages,
    Broadcast,
    AiPm,
    AiChannel,
    Filter,
    ContextHistory,
    DebugLogging,
    Locked,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::AnnounceJoinLeave,
        Feature::ChannelMessages,
        Feature::Broadcast,
        Feature::AiPm,
        Feature::AiChannel,
        Feature::Filter,
        Feature::ContextHistory,
        Feature::DebugLogging,
        Feature::Locked,
    ];

    /// Human label used in "<label> is now ON." notices.
    pub fn label(self) -> &'static str {
        match self {
            Feature::AnnounceJoinLeave => "Join/Leave Announce",
            Feature::ChannelMessages => "Allow Channel Messages",
            Feature::Broadcast => "Allow Broadcasts",
            Feature::AiPm => "Allow Gemini PM",
            Feature::AiChannel => "Allow Gemini Channel",
            Feature::Filter => "Word Filter",
            Feature::ContextHistory => "Context History",
            Feature::DebugLogging => "Debug Logging",
            Feature::Locked => "Bot lock",
        }
    }

    /// Console name (`toggle <name>`).
    pub fn short_name(self) -> &'static str {
        match self {
            Feature::AnnounceJoinLeave => "jcl",
            Feature::ChannelMessages => "chanmsg",
            Feature::Broadcast => "broadcast",
            Feature::AiPm => "aipm",
            Feature::AiChannel => "aichan",
            Feature::Filter => "filter",
            Feature::ContextHistory => "context_history",
            Feature::DebugLogging => "debug_logging",
            Feature::Locked => "lock",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Feature> {
        let name = name.trim().to_lowercase();
        Feature::ALL.into_iter().find(|f| f.short_name() == name)
    }

    pub fn notice(self, on: bool) -> String {
        format!("{} is now {}.", self.label(), on_off(on))
    }
}

pub fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Toggles {
    pub announce_join_leave: bool,
    pub allow_channel_messages: bool,
    pub allow_broadcast: bool,
    pub allow_ai_pm: bool,
    pub allow_ai_channel: bool,
    pub filter_enabled: bool,
    pub context_history_enabled: bool,
    pub debug_logging_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ToggleError {
    /// The filter cannot be switched on with an empty word list.
    #[error("Cannot enable filter: no words defined.")]
    NoFilterWords,
}

/// Everything the session worker knows about its own connection and policy.
///
/// Owned by the worker and handed to handlers by `&mut`; presentation reads
/// go through [`StatusSnapshot`].
#[derive(Debug)]
pub struct SessionState {
    pub connected: bool,
    pub logged_in: bool,
    pub in_channel: bool,
    pub my_user_id: Option<UserId>,
    pub my_rights: UserRights,
    pub target_channel_id: ChannelId,
    pub target_channel_path: String,
    pub channel_password: String,
    pub nickname: String,
    pub status_message: String,
    pub admin_ids: HashSet<UserId>,
    pub blocked_commands: BTreeSet<String>,
    pub locked: bool,
    pub toggles: Toggles,
    pub welcome_mode: WelcomeMode,
    pub filter: WordFilter,
    pub started_at: Instant,
}

impl SessionState {
    /// AI toggles start off when the AI service is unavailable.
    pub fn from_settings(settings: &Settings, ai_enabled: bool) -> Self {
        let bot = &settings.bot;
        let filter = WordFilter::new(&bot.filtered_words);
        let filter_enabled = bot.filter_enabled.unwrap_or(!filter.is_empty());
        Self {
            connected: false,
            logged_in: false,
            in_channel: false,
            my_user_id: None,
            my_rights: UserRights::NONE,
            target_channel_id: ChannelId(0),
            target_channel_path: settings.connection.channel.clone(),
            channel_password: settings.connection.channel_password.clone(),
            nickname: settings.connection.nickname.clone(),
            status_message: bot.status_message.clone(),
            admin_ids: HashSet::new(),
            blocked_commands: BTreeSet::new(),
            locked: false,
            toggles: Toggles {
                announce_join_leave: bot.announce_join_leave,
                allow_channel_messages: bot.allow_channel_messages,
                allow_broadcast: bot.allow_broadcast,
                allow_ai_pm: bot.allow_ai_pm && ai_enabled,
                allow_ai_channel: bot.allow_ai_channel && ai_enabled,
                filter_enabled,
                context_history_enabled: bot.context_history_enabled,
                debug_logging_enabled: bot.debug_logging_enabled,
            },
            welcome_mode: bot.welcome_message_mode,
            filter,
            started_at: Instant::now(),
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn get(&self, feature: Feature) -> bool {
        let t = &self.toggles;
        match feature {
            Feature::AnnounceJoinLeave => t.announce_join_leave,
            Feature::ChannelMessages => t.allow_channel_messages,
            Feature::Broadcast => t.allow_broadcast,
            Feature::AiPm => t.allow_ai_pm,
            Feature::AiChannel => t.allow_ai_channel,
            Feature::Filter => t.filter_enabled,
            Feature::ContextHistory => t.context_history_enabled,
            Feature::DebugLogging => t.debug_logging_enabled,
            Feature::Locked => self.locked,
        }
    }

    pub fn set(&mut self, feature: Feature, on: bool) {
        let t = &mut self.toggles;
        match feature {
            Feature::AnnounceJoinLeave => t.announce_join_leave = on,
            Feature::ChannelMessages => t.allow_channel_messages = on,
            Feature::Broadcast => t.allow_broadcast = on,
            Feature::AiPm => t.allow_ai_pm = on,
            Feature::AiChannel => t.allow_ai_channel = on,
            Feature::Filter => t.filter_enabled = on,
            Feature::ContextHistory => t.context_history_enabled = on,
            Feature::DebugLogging => t.debug_logging_enabled = on,
            Feature::Locked => self.locked = on,
        }
    }

    /// Flip `feature` and return its new state.
    pub fn toggle(&mut self, feature: Feature) -> Result<bool, ToggleError> {
        let next = !self.get(feature);
        if feature == Feature::Filter && next && self.filter.is_empty() {
            return Err(ToggleError::NoFilterWords);
        }
        self.set(feature, next);
        tracing::info!(feature = feature.short_name(), on = next, "feature toggled");
        Ok(next)
    }

    /// The filter only runs when enabled and non-empty.
    pub fn filter_active(&self) -> bool {
        self.toggles.filter_enabled && !self.filter.is_empty()
    }

    /// Flip a command in or out of the blocked set; returns `true` when it is
    /// now blocked.
    pub fn toggle_block(&mut self, word: &str) -> bool {
        if self.blocked_commands.remove(word) {
            false
        } else {
            self.blocked_commands.insert(word.to_string());
            true
        }
    }

    /// Copy the persisted subset of the session into `settings`.
    pub fn write_to(&self, settings: &mut Settings) {
        settings.connection.nickname = self.nickname.clone();
        let bot = &mut settings.bot;
        bot.status_message = self.status_message.clone();
        bot.filtered_words = self.filter.words().map(str::to_string).collect();
        bot.announce_join_leave = self.toggles.announce_join_leave;
        bot.allow_channel_messages = self.toggles.allow_channel_messages;
        bot.allow_broadcast = self.toggles.allow_broadcast;
        bot.allow_ai_pm = self.toggles.allow_ai_pm;
        bot.allow_ai_channel = self.toggles.allow_ai_channel;
        bot.filter_enabled = Some(self.toggles.filter_enabled);
        bot.context_history_enabled = self.toggles.context_history_enabled;
        bot.debug_logging_enabled = self.toggles.debug_logging_enabled;
        bot.welcome_message_mode = self.welcome_mode;
    }

    pub fn snapshot(&self, phase: Phase) -> StatusSnapshot {
        StatusSnapshot {
            phase,
            nickname: self.nickname.clone(),
            my_user_id: self.my_user_id,
            in_channel: self.in_channel,
            target_channel_path: self.target_channel_path.clone(),
            locked: self.locked,
            toggles: self.toggles,
            welcome_mode: self.welcome_mode,
            admin_count: self.admin_ids.len(),
            blocked_commands: self.blocked_commands.iter().cloned().collect(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Read-only view published to presentation tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub nickname: String,
    pub my_user_id: Option<UserId>,
    pub in_channel: bool,
    pub target_channel_path: String,
    pub locked: bool,
    pub toggles: Toggles,
    pub welcome_mode: WelcomeMode,
    pub admin_count: usize,
    pub blocked_commands: Vec<String>,
    pub uptime_secs: u64,
}
