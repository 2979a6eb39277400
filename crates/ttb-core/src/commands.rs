//! Command table and argument parsing.
//!
//! A chat line is split into `(word, rest)`; the word resolves to a
//! [`CommandKind`] through the table for its origin, then the rest is parsed
//! once into a typed [`Command`].

use crate::session::Feature;

/// Where a command came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Private,
    Channel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Ping,
    Info,
    WhoAmI,
    Rights,
    ChangeNick,
    ChangeStatus,
    Weather,
    Quote,
    Event,
    Ask,
    Poll,
    Vote,
    Results,
    SetWelcomeInstruction,
    Instruct,
    Toggle(Feature),
    WelcomeMode,
    Block,
    Restart,
    Quit,
    GeminiKey,
    HarikuKey,
    ListModels,
    SetModel,
    AddWord,
    DelWord,
    SetRetention,
    ListUsers,
    ListChannels,
    Move,
    Kick,
    Ban,
    Unban,
    Admins,
    JoinChannel,
    ChannelText,
    BroadcastText,
}

/// Words that still work while the bot is locked and can never be blocked.
pub const UNBLOCKABLE: [&str; 11] = [
    "h", "q", "rs", "block", "unblock", "info", "whoami", "rights", "lock", "tfilter", "tgmmode",
];

pub fn is_unblockable(word: &str) -> bool {
    UNBLOCKABLE.contains(&word)
}

const PRIVATE_TABLE: &[(&str, CommandKind)] = &[
    ("h", CommandKind::Help),
    ("ping", CommandKind::Ping),
    ("info", CommandKind::Info),
    ("whoami", CommandKind::WhoAmI),
    ("rights", CommandKind::Rights),
    ("cn", CommandKind::ChangeNick),
    ("cs", CommandKind::ChangeStatus),
    ("w", CommandKind::Weather),
    ("quote", CommandKind::Quote),
    ("event", CommandKind::Event),
    ("c", CommandKind::Ask),
    ("poll", CommandKind::Poll),
    ("vote", CommandKind::Vote),
    ("results", CommandKind::Results),
    ("setwelcomeinstruction", CommandKind::SetWelcomeInstruction),
    ("instruct", CommandKind::Instruct),
    // admin
    ("lock", CommandKind::Toggle(Feature::Locked)),
    ("block", CommandKind::Block),
    ("unblock", CommandKind::Block),
    ("rs", CommandKind::Restart),
    ("q", CommandKind::Quit),
    ("gapi", CommandKind::GeminiKey),
    ("harikuapi", CommandKind::HarikuKey),
    ("list_gemini_models", CommandKind::ListModels),
    ("lgm", CommandKind::ListModels),
    ("set_gemini_model", CommandKind::SetModel),
    ("sgm", CommandKind::SetModel),
    ("addword", CommandKind::AddWord),
    ("delword", CommandKind::DelWord),
    ("set_context_retention", CommandKind::SetRetention),
    ("jcl", CommandKind::Toggle(Feature::AnnounceJoinLeave)),
    ("tg_chanmsg", CommandKind::Toggle(Feature::ChannelMessages)),
    ("tg_broadcast", CommandKind::Toggle(Feature::Broadcast)),
    ("tg_gemini_pm", CommandKind::Toggle(Feature::AiPm)),
    ("tg_gemini_chan", CommandKind::Toggle(Feature::AiChannel)),
    ("tgmmode", CommandKind::WelcomeMode),
    ("tfilter", CommandKind::Toggle(Feature::Filter)),
    ("tg_context_history", CommandKind::Toggle(Feature::ContextHistory)),
    ("tg_debug_logging", CommandKind::Toggle(Feature::DebugLogging)),
    ("listusers", CommandKind::ListUsers),
    ("listchannels", CommandKind::ListChannels),
    ("move", CommandKind::Move),
    ("kick", CommandKind::Kick),
    ("ban", CommandKind::Ban),
    ("unban", CommandKind::Unban),
    ("admins", CommandKind::Admins),
    ("jc", CommandKind::JoinChannel),
    ("ct", CommandKind::ChannelText),
    ("bm", CommandKind::BroadcastText),
];

const CHANNEL_TABLE: &[(&str, CommandKind)] = &[
    ("h", CommandKind::Help),
    ("w", CommandKind::Weather),
    ("c", CommandKind::Ask),
    ("poll", CommandKind::Poll),
    ("vote", CommandKind::Vote),
    ("results", CommandKind::Results),
    ("instruct", CommandKind::Instruct),
    ("quote", CommandKind::Quote),
    ("event", CommandKind::Event),
];

impl CommandKind {
    pub fn resolve(word: &str, origin: Origin) -> Option<CommandKind> {
        let table = match origin {
            Origin::Private => PRIVATE_TABLE,
            Origin::Channel => CHANNEL_TABLE,
        };
        table.iter().find(|(w, _)| *w == word).map(|(_, k)| *k)
    }

    pub fn is_admin_only(self) -> bool {
        !matches!(
            self,
            CommandKind::Help
                | CommandKind::Ping
                | CommandKind::Info
                | CommandKind::WhoAmI
                | CommandKind::Rights
                | CommandKind::ChangeNick
                | CommandKind::ChangeStatus
                | CommandKind::Weather
                | CommandKind::Quote
                | CommandKind::Event
                | CommandKind::Ask
                | CommandKind::Poll
                | CommandKind::Vote
                | CommandKind::Results
                | CommandKind::SetWelcomeInstruction
        )
    }

    pub fn in_table(self, origin: Origin) -> bool {
        let table = match origin {
            Origin::Private => PRIVATE_TABLE,
            Origin::Channel => CHANNEL_TABLE,
        };
        table.iter().any(|(_, k)| *k == self)
    }
}

/// Split a chat line into a lowercased command word and the untouched rest.
/// Channel lines lose one leading `/`.
pub fn split_command(text: &str, origin: Origin) -> (String, String) {
    let text = text.trim();
    let (word, rest) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim_start()),
        None => (text, ""),
    };
    let mut word = word.to_lowercase();
    if origin == Origin::Channel {
        if let Some(stripped) = word.strip_prefix('/') {
            word = stripped.to_string();
        }
    }
    (word, rest.to_string())
}

// ============== Typed commands ==============

pub const DEFAULT_QUOTE_LANG: &str = "en";
pub const DEFAULT_EVENT_COUNTRY: &str = "ID";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventQuery {
    Today,
    /// `on YYYY-MM-DD`
    Date(String),
    /// `YYYY-MM-DD`: the week starting that day.
    Week(String),
    Month(String),
    Year(String),
    Search(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Ping,
    Info,
    WhoAmI,
    Rights,
    ChangeNick(String),
    ChangeStatus(String),
    /// Empty means "show usage" (replied to the origin).
    Weather(String),
    Quote { lang: String, id: Option<u32> },
    Event { country: String, query: EventQuery },
    /// Empty means "show usage" (after the availability checks).
    Ask(String),
    Poll(String),
    Vote { poll_id: u32, choice: usize },
    Results(Option<u32>),
    SetWelcomeInstruction(String),
    /// Empty means "show usage" (replied to the origin).
    Instruct(String),
    Toggle(Feature),
    WelcomeMode,
    /// Empty means "list blocked commands".
    Block(String),
    Restart,
    Quit,
    GeminiKey(String),
    HarikuKey(String),
    ListModels,
    SetModel(String),
    AddWord(String),
    DelWord(String),
    SetRetention(u64),
    ListUsers(Option<String>),
    ListChannels,
    Move { nick: String, path: String },
    Kick(String),
    Ban(String),
    Unban(String),
    Admins,
    JoinChannel { path: String, password: String },
    /// Empty means "show usage" (after the in-channel check).
    ChannelText(String),
    BroadcastText(String),
}

impl Command {
    /// Parse the argument text for `kind`. `Err` carries the usage reply.
    pub fn parse(kind: CommandKind, args: &str) -> Result<Command, String> {
        let trimmed = args.trim();
        let required = |usage: &str| -> Result<String, String> {
            if trimmed.is_empty() {
                Err(usage.to_string())
            } else {
                Ok(trimmed.to_string())
            }
        };

        Ok(match kind {
            CommandKind::Help => Command::Help,
            CommandKind::Ping => Command::Ping,
            CommandKind::Info => Command::Info,
            CommandKind::WhoAmI => Command::WhoAmI,
            CommandKind::Rights => Command::Rights,
            CommandKind::ChangeNick => {
                Command::ChangeNick(required("Usage: cn <new_nickname>")?)
            }
            CommandKind::ChangeStatus => Command::ChangeStatus(trimmed.to_string()),
            CommandKind::Weather => Command::Weather(trimmed.to_string()),
            CommandKind::Quote => parse_quote(trimmed),
            CommandKind::Event => parse_event(trimmed),
            CommandKind::Ask => Command::Ask(trimmed.to_string()),
            CommandKind::Poll => Command::Poll(trimmed.to_string()),
            CommandKind::Vote => parse_vote(trimmed)?,
            CommandKind::Results => {
                if trimmed.is_empty() {
                    Command::Results(None)
                } else {
                    let id = trimmed
                        .parse::<u32>()
                        .map_err(|_| "Usage: results <poll_id>".to_string())?;
                    Command::Results(Some(id))
                }
            }
            CommandKind::SetWelcomeInstruction => Command::SetWelcomeInstruction(required(
                "Usage: setwelcomeinstruction <instructions>",
            )?),
            CommandKind::Instruct => Command::Instruct(trimmed.to_string()),
            CommandKind::Toggle(f) => Command::Toggle(f),
            CommandKind::WelcomeMode => Command::WelcomeMode,
            CommandKind::Block => Command::Block(trimmed.to_lowercase()),
            CommandKind::Restart => Command::Restart,
            CommandKind::Quit => Command::Quit,
            CommandKind::GeminiKey => {
                Command::GeminiKey(required("Usage: gapi <your_gemini_api_key>")?)
            }
            CommandKind::HarikuKey => {
                Command::HarikuKey(required("Usage: harikuapi <your_hariku_api_key>")?)
            }
            CommandKind::ListModels => Command::ListModels,
            CommandKind::SetModel => {
                Command::SetModel(required("Usage: set_gemini_model <model_name>")?)
            }
            CommandKind::AddWord => {
                Command::AddWord(required("Usage: addword <word>")?.to_lowercase())
            }
            CommandKind::DelWord => {
                Command::DelWord(required("Usage: delword <word>")?.to_lowercase())
            }
            CommandKind::SetRetention => {
                let minutes = trimmed.parse::<u64>().map_err(|_| {
                    "Usage: set_context_retention <minutes> (e.g., set_context_retention 60)"
                        .to_string()
                })?;
                Command::SetRetention(minutes)
            }
            CommandKind::ListUsers => {
                Command::ListUsers((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            CommandKind::ListChannels => Command::ListChannels,
            CommandKind::Move => {
                let usage = || "Usage: move <nick> <channel_path>".to_string();
                let (nick, path) = trimmed.split_once(char::is_whitespace).ok_or_else(usage)?;
                let path = path.trim();
                if path.is_empty() {
                    return Err(usage());
                }
                Command::Move {
                    nick: nick.to_string(),
                    path: path.to_string(),
                }
            }
            CommandKind::Kick => Command::Kick(required("Usage: kick <nick>")?),
            CommandKind::Ban => Command::Ban(required("Usage: ban <nick>")?),
            CommandKind::Unban => Command::Unban(required("Usage: unban <username>")?),
            CommandKind::Admins => Command::Admins,
            CommandKind::JoinChannel => {
                let raw = required("Usage: jc <channel_path>[|password]")?;
                let (path, password) = match raw.split_once('|') {
                    Some((p, pw)) => (p.trim().to_string(), pw.to_string()),
                    None => (raw.clone(), String::new()),
                };
                Command::JoinChannel { path, password }
            }
            CommandKind::ChannelText => Command::ChannelText(trimmed.to_string()),
            CommandKind::BroadcastText => {
                Command::BroadcastText(required("Usage: bm <message>")?)
            }
        })
    }
}

fn parse_vote(args: &str) -> Result<Command, String> {
    let usage = || "Usage: vote <poll_id> <option_number>".to_string();
    let mut it = args.split_whitespace();
    let poll_id = it.next().and_then(|s| s.parse::<u32>().ok()).ok_or_else(usage)?;
    let choice = it.next().and_then(|s| s.parse::<usize>().ok()).ok_or_else(usage)?;
    if it.next().is_some() {
        return Err(usage());
    }
    Ok(Command::Vote { poll_id, choice })
}

fn parse_quote(args: &str) -> Command {
    let mut lang = DEFAULT_QUOTE_LANG.to_string();
    let mut id = None;
    for token in args.split_whitespace() {
        let lower = token.to_lowercase();
        if lower == "en" || lower == "id" {
            lang = lower;
        } else if let Ok(n) = token.parse::<u32>() {
            id = Some(n);
        }
    }
    Command::Quote { lang, id }
}

fn parse_event(args: &str) -> Command {
    let mut tokens: Vec<&str> = args.split_whitespace().collect();
    let mut country = DEFAULT_EVENT_COUNTRY.to_string();
    if let Some(first) = tokens.first() {
        if first.len() == 2
            && first.chars().all(|c| c.is_ascii_alphabetic())
            && !first.eq_ignore_ascii_case("on")
        {
            country = first.to_uppercase();
            tokens.remove(0);
        }
    }

    let query = match tokens.as_slice() {
        [] => EventQuery::Today,
        [on, date] if on.eq_ignore_ascii_case("on") && is_date(date) => {
            EventQuery::Date(date.to_string())
        }
        [one] if is_date(one) => EventQuery::Week(one.to_string()),
        [one] if is_month(one) => EventQuery::Month(one.to_string()),
        [one] if is_year(one) => EventQuery::Year(one.to_string()),
        rest => EventQuery::Search(rest.join(" ")),
    };
    Command::Event { country, query }
}

fn digits(s: &str, n: usize) -> bool {
    s.len() == n && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_year(s: &str) -> bool {
    digits(s, 4)
}

fn is_month(s: &str) -> bool {
    matches!(s.split('-').collect::<Vec<_>>().as_slice(), [y, m] if digits(y, 4) && digits(m, 2))
}

fn is_date(s: &str) -> bool {
    matches!(
        s.split('-').collect::<Vec<_>>().as_slice(),
        [y, m, d] if digits(y, 4) && digits(m, 2) && digits(d, 2)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lowercases_word_and_strips_channel_slash() {
        assert_eq!(
            split_command("  /W   Jakarta Selatan ", Origin::Channel),
            ("w".to_string(), "Jakarta Selatan".to_string())
        );
        assert_eq!(
            split_command("/w x", Origin::Private),
            ("/w".to_string(), "x".to_string())
        );
        assert_eq!(split_command("   ", Origin::Private).0, "");
    }

    #[test]
    fn tables_differ_by_origin() {
        assert_eq!(
            CommandKind::resolve("kick", Origin::Private),
            Some(CommandKind::Kick)
        );
        assert_eq!(CommandKind::resolve("kick", Origin::Channel), None);
        assert_eq!(
            CommandKind::resolve("lgm", Origin::Private),
            Some(CommandKind::ListModels)
        );
        assert!(CommandKind::Instruct.in_table(Origin::Channel));
        assert!(!CommandKind::Ping.in_table(Origin::Channel));
    }

    #[test]
    fn admin_flags() {
        assert!(CommandKind::Kick.is_admin_only());
        assert!(CommandKind::Instruct.is_admin_only());
        assert!(CommandKind::Toggle(Feature::Locked).is_admin_only());
        assert!(!CommandKind::Poll.is_admin_only());
        assert!(!CommandKind::SetWelcomeInstruction.is_admin_only());
    }

    #[test]
    fn unblockable_set() {
        for w in ["h", "q", "rs", "block", "unblock", "lock", "tgmmode"] {
            assert!(is_unblockable(w));
        }
        assert!(!is_unblockable("w"));
    }

    #[test]
    fn vote_parsing() {
        assert_eq!(
            Command::parse(CommandKind::Vote, "3 2"),
            Ok(Command::Vote {
                poll_id: 3,
                choice: 2
            })
        );
        assert_eq!(
            Command::parse(CommandKind::Vote, "3").unwrap_err(),
            "Usage: vote <poll_id> <option_number>"
        );
        assert!(Command::parse(CommandKind::Vote, "a b").is_err());
    }

    #[test]
    fn join_channel_with_password() {
        assert_eq!(
            Command::parse(CommandKind::JoinChannel, "/Lobby/|s3cret"),
            Ok(Command::JoinChannel {
                path: "/Lobby/".to_string(),
                password: "s3cret".to_string()
            })
        );
        assert_eq!(
            Command::parse(CommandKind::JoinChannel, "").unwrap_err(),
            "Usage: jc <channel_path>[|password]"
        );
    }

    #[test]
    fn move_needs_two_arguments() {
        assert_eq!(
            Command::parse(CommandKind::Move, "eve /Lobby/"),
            Ok(Command::Move {
                nick: "eve".to_string(),
                path: "/Lobby/".to_string()
            })
        );
        assert!(Command::parse(CommandKind::Move, "eve").is_err());
    }

    #[test]
    fn quote_arguments() {
        assert_eq!(
            Command::parse(CommandKind::Quote, ""),
            Ok(Command::Quote {
                lang: "en".to_string(),
                id: None
            })
        );
        assert_eq!(
            Command::parse(CommandKind::Quote, "ID 42"),
            Ok(Command::Quote {
                lang: "id".to_string(),
                id: Some(42)
            })
        );
    }

    #[test]
    fn event_arguments() {
        let parse = |s: &str| match Command::parse(CommandKind::Event, s) {
            Ok(Command::Event { country, query }) => (country, query),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(parse(""), ("ID".to_string(), EventQuery::Today));
        assert_eq!(
            parse("us 2024-05-01"),
            ("US".to_string(), EventQuery::Week("2024-05-01".to_string()))
        );
        assert_eq!(
            parse("2024-05"),
            ("ID".to_string(), EventQuery::Month("2024-05".to_string()))
        );
        assert_eq!(
            parse("2024"),
            ("ID".to_string(), EventQuery::Year("2024".to_string()))
        );
        assert_eq!(
            parse("on 2024-08-17"),
            ("ID".to_string(), EventQuery::Date("2024-08-17".to_string()))
        );
        assert_eq!(
            parse("independence day"),
            ("ID".to_string(), EventQuery::Search("independence day".to_string()))
        );
    }

    #[test]
    fn retention_requires_a_number() {
        assert_eq!(
            Command::parse(CommandKind::SetRetention, "90"),
            Ok(Command::SetRetention(90))
        );
        assert!(Command::parse(CommandKind::SetRetention, "-5").is_err());
    }
}
