use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{Transport, TransportEvent};
use crate::{
    domain::{
        BanType, Channel, ChannelId, CmdId, Recipient, ServerProperties, TextMessage,
        User, UserId, UserRights, MAX_TEXT_LEN,
    },
    errors::Error,
    Result,
};

/// Every request the bot made, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Connect { host: String, port: u16 },
    Disconnect,
    Login { nickname: String, username: String },
    Logout,
    Join { channel_id: ChannelId, password: String },
    Nickname(String),
    Status(String),
    Text { to: Recipient, content: String },
    Move { user_id: UserId, channel_id: ChannelId },
    Kick { user_id: UserId, channel_id: ChannelId },
    Ban { user_id: UserId, ban: BanType },
    Unban { username: String, ban: BanType },
}

struct Directory {
    users: Vec<User>,
    channels: Vec<Channel>,
    server: ServerProperties,
    connected: bool,
    logged_in: bool,
    refuse_connect: bool,
    fail_sends: bool,
    my_id: UserId,
    my_rights: UserRights,
    next_cmd: i32,
    sent: VecDeque<Outbound>,
}

/// In-process transport: a small server directory, an injectable event queue
/// and a log of every outbound request.
///
/// The bot logs in as user `my_id` with `my_rights`. Requests mutate the
/// directory and answer with the events a real server would send.
pub struct LocalTransport {
    dir: Mutex<Directory>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

pub const ROOT_CHANNEL: ChannelId = ChannelId(1);

impl LocalTransport {
    pub fn new(my_id: UserId, my_rights: UserRights) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            dir: Mutex::new(Directory {
                users: Vec::new(),
                channels: vec![Channel {
                    id: ROOT_CHANNEL,
                    parent_id: ChannelId(0),
                    name: String::new(),
                }],
                server: ServerProperties {
                    name: "Local Server".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                connected: false,
                logged_in: false,
                refuse_connect: false,
                fail_sends: false,
                my_id,
                my_rights,
                next_cmd: 1,
                sent: VecDeque::new(),
            }),
            tx,
            rx: AsyncMutex::new(rx),
        }
    }

    fn dir(&self) -> MutexGuard<'_, Directory> {
        // A poisoned lock only means a test panicked mid-update.
        self.dir.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============== Test / console helpers ==============

    pub fn add_channel(&self, id: ChannelId, parent_id: ChannelId, name: &str) {
        self.dir().channels.push(Channel {
            id,
            parent_id,
            name: name.to_string(),
        });
    }

    /// Put a user in the directory without announcing it.
    pub fn add_user(&self, user: User) {
        let mut dir = self.dir();
        dir.users.retain(|u| u.id != user.id);
        dir.users.push(user);
    }

    /// Add a user and emit the join event the server would send.
    pub fn user_joins(&self, user: User) {
        self.add_user(user.clone());
        self.inject(TransportEvent::UserJoined(user));
    }

    pub fn inject(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }

    /// Queue a text from `from`, split into wire parts the way the SDK does.
    pub fn say(&self, from: UserId, to: Recipient, text: &str) {
        let channel_id = match to {
            Recipient::Channel(c) => c,
            _ => ChannelId(0),
        };
        let to_user = match to {
            Recipient::User(u) => Some(u),
            _ => None,
        };
        let parts = wire_parts(text, MAX_TEXT_LEN - 1);
        let last = parts.len().saturating_sub(1);
        for (i, part) in parts.into_iter().enumerate() {
            self.inject(TransportEvent::TextMessage(TextMessage {
                msg_type: to.msg_type(),
                from,
                to: to_user,
                channel_id,
                content: part,
                more: i < last,
            }));
        }
    }

    pub fn set_rights(&self, rights: UserRights) {
        self.dir().my_rights = rights;
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.dir().refuse_connect = refuse;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.dir().fail_sends = fail;
    }

    pub fn is_connected(&self) -> bool {
        self.dir().connected
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.dir().sent.iter().cloned().collect()
    }

    pub fn take_outbound(&self) -> Vec<Outbound> {
        self.dir().sent.drain(..).collect()
    }

    /// Text sent to `to`, one entry per wire part.
    pub fn texts_to(&self, to: Recipient) -> Vec<String> {
        self.dir()
            .sent
            .iter()
            .filter_map(|o| match o {
                Outbound::Text { to: t, content } if *t == to => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, dir: &mut Directory, out: Outbound) -> CmdId {
        tracing::debug!(request = ?out, "local transport request");
        dir.sent.push_back(out);
        let id = dir.next_cmd;
        dir.next_cmd += 1;
        CmdId(id)
    }

    fn require_login(dir: &Directory) -> Result<()> {
        if dir.logged_in {
            Ok(())
        } else {
            Err(Error::Transport("not logged in".to_string()))
        }
    }

    fn path_of(dir: &Directory, id: ChannelId) -> Option<String> {
        let mut names = Vec::new();
        let mut cur = id;
        loop {
            let ch = dir.channels.iter().find(|c| c.id == cur)?;
            if ch.parent_id.0 == 0 {
                break;
            }
            names.push(ch.name.clone());
            cur = ch.parent_id;
        }
        names.reverse();
        if names.is_empty() {
            Some("/".to_string())
        } else {
            Some(format!("/{}/", names.join("/")))
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn connect(&self, host: &str, port: u16) -> Result<()> {
        let mut dir = self.dir();
        self.record(
            &mut dir,
            Outbound::Connect {
                host: host.to_string(),
                port,
            },
        );
        if dir.refuse_connect {
            self.inject(TransportEvent::ConnectFailed);
        } else {
            dir.connected = true;
            self.inject(TransportEvent::ConnectSuccess);
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut dir = self.dir();
        self.record(&mut dir, Outbound::Disconnect);
        dir.connected = false;
        dir.logged_in = false;
        let my_id = dir.my_id;
        dir.users.retain(|u| u.id != my_id);
        Ok(())
    }

    async fn poll_event(&self, timeout: Duration) -> Option<TransportEvent> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    fn login(
        &self,
        nickname: &str,
        username: &str,
        _password: &str,
        _client_name: &str,
    ) -> Result<CmdId> {
        let mut dir = self.dir();
        if !dir.connected {
            return Err(Error::Transport("not connected".to_string()));
        }
        let cmd = self.record(
            &mut dir,
            Outbound::Login {
                nickname: nickname.to_string(),
                username: username.to_string(),
            },
        );
        dir.logged_in = true;
        let me = User {
            id: dir.my_id,
            nickname: nickname.to_string(),
            username: username.to_string(),
            status_message: String::new(),
            channel_id: ChannelId(0),
        };
        dir.users.retain(|u| u.id != me.id);
        dir.users.push(me);
        self.inject(TransportEvent::LoggedIn {
            user_id: dir.my_id,
            rights: dir.my_rights,
        });
        Ok(cmd)
    }

    fn logout(&self) -> Result<CmdId> {
        let mut dir = self.dir();
        let cmd = self.record(&mut dir, Outbound::Logout);
        dir.logged_in = false;
        self.inject(TransportEvent::LoggedOut);
        Ok(cmd)
    }

    fn join_channel(&self, channel_id: ChannelId, password: &str) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        let cmd = self.record(
            &mut dir,
            Outbound::Join {
                channel_id,
                password: password.to_string(),
            },
        );
        if !dir.channels.iter().any(|c| c.id == channel_id) {
            return Ok(cmd);
        }
        let my_id = dir.my_id;
        if let Some(me) = dir.users.iter_mut().find(|u| u.id == my_id) {
            me.channel_id = channel_id;
            let me = me.clone();
            self.inject(TransportEvent::UserJoined(me));
        }
        Ok(cmd)
    }

    fn change_nickname(&self, nickname: &str) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        let cmd = self.record(&mut dir, Outbound::Nickname(nickname.to_string()));
        let my_id = dir.my_id;
        if let Some(me) = dir.users.iter_mut().find(|u| u.id == my_id) {
            me.nickname = nickname.to_string();
            let me = me.clone();
            self.inject(TransportEvent::UserUpdated(me));
        }
        Ok(cmd)
    }

    fn change_status(&self, status: &str) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        let cmd = self.record(&mut dir, Outbound::Status(status.to_string()));
        let my_id = dir.my_id;
        if let Some(me) = dir.users.iter_mut().find(|u| u.id == my_id) {
            me.status_message = status.to_string();
            let me = me.clone();
            self.inject(TransportEvent::UserUpdated(me));
        }
        Ok(cmd)
    }

    fn send_text(&self, to: Recipient, content: &str) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        if dir.fail_sends {
            return Err(Error::Transport("send rejected".to_string()));
        }
        if content.chars().count() >= MAX_TEXT_LEN {
            return Err(Error::InvalidArgument(format!(
                "text part exceeds {} chars",
                MAX_TEXT_LEN - 1
            )));
        }
        Ok(self.record(
            &mut dir,
            Outbound::Text {
                to,
                content: content.to_string(),
            },
        ))
    }

    fn move_user(&self, user_id: UserId, channel_id: ChannelId) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        let cmd = self.record(&mut dir, Outbound::Move { user_id, channel_id });
        if let Some(u) = dir.users.iter_mut().find(|u| u.id == user_id) {
            let from = u.channel_id;
            let before = u.clone();
            u.channel_id = channel_id;
            let after = u.clone();
            if from.is_valid() {
                self.inject(TransportEvent::UserLeft {
                    channel_id: from,
                    user: before,
                });
            }
            self.inject(TransportEvent::UserJoined(after));
        }
        Ok(cmd)
    }

    fn kick_user(&self, user_id: UserId, channel_id: ChannelId) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        let cmd = self.record(&mut dir, Outbound::Kick { user_id, channel_id });
        if let Some(u) = dir
            .users
            .iter_mut()
            .find(|u| u.id == user_id && u.channel_id == channel_id)
        {
            let before = u.clone();
            u.channel_id = ChannelId(0);
            self.inject(TransportEvent::UserLeft {
                channel_id,
                user: before,
            });
        }
        Ok(cmd)
    }

    fn ban_user(&self, user_id: UserId, ban: BanType) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        Ok(self.record(&mut dir, Outbound::Ban { user_id, ban }))
    }

    fn unban_user(&self, username: &str, ban: BanType) -> Result<CmdId> {
        let mut dir = self.dir();
        Self::require_login(&dir)?;
        Ok(self.record(
            &mut dir,
            Outbound::Unban {
                username: username.to_string(),
                ban,
            },
        ))
    }

    fn server_users(&self) -> Vec<User> {
        self.dir().users.clone()
    }

    fn channel_users(&self, channel_id: ChannelId) -> Vec<User> {
        self.dir()
            .users
            .iter()
            .filter(|u| u.channel_id == channel_id)
            .cloned()
            .collect()
    }

    fn server_channels(&self) -> Vec<Channel> {
        self.dir().channels.clone()
    }

    fn user(&self, user_id: UserId) -> Option<User> {
        self.dir().users.iter().find(|u| u.id == user_id).cloned()
    }

    fn channel_id_from_path(&self, path: &str) -> Option<ChannelId> {
        let wanted = normalize_path(path);
        let dir = self.dir();
        dir.channels
            .iter()
            .map(|c| c.id)
            .find(|id| Self::path_of(&dir, *id).as_deref() == Some(wanted.as_str()))
    }

    fn channel_path(&self, channel_id: ChannelId) -> Option<String> {
        Self::path_of(&self.dir(), channel_id)
    }

    fn root_channel_id(&self) -> ChannelId {
        ROOT_CHANNEL
    }

    fn my_channel_id(&self) -> ChannelId {
        let dir = self.dir();
        dir.users
            .iter()
            .find(|u| u.id == dir.my_id)
            .map(|u| u.channel_id)
            .unwrap_or_default()
    }

    fn server_properties(&self) -> Option<ServerProperties> {
        let dir = self.dir();
        dir.connected.then(|| dir.server.clone())
    }
}

/// `"a/b"`, `"/a/b"`, `"/a/b/"` all name the same channel.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn wire_parts(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Shorthand for building directory users in tests and the console.
pub fn user(id: i32, nickname: &str, username: &str, channel_id: ChannelId) -> User {
    User {
        id: UserId(id),
        nickname: nickname.to_string(),
        username: username.to_string(),
        status_message: String::new(),
        channel_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> LocalTransport {
        let t = LocalTransport::new(UserId(1), UserRights::KICK_USERS);
        t.connect("localhost", 10333).unwrap();
        t.login("bot", "botuser", "", "AI bot").unwrap();
        t
    }

    #[tokio::test]
    async fn connect_and_login_emit_events() {
        let t = logged_in();
        let timeout = Duration::from_millis(10);
        assert_eq!(
            t.poll_event(timeout).await,
            Some(TransportEvent::ConnectSuccess)
        );
        assert_eq!(
            t.poll_event(timeout).await,
            Some(TransportEvent::LoggedIn {
                user_id: UserId(1),
                rights: UserRights::KICK_USERS
            })
        );
        assert_eq!(t.poll_event(timeout).await, None);
    }

    #[test]
    fn paths_resolve_both_ways() {
        let t = LocalTransport::new(UserId(1), UserRights::NONE);
        t.add_channel(ChannelId(2), ROOT_CHANNEL, "Lobby");
        t.add_channel(ChannelId(3), ChannelId(2), "Quiet");

        assert_eq!(t.channel_id_from_path("/"), Some(ROOT_CHANNEL));
        assert_eq!(t.channel_id_from_path("/Lobby/Quiet"), Some(ChannelId(3)));
        assert_eq!(t.channel_id_from_path("Lobby/"), Some(ChannelId(2)));
        assert_eq!(t.channel_path(ChannelId(3)).as_deref(), Some("/Lobby/Quiet/"));
        assert_eq!(t.channel_id_from_path("/Nope"), None);
    }

    #[tokio::test]
    async fn long_texts_arrive_in_parts() {
        let t = LocalTransport::new(UserId(1), UserRights::NONE);
        let text = "x".repeat(MAX_TEXT_LEN + 10);
        t.say(UserId(7), Recipient::User(UserId(1)), &text);

        let timeout = Duration::from_millis(10);
        let Some(TransportEvent::TextMessage(first)) = t.poll_event(timeout).await else {
            panic!("expected first part");
        };
        let Some(TransportEvent::TextMessage(second)) = t.poll_event(timeout).await else {
            panic!("expected second part");
        };
        assert!(first.more);
        assert!(!second.more);
        assert_eq!(first.content.len() + second.content.len(), text.len());
    }

    #[test]
    fn sends_require_login_and_respect_length() {
        let t = LocalTransport::new(UserId(1), UserRights::NONE);
        assert!(t.send_text(Recipient::Broadcast, "hi").is_err());

        let t = logged_in();
        assert!(t.send_text(Recipient::Broadcast, "hi").is_ok());
        assert!(t
            .send_text(Recipient::Broadcast, &"y".repeat(MAX_TEXT_LEN))
            .is_err());
        assert_eq!(t.texts_to(Recipient::Broadcast), vec!["hi".to_string()]);
    }

    #[test]
    fn kick_removes_user_from_channel() {
        let t = logged_in();
        t.add_channel(ChannelId(2), ROOT_CHANNEL, "Lobby");
        t.add_user(user(5, "Eve", "eve", ChannelId(2)));
        t.kick_user(UserId(5), ChannelId(2)).unwrap();
        assert!(t.channel_users(ChannelId(2)).is_empty());
        assert!(t
            .outbound()
            .contains(&Outbound::Kick {
                user_id: UserId(5),
                channel_id: ChannelId(2)
            }));
    }
}
