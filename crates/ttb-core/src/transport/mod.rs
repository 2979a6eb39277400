//! Port over the voice-server client SDK.
//!
//! Commands are non-blocking requests answered later by events, the way the
//! vendor SDK behaves: a call returns a command id (or fails immediately),
//! the outcome arrives through [`Transport::poll_event`].

pub mod local;

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{
        BanType, Channel, ChannelId, ClientError, CmdId, Recipient, ServerProperties, TextMessage,
        User, UserId, UserRights,
    },
    Result,
};

pub use local::{LocalTransport, Outbound};

/// Events delivered by the transport's event loop.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    ConnectSuccess,
    ConnectFailed,
    ConnectionLost,
    CmdError {
        cmd_id: CmdId,
        error: ClientError,
        message: String,
    },
    LoggedIn {
        user_id: UserId,
        rights: UserRights,
    },
    LoggedOut,
    UserJoined(User),
    UserLeft {
        channel_id: ChannelId,
        user: User,
    },
    TextMessage(TextMessage),
    UserUpdated(User),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting; success or failure arrives as an event.
    fn connect(&self, host: &str, port: u16) -> Result<()>;
    fn disconnect(&self) -> Result<()>;

    /// Wait up to `timeout` for the next event. Must be cancel-safe: it is
    /// polled inside `tokio::select!`.
    async fn poll_event(&self, timeout: Duration) -> Option<TransportEvent>;

    fn login(&self, nickname: &str, username: &str, password: &str, client_name: &str)
        -> Result<CmdId>;
    fn logout(&self) -> Result<CmdId>;

    fn join_channel(&self, channel_id: ChannelId, password: &str) -> Result<CmdId>;
    fn change_nickname(&self, nickname: &str) -> Result<CmdId>;
    fn change_status(&self, status: &str) -> Result<CmdId>;
    /// Send one part; callers keep `content` within `MAX_TEXT_LEN`.
    fn send_text(&self, to: Recipient, content: &str) -> Result<CmdId>;

    fn move_user(&self, user_id: UserId, channel_id: ChannelId) -> Result<CmdId>;
    fn kick_user(&self, user_id: UserId, channel_id: ChannelId) -> Result<CmdId>;
    fn ban_user(&self, user_id: UserId, ban: BanType) -> Result<CmdId>;
    fn unban_user(&self, username: &str, ban: BanType) -> Result<CmdId>;

    // Directory queries (served from the SDK's local cache).
    fn server_users(&self) -> Vec<User>;
    fn channel_users(&self, channel_id: ChannelId) -> Vec<User>;
    fn server_channels(&self) -> Vec<Channel>;
    fn user(&self, user_id: UserId) -> Option<User>;
    fn channel_id_from_path(&self, path: &str) -> Option<ChannelId>;
    fn channel_path(&self, channel_id: ChannelId) -> Option<String>;
    fn root_channel_id(&self) -> ChannelId;
    fn my_channel_id(&self) -> ChannelId;
    fn server_properties(&self) -> Option<ServerProperties>;
}
