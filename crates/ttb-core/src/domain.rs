use std::fmt;

/// Longest string the transport accepts in a single field (nickname, status,
/// one text message part).
pub const MAX_TEXT_LEN: usize = 512;

/// Server-assigned user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i32);

/// Server-assigned channel id (numeric). `0` means "no channel".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChannelId(pub i32);

/// Transport command id returned by every outbound request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CmdId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ChannelId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

/// Text message kinds carried by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgType {
    User,
    Channel,
    Broadcast,
    Custom,
}

/// Server rights bitmask held by a logged-in account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct UserRights(pub u32);

impl UserRights {
    pub const NONE: UserRights = UserRights(0x0000_0000);
    pub const MULTI_LOGIN: UserRights = UserRights(0x0000_0001);
    pub const VIEW_ALL_USERS: UserRights = UserRights(0x0000_0002);
    pub const CREATE_TEMPORARY_CHANNEL: UserRights = UserRights(0x0000_0004);
    pub const MODIFY_CHANNELS: UserRights = UserRights(0x0000_0008);
    pub const TEXTMESSAGE_BROADCAST: UserRights = UserRights(0x0000_0010);
    pub const KICK_USERS: UserRights = UserRights(0x0000_0020);
    pub const BAN_USERS: UserRights = UserRights(0x0000_0040);
    pub const MOVE_USERS: UserRights = UserRights(0x0000_0080);
    pub const OPERATOR_ENABLE: UserRights = UserRights(0x0000_0100);
    pub const UPLOAD_FILES: UserRights = UserRights(0x0000_0200);
    pub const DOWNLOAD_FILES: UserRights = UserRights(0x0000_0400);
    pub const UPDATE_SERVERPROPERTIES: UserRights = UserRights(0x0000_0800);
    pub const TRANSMIT_VOICE: UserRights = UserRights(0x0000_1000);
    pub const TRANSMIT_VIDEOCAPTURE: UserRights = UserRights(0x0000_2000);
    pub const TRANSMIT_DESKTOP: UserRights = UserRights(0x0000_4000);
    pub const TRANSMIT_DESKTOPINPUT: UserRights = UserRights(0x0000_8000);
    pub const TRANSMIT_MEDIAFILE_AUDIO: UserRights = UserRights(0x0001_0000);
    pub const TRANSMIT_MEDIAFILE_VIDEO: UserRights = UserRights(0x0002_0000);
    pub const LOCKED_NICKNAME: UserRights = UserRights(0x0004_0000);
    pub const LOCKED_STATUS: UserRights = UserRights(0x0008_0000);
    pub const RECORD_VOICE: UserRights = UserRights(0x0010_0000);
    pub const VIEW_HIDDEN_CHANNELS: UserRights = UserRights(0x0020_0000);

    const NAMED: [(UserRights, &'static str); 22] = [
        (Self::MULTI_LOGIN, "MULTI_LOGIN"),
        (Self::VIEW_ALL_USERS, "VIEW_ALL_USERS"),
        (Self::CREATE_TEMPORARY_CHANNEL, "CREATE_TEMPORARY_CHANNEL"),
        (Self::MODIFY_CHANNELS, "MODIFY_CHANNELS"),
        (Self::TEXTMESSAGE_BROADCAST, "TEXTMESSAGE_BROADCAST"),
        (Self::KICK_USERS, "KICK_USERS"),
        (Self::BAN_USERS, "BAN_USERS"),
        (Self::MOVE_USERS, "MOVE_USERS"),
        (Self::OPERATOR_ENABLE, "OPERATOR_ENABLE"),
        (Self::UPLOAD_FILES, "UPLOAD_FILES"),
        (Self::DOWNLOAD_FILES, "DOWNLOAD_FILES"),
        (Self::UPDATE_SERVERPROPERTIES, "UPDATE_SERVERPROPERTIES"),
        (Self::TRANSMIT_VOICE, "TRANSMIT_VOICE"),
        (Self::TRANSMIT_VIDEOCAPTURE, "TRANSMIT_VIDEOCAPTURE"),
        (Self::TRANSMIT_DESKTOP, "TRANSMIT_DESKTOP"),
        (Self::TRANSMIT_DESKTOPINPUT, "TRANSMIT_DESKTOPINPUT"),
        (Self::TRANSMIT_MEDIAFILE_AUDIO, "TRANSMIT_MEDIAFILE_AUDIO"),
        (Self::TRANSMIT_MEDIAFILE_VIDEO, "TRANSMIT_MEDIAFILE_VIDEO"),
        (Self::LOCKED_NICKNAME, "LOCKED_NICKNAME"),
        (Self::LOCKED_STATUS, "LOCKED_STATUS"),
        (Self::RECORD_VOICE, "RECORD_VOICE"),
        (Self::VIEW_HIDDEN_CHANNELS, "VIEW_HIDDEN_CHANNELS"),
    ];

    pub fn contains(self, other: UserRights) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    /// Names of every right set in this mask, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for UserRights {
    type Output = UserRights;

    fn bitor(self, rhs: Self) -> Self::Output {
        UserRights(self.0 | rhs.0)
    }
}

impl fmt::Display for UserRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Ban scope used by `ban` / `unban`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BanType {
    IpAddress,
    Username,
}

/// Command failure codes reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientError {
    NotLoggedIn,
    InvalidAccount,
    ServerBanned,
    Other(i32),
}

impl ClientError {
    /// Account-level faults after which reconnecting is pointless.
    pub fn is_fatal(self) -> bool {
        matches!(self, ClientError::InvalidAccount | ClientError::ServerBanned)
    }
}

/// A user as seen in the server directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub username: String,
    pub status_message: String,
    pub channel_id: ChannelId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub parent_id: ChannelId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ServerProperties {
    pub name: String,
    pub version: String,
}

/// One wire part of an incoming text message.
///
/// Long texts arrive split across several parts; `more` is `true` on every
/// part but the last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub msg_type: MsgType,
    pub from: UserId,
    pub to: Option<UserId>,
    pub channel_id: ChannelId,
    pub content: String,
    pub more: bool,
}

/// Destination of an outbound text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    User(UserId),
    Channel(ChannelId),
    Broadcast,
}

impl Recipient {
    pub fn msg_type(self) -> MsgType {
        match self {
            Recipient::User(_) => MsgType::User,
            Recipient::Channel(_) => MsgType::Channel,
            Recipient::Broadcast => MsgType::Broadcast,
        }
    }
}
