use std::path::PathBuf;

/// Core error type for the bot.
///
/// Adapter crates map their failures into this type (or into a textual
/// payload for the service ports) so the session worker handles them the same
/// way: log, reply with an opaque message, keep the event loop alive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
