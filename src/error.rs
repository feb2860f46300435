//! Error types for the Veda assistant

use thiserror::Error;

/// Result type alias for Veda operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Veda assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Submitted text was empty after trimming
    #[error("empty input")]
    EmptyInput,

    /// A turn is already being resolved
    #[error("a turn is already in flight")]
    TurnInFlight,

    /// The session has been torn down
    #[error("session detached")]
    Detached,

    /// Speech output error
    #[error("speech error: {0}")]
    Speech(String),

    /// Command resolution error
    #[error("resolver error: {0}")]
    Resolver(String),

    /// Profile fetch error
    #[error("profile error: {0}")]
    Profile(String),

    /// History persistence error
    #[error("persistence error: {0}")]
    Persistence(String),

    /// History index out of range
    #[error("history index {index} out of range (len {len})")]
    HistoryIndex {
        /// Requested index
        index: usize,
        /// Current history length
        len: usize,
    },

    /// Resource opener error
    #[error("open error: {0}")]
    Open(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
