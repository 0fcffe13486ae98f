use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Failed to decode payload: {0}")]
    Decode(String),

    #[error("Callback for filter {filter} panicked: {reason}")]
    Callback { filter: String, reason: String },

    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("No payload contract for topic: {0}")]
    UnknownTopic(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
