use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogStreamError {
    /// No endpoint could be derived from the configuration.
    #[error("Log stream endpoint is not configured")]
    Unconfigured,

    #[error("Log stream transport error: {0}")]
    Transport(#[from] BridgeError),

    /// An inbound frame that is not a log record.
    #[error("Invalid log record: {0}")]
    InvalidRecord(String),

    #[error("No tokio runtime to drive the log stream: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, LogStreamError>;
