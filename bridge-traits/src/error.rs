use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure happened before any response was received.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed(_) | BridgeError::Timeout | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
