use bridge_traits::BridgeError;
use thiserror::Error;

/// Runtime-level failures: configuration and wiring problems detected before
/// any media or log operation runs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Bridge initialization failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
