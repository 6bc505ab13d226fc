use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Media error: {0}")]
    Media(#[from] core_media::MediaError),

    #[error("Log stream error: {0}")]
    LogStream(#[from] core_logs::LogStreamError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
