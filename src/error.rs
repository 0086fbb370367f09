use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("another session is already running: {0}")]
    SessionBusy(String),

    #[error("{0} lock poisoned")]
    StateUnavailable(&'static str),

    #[error("no async runtime: {0}")]
    RuntimeUnavailable(#[from] tokio::runtime::TryCurrentError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self::DataUnavailable(message.into())
    }
}
