use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipewatchError {
    #[error("API returned status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("API still returned status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid job history: {0}")]
    History(String),

    #[error("Package error: {0}")]
    Package(String),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipewatchError>;
