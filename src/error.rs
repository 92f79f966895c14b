use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source unreachable: {url}: {reason}")]
    SourceUnreachable { url: String, reason: String },

    #[error("Content at {url} does not look like property data")]
    ContentMismatch { url: String },

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Pipeline stage '{stage}' failed: {message}")]
    PipelineStage { stage: String, message: String },

    #[error("Integration already running")]
    AlreadyRunning,

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
