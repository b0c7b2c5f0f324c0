use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Metadata error for table {table}: {message}")]
    Metadata { table: String, message: String },

    #[error("Journal poll failed for table {table}: {message}")]
    Journal { table: String, message: String },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Watermark update failed for table {table}: {message}")]
    Watermark { table: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
