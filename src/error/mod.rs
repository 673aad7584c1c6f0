use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Classifier unavailable: {0}")]
    Classifier(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Enforcement failed: {0}")]
    Enforcement(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for ModerationError {
    fn from(err: redis::RedisError) -> Self {
        ModerationError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;
