use serde::Deserialize;
use std::env;

use crate::error::{ModerationError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Storage
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,

    // External classifier endpoints
    pub text_classifier_url: String,
    pub media_classifier_url: String,
    pub review_webhook_url: String,

    // Fallback keyword list
    pub banned_terms_path: String,

    // Classifier timeouts (seconds)
    pub text_timeout_secs: u64,
    pub media_timeout_secs: u64,

    // Decision routing
    pub reject_threshold: f32,
    pub cache_ttl_secs: u64,

    // Worker concurrency ceilings
    pub moderation_concurrency: usize,
    pub review_concurrency: usize,
    pub batch_concurrency: usize,

    // Service configuration
    pub service_name: String,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ModerationError::Config("DATABASE_URL must be set".to_string()))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            text_classifier_url: env::var("TEXT_CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8090/v1/score/text".to_string()),
            media_classifier_url: env::var("MEDIA_CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8091/v1/score/media".to_string()),
            review_webhook_url: env::var("REVIEW_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:8092/v1/moderator-alerts".to_string()),
            banned_terms_path: env::var("BANNED_TERMS_PATH")
                .unwrap_or_else(|_| "data/banned_terms.txt".to_string()),
            text_timeout_secs: env::var("TEXT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            media_timeout_secs: env::var("MEDIA_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            reject_threshold: env::var("REJECT_THRESHOLD")
                .unwrap_or_else(|_| "0.8".to_string())
                .parse()
                .unwrap_or(0.8),
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            moderation_concurrency: env::var("MODERATION_CONCURRENCY")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            review_concurrency: env::var("REVIEW_CONCURRENCY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            batch_concurrency: env::var("BATCH_CONCURRENCY")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "moderation-service".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        let config = Config::from_env().unwrap();
        assert_eq!(config.text_timeout_secs, 10);
        assert_eq!(config.media_timeout_secs, 15);
        assert_eq!(config.reject_threshold, 0.8);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.moderation_concurrency, 10);
        assert_eq!(config.review_concurrency, 5);
        assert_eq!(config.batch_concurrency, 2);
    }
}
