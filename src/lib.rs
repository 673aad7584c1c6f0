pub mod cache;
pub mod classifiers;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod queue;
pub mod services;
pub mod workers;

// Re-export commonly used types
pub use config::Config;
pub use error::{ModerationError, Result};
pub use models::{
    ContentType, ModerationResult, ModerationStatus, PendingItem, ReviewDecision, StatsRow,
};
pub use services::{EngineSettings, ModerationEngine};
