pub mod keyword;
pub mod media;
pub mod text;

pub use keyword::KeywordClassifier;
pub use media::HttpMediaClassifier;
pub use text::HttpTextClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Normalized classifier output: safety verdict, confidence in [0,1],
/// deduplicated category tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub safe: bool,
    pub confidence: f32,
    pub reasons: Vec<String>,
}

impl Classification {
    pub fn safe() -> Self {
        Self {
            safe: true,
            confidence: 1.0,
            reasons: Vec::new(),
        }
    }

    pub fn unsafe_with(confidence: f32, reason: &str) -> Self {
        Self {
            safe: false,
            confidence,
            reasons: vec![reason.to_string()],
        }
    }

    /// Pessimistic default when the media round fails: unscored media is
    /// never auto-approved.
    pub fn media_fallback() -> Self {
        Self::unsafe_with(0.5, "media_review_required")
    }

    /// Combine two classifications: safe = AND, confidence = MIN,
    /// reasons = deduplicated union (first-seen order preserved).
    pub fn merge(mut self, other: Classification) -> Classification {
        self.safe = self.safe && other.safe;
        self.confidence = self.confidence.min(other.confidence);
        for reason in other.reasons {
            if !self.reasons.contains(&reason) {
                self.reasons.push(reason);
            }
        }
        self
    }

    /// Fold a media round's per-URL scores into one classification
    pub fn combine(scores: Vec<Classification>) -> Classification {
        scores
            .into_iter()
            .reduce(Classification::merge)
            .unwrap_or_else(Classification::safe)
    }
}

/// External text-scoring capability. May fail or time out; the engine
/// recovers with the keyword fallback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextClassifier: Send + Sync {
    async fn score_text(&self, text: &str) -> Result<Classification>;
}

/// External media-scoring capability, one call per URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaClassifier: Send + Sync {
    async fn score_media(&self, url: &str) -> Result<Classification>;
}
