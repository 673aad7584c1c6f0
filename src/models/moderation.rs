use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::classifiers::Classification;
use crate::error::ModerationError;

/// Content type enum. Closed set: enforcement dispatches on this
/// exhaustively, so adding a moderatable type is a compile-time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "content_kind", rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Comment,
    Story,
    Reel,
    Message,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Comment => "comment",
            ContentType::Story => "story",
            ContentType::Reel => "reel",
            ContentType::Message => "message",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ContentType::Post),
            "comment" => Ok(ContentType::Comment),
            "story" => Ok(ContentType::Story),
            "reel" => Ok(ContentType::Reel),
            "message" => Ok(ContentType::Message),
            other => Err(ModerationError::InvalidInput(format!(
                "Unknown content type: {}",
                other
            ))),
        }
    }
}

/// Decision status. `pending` exists for review-queue semantics only;
/// the automated path always lands on approved/rejected/flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "moderation_status", rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Flagged => "flagged",
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human review decision. Reviewers can only approve or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn as_status(&self) -> ModerationStatus {
        match self {
            ReviewDecision::Approved => ModerationStatus::Approved,
            ReviewDecision::Rejected => ModerationStatus::Rejected,
        }
    }
}

/// Current moderation decision for one content item
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModerationResult {
    pub content_id: String,
    pub content_type: ContentType,
    pub status: ModerationStatus,
    pub confidence: f32,
    pub reasons: Vec<String>,
    pub automated: bool,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationResult {
    /// Build an automated decision from a combined classification
    pub fn automated(
        content_id: &str,
        content_type: ContentType,
        status: ModerationStatus,
        classification: Classification,
    ) -> Self {
        let now = Utc::now();
        Self {
            content_id: content_id.to_string(),
            content_type,
            status,
            confidence: classification.confidence,
            reasons: classification.reasons,
            automated: true,
            reviewed_by: None,
            reviewed_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Safe-failure decision for pipeline faults. Always flagged at zero
    /// confidence so uncertain content is never silently approved.
    pub fn error_fallback(content_id: &str, content_type: ContentType) -> Self {
        let now = Utc::now();
        Self {
            content_id: content_id.to_string(),
            content_type,
            status: ModerationStatus::Flagged,
            confidence: 0.0,
            reasons: vec!["moderation_error".to_string()],
            automated: true,
            reviewed_by: None,
            reviewed_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn needs_review(&self) -> bool {
        self.status == ModerationStatus::Flagged && self.reviewed_at.is_none()
    }
}

/// Pending-queue row joined with minimal content metadata for reviewer display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingItem {
    pub content_id: String,
    pub content_type: ContentType,
    pub confidence: f32,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub author_id: Option<Uuid>,
    pub snippet: Option<String>,
}

/// Aggregate stats bucket: counts by (content_type, status, automated)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatsRow {
    pub content_type: ContentType,
    pub status: ModerationStatus,
    pub automated: bool,
    pub total: i64,
    pub mean_confidence: Option<f64>,
}
