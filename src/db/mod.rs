//! Decision storage: a current-decision table (upsert-by-identity) plus an
//! append-only events log that history reads. The store is the single
//! source of truth; concurrent upserts for one identity are last-write-wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ModerationError, Result};
use crate::models::{
    ContentType, ModerationResult, ModerationStatus, PendingItem, ReviewDecision, StatsRow,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Upsert the current decision and append it to the events log
    async fn upsert(&self, result: &ModerationResult) -> Result<()>;

    async fn get_current(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Option<ModerationResult>>;

    /// Full decision history, newest first
    async fn get_history(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Vec<ModerationResult>>;

    /// Flagged, not-yet-reviewed decisions in FIFO order (oldest first),
    /// joined with author and a body snippet for reviewer display
    async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<PendingItem>>;

    async fn aggregate_stats(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>>;

    /// Apply a human review to the current decision and log it.
    /// Returns NotFound when no current decision exists for the identity.
    async fn apply_review(
        &self,
        content_id: &str,
        content_type: ContentType,
        reviewer_id: Uuid,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ModerationResult>;

    /// Hide the underlying content row. Idempotent; errors when the
    /// content row does not exist.
    async fn set_hidden(&self, content_id: &str, content_type: ContentType) -> Result<()>;
}

/// Table carrying the visibility flag for each content type. Exhaustive
/// by construction: a new content type will not compile without an arm.
fn visibility_table(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Post => "posts",
        ContentType::Comment => "comments",
        ContentType::Story => "stories",
        ContentType::Reel => "reels",
        ContentType::Message => "messages",
    }
}

const RESULT_COLUMNS: &str = "content_id, content_type, status, confidence, reasons, automated, \
     reviewed_by, reviewed_at, notes, created_at, updated_at";

pub struct PgDecisionStore {
    pool: Arc<PgPool>,
}

impl PgDecisionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn append_event(&self, result: &ModerationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation_events (
                content_id, content_type, status, confidence, reasons,
                automated, reviewed_by, reviewed_at, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&result.content_id)
        .bind(result.content_type)
        .bind(result.status)
        .bind(result.confidence)
        .bind(&result.reasons)
        .bind(result.automated)
        .bind(result.reviewed_by)
        .bind(result.reviewed_at)
        .bind(&result.notes)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DecisionStore for PgDecisionStore {
    async fn upsert(&self, result: &ModerationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation_decisions (
                content_id, content_type, status, confidence, reasons,
                automated, reviewed_by, reviewed_at, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (content_id, content_type) DO UPDATE SET
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                reasons = EXCLUDED.reasons,
                automated = EXCLUDED.automated,
                reviewed_by = EXCLUDED.reviewed_by,
                reviewed_at = EXCLUDED.reviewed_at,
                notes = EXCLUDED.notes,
                updated_at = NOW()
            "#,
        )
        .bind(&result.content_id)
        .bind(result.content_type)
        .bind(result.status)
        .bind(result.confidence)
        .bind(&result.reasons)
        .bind(result.automated)
        .bind(result.reviewed_by)
        .bind(result.reviewed_at)
        .bind(&result.notes)
        .execute(&*self.pool)
        .await?;

        self.append_event(result).await?;

        tracing::info!(
            content_id = %result.content_id,
            content_type = %result.content_type,
            status = %result.status,
            confidence = %result.confidence,
            "Moderation decision saved"
        );

        Ok(())
    }

    async fn get_current(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Option<ModerationResult>> {
        let result = sqlx::query_as::<_, ModerationResult>(&format!(
            "SELECT {} FROM moderation_decisions WHERE content_id = $1 AND content_type = $2",
            RESULT_COLUMNS
        ))
        .bind(content_id)
        .bind(content_type)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(result)
    }

    async fn get_history(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Vec<ModerationResult>> {
        let history = sqlx::query_as::<_, ModerationResult>(
            r#"
            SELECT content_id, content_type, status, confidence, reasons, automated,
                   reviewed_by, reviewed_at, notes,
                   recorded_at AS created_at, recorded_at AS updated_at
            FROM moderation_events
            WHERE content_id = $1 AND content_type = $2
            ORDER BY id DESC
            "#,
        )
        .bind(content_id)
        .bind(content_type)
        .fetch_all(&*self.pool)
        .await?;

        Ok(history)
    }

    async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<PendingItem>> {
        let pending = sqlx::query_as::<_, PendingItem>(
            r#"
            SELECT d.content_id, d.content_type, d.confidence, d.reasons, d.created_at,
                   c.author_id, LEFT(c.body, 140) AS snippet
            FROM moderation_decisions d
            LEFT JOIN (
                SELECT id, author_id, body, 'post'::content_kind AS kind FROM posts
                UNION ALL SELECT id, author_id, body, 'comment' FROM comments
                UNION ALL SELECT id, author_id, body, 'story' FROM stories
                UNION ALL SELECT id, author_id, body, 'reel' FROM reels
                UNION ALL SELECT id, author_id, body, 'message' FROM messages
            ) c ON c.id::TEXT = d.content_id AND c.kind = d.content_type
            WHERE d.status = 'flagged' AND d.reviewed_at IS NULL
            ORDER BY d.created_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok(pending)
    }

    async fn aggregate_stats(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>> {
        let stats = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT content_type, status, automated,
                   COUNT(*) AS total,
                   AVG(confidence)::FLOAT8 AS mean_confidence
            FROM moderation_decisions
            WHERE created_at >= $1
            GROUP BY content_type, status, automated
            ORDER BY content_type, status, automated
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        Ok(stats)
    }

    async fn apply_review(
        &self,
        content_id: &str,
        content_type: ContentType,
        reviewer_id: Uuid,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ModerationResult> {
        let updated = sqlx::query_as::<_, ModerationResult>(&format!(
            r#"
            UPDATE moderation_decisions
            SET status = $3,
                automated = FALSE,
                reviewed_by = $4,
                reviewed_at = NOW(),
                notes = $5,
                updated_at = NOW()
            WHERE content_id = $1 AND content_type = $2
            RETURNING {}
            "#,
            RESULT_COLUMNS
        ))
        .bind(content_id)
        .bind(content_type)
        .bind(decision.as_status())
        .bind(reviewer_id)
        .bind(notes)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| {
            ModerationError::NotFound(format!(
                "No moderation decision for {} {}",
                content_type, content_id
            ))
        })?;

        self.append_event(&updated).await?;

        tracing::info!(
            content_id = %content_id,
            content_type = %content_type,
            reviewer_id = %reviewer_id,
            status = %updated.status,
            "Human review applied"
        );

        Ok(updated)
    }

    async fn set_hidden(&self, content_id: &str, content_type: ContentType) -> Result<()> {
        let table = visibility_table(content_type);
        let rows = sqlx::query(&format!(
            "UPDATE {} SET is_hidden = TRUE WHERE id::TEXT = $1",
            table
        ))
        .bind(content_id)
        .execute(&*self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ModerationError::Enforcement(format!(
                "No {} row found for content {}",
                content_type, content_id
            )));
        }

        tracing::info!(
            content_id = %content_id,
            content_type = %content_type,
            "Content hidden by enforcement"
        );

        Ok(())
    }
}
