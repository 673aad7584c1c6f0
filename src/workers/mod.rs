//! Job handlers wrapping the moderation engine and the notifier.
//!
//! Payload parse failures propagate out of `run` so the queue backend's
//! retry policy applies; classification itself never fails (the engine
//! folds faults into a flagged result).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ContentType, ModerationResult};
use crate::notifier::{Notifier, ReviewAlert};
use crate::queue::{JobContext, JobHandler, JobKind, LocalJobQueue};
use crate::services::ModerationEngine;

/// One content item to classify
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationJobPayload {
    pub content_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchModerationPayload {
    pub items: Vec<ModerationJobPayload>,
}

/// Batch items are parsed individually so one malformed entry cannot
/// take down the rest of the job.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBatchPayload {
    items: Vec<serde_json::Value>,
}

/// Outcome of one batch item: a decision, or the reason the item could
/// not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ModerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `content-moderation` handler: one classification pass per job
pub struct ModerationWorker {
    engine: Arc<ModerationEngine>,
    concurrency: usize,
}

impl ModerationWorker {
    pub fn new(engine: Arc<ModerationEngine>, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency,
        }
    }
}

#[async_trait]
impl JobHandler for ModerationWorker {
    fn kind(&self) -> JobKind {
        JobKind::ContentModeration
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn run(&self, ctx: JobContext) -> Result<serde_json::Value> {
        let payload: ModerationJobPayload = serde_json::from_value(ctx.payload.clone())?;
        ctx.report_progress(10);

        let result = self
            .engine
            .moderate(
                &payload.content_id,
                payload.content_type,
                &payload.text,
                &payload.media_urls,
            )
            .await;

        ctx.report_progress(100);
        Ok(serde_json::to_value(result)?)
    }
}

/// `human-review` handler: forwards a flagged decision to moderators
pub struct HumanReviewWorker {
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl HumanReviewWorker {
    pub fn new(notifier: Arc<dyn Notifier>, concurrency: usize) -> Self {
        Self {
            notifier,
            concurrency,
        }
    }
}

#[async_trait]
impl JobHandler for HumanReviewWorker {
    fn kind(&self) -> JobKind {
        JobKind::HumanReview
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn run(&self, ctx: JobContext) -> Result<serde_json::Value> {
        let alert: ReviewAlert = serde_json::from_value(ctx.payload.clone())?;
        self.notifier.notify_moderators(&alert).await?;
        ctx.report_progress(100);

        info!(
            content_id = %alert.content_id,
            content_type = %alert.content_type,
            confidence = %alert.confidence,
            "Moderators notified of flagged content"
        );

        Ok(serde_json::json!({ "delivered": true }))
    }
}

/// `batch-moderation` handler. Runs a low concurrency ceiling since each
/// job performs many classifications. Items are independent units of
/// work: one item's outcome never aborts the rest of the batch.
pub struct BatchModerationWorker {
    engine: Arc<ModerationEngine>,
    concurrency: usize,
}

impl BatchModerationWorker {
    pub fn new(engine: Arc<ModerationEngine>, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency,
        }
    }
}

#[async_trait]
impl JobHandler for BatchModerationWorker {
    fn kind(&self) -> JobKind {
        JobKind::BatchModeration
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn run(&self, ctx: JobContext) -> Result<serde_json::Value> {
        let batch: RawBatchPayload = serde_json::from_value(ctx.payload.clone())?;
        let total = batch.items.len();
        let mut outcomes = Vec::with_capacity(total);

        for (idx, raw_item) in batch.items.into_iter().enumerate() {
            let outcome = match serde_json::from_value::<ModerationJobPayload>(raw_item) {
                Ok(item) => {
                    let result = self
                        .engine
                        .moderate(
                            &item.content_id,
                            item.content_type,
                            &item.text,
                            &item.media_urls,
                        )
                        .await;
                    BatchItemOutcome {
                        result: Some(result),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(item = idx, error = %e, "Skipping malformed batch item");
                    BatchItemOutcome {
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);

            let pct = (((idx + 1) * 100) / total.max(1)) as u8;
            ctx.report_progress(pct);
        }

        info!(items = total, "Batch moderation completed");
        Ok(serde_json::to_value(outcomes)?)
    }
}

/// Register all three handlers with their configured ceilings
pub async fn register_workers(
    queue: &LocalJobQueue,
    engine: Arc<ModerationEngine>,
    notifier: Arc<dyn Notifier>,
    moderation_concurrency: usize,
    review_concurrency: usize,
    batch_concurrency: usize,
) {
    queue
        .register(Arc::new(ModerationWorker::new(
            engine.clone(),
            moderation_concurrency,
        )))
        .await;
    queue
        .register(Arc::new(HumanReviewWorker::new(
            notifier,
            review_concurrency,
        )))
        .await;
    queue
        .register(Arc::new(BatchModerationWorker::new(
            engine,
            batch_concurrency,
        )))
        .await;
}
