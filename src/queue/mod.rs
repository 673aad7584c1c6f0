//! Job-queue contract consumed by the pipeline.
//!
//! The pipeline only enqueues named jobs with a priority and registers
//! handlers with a per-kind concurrency ceiling; durable persistence and
//! retry/backoff belong to the queue backend, not to this crate.
//! [`local::LocalJobQueue`] provides the in-process dispatch surface the
//! binary and tests run against.

pub mod local;

pub use local::LocalJobQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    ContentModeration,
    HumanReview,
    BatchModeration,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ContentModeration => "content-moderation",
            JobKind::HumanReview => "human-review",
            JobKind::BatchModeration => "batch-moderation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named job: payload plus scheduling hints. Numerically higher
/// priority runs sooner.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub delay: Option<Duration>,
}

impl JobSpec {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            priority: 0,
            delay: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: JobSpec) -> Result<()>;
}

pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Execution context handed to a job handler
pub struct JobContext {
    pub payload: serde_json::Value,
    progress: ProgressFn,
}

impl JobContext {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            progress: Arc::new(|pct| tracing::debug!(progress = pct, "Job progress")),
        }
    }

    pub fn with_progress(payload: serde_json::Value, progress: ProgressFn) -> Self {
        Self { payload, progress }
    }

    pub fn report_progress(&self, pct: u8) {
        (self.progress)(pct.min(100));
    }
}

/// A named job handler with its desired concurrency ceiling. Errors
/// returned from `run` propagate to the queue backend so its retry
/// policy governs re-attempts.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    fn concurrency(&self) -> usize;

    async fn run(&self, ctx: JobContext) -> Result<serde_json::Value>;
}
