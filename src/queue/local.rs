//! In-process job dispatcher: one lane per job kind, priority-ordered,
//! bounded by a per-kind Semaphore. No persistence and no retries; a
//! failed job is logged and dropped, matching the contract that retry
//! policy belongs to the queue backend.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use super::{JobContext, JobHandler, JobKind, JobQueue, JobSpec};
use crate::error::{ModerationError, Result};

struct QueuedJob {
    priority: i64,
    seq: u64,
    payload: serde_json::Value,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, FIFO within a priority level
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

struct Lane {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
}

impl Lane {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    async fn push(&self, job: QueuedJob) {
        self.heap.lock().await.push(job);
        self.notify.notify_one();
    }
}

pub struct LocalJobQueue {
    lanes: RwLock<HashMap<JobKind, Arc<Lane>>>,
    seq: AtomicU64,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        Self {
            lanes: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a handler and start its dispatcher. Jobs of this kind run
    /// on up to `handler.concurrency()` concurrent workers.
    pub async fn register(&self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        let lane = Arc::new(Lane::new());

        let mut lanes = self.lanes.write().await;
        if lanes.insert(kind, lane.clone()).is_some() {
            warn!(job_kind = %kind, "Handler re-registered, replacing dispatcher lane");
        }
        drop(lanes);

        let ceiling = handler.concurrency().max(1);
        info!(job_kind = %kind, concurrency = ceiling, "Job handler registered");

        let semaphore = Arc::new(Semaphore::new(ceiling));
        tokio::spawn(dispatch_loop(lane, handler, semaphore));
    }
}

impl Default for LocalJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_loop(lane: Arc<Lane>, handler: Arc<dyn JobHandler>, semaphore: Arc<Semaphore>) {
    loop {
        // Hold a worker slot before popping so a queued job is never
        // pulled out of priority order while all workers are busy.
        let permit = semaphore.clone().acquire_owned().await.unwrap();

        let job = loop {
            let popped = lane.heap.lock().await.pop();
            match popped {
                Some(job) => break job,
                None => lane.notify.notified().await,
            }
        };

        let handler = handler.clone();
        tokio::spawn(async move {
            let kind = handler.kind();
            debug!(job_kind = %kind, priority = job.priority, "Job started");

            match handler.run(JobContext::new(job.payload)).await {
                Ok(_) => debug!(job_kind = %kind, "Job completed"),
                Err(e) => error!(job_kind = %kind, error = %e, "Job failed"),
            }

            drop(permit);
        });
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job: JobSpec) -> Result<()> {
        let lane = {
            let lanes = self.lanes.read().await;
            lanes.get(&job.kind).cloned().ok_or_else(|| {
                ModerationError::Queue(format!("No handler registered for {}", job.kind))
            })?
        };

        let queued = QueuedJob {
            priority: job.priority,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            payload: job.payload,
        };

        match job.delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    lane.push(queued).await;
                });
            }
            None => lane.push(queued).await,
        }

        Ok(())
    }
}
