//! Bounded concurrent execution of queued tasks.
//!
//! The dispatcher claims up to `max_concurrent_tasks` tasks at a time from a
//! shared [`TaskQueue`], runs them through a [`Converter`] concurrently, and
//! hands every task back with its outcome before claiming the next wave. Each
//! conversion is bounded by `task_timeout_secs`; a conversion that overruns is
//! dropped and its task fails with `task_timeout`.
//!
//! The queue lock is never held across an `.await`.

use crate::config::ServiceConfig;
use crate::error::{DoctorError, ErrorCode};
use crate::queue::{Outcome, TaskQueue};
use crate::task::{Task, TaskStatus};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The external component that actually converts documents.
///
/// Returns the id of the produced output file.
pub trait Converter: Send + Sync {
    fn convert<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<Uuid, DoctorError>>;
}

/// What a dispatch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub waves: usize,
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub retried: usize,
}

impl DispatchReport {
    fn absorb(&mut self, other: DispatchReport) {
        self.waves += other.waves;
        self.claimed += other.claimed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.cancelled += other.cancelled;
        self.retried += other.retried;
    }
}

pub type SharedQueue = Arc<Mutex<TaskQueue>>;

fn lock(queue: &SharedQueue) -> MutexGuard<'_, TaskQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run waves until nothing is left to claim.
///
/// With `auto_retry`, failed tasks that still have attempts left are
/// re-queued after each wave, so the run also drains their retries.
pub async fn run_until_idle(
    queue: &SharedQueue,
    converter: Arc<dyn Converter>,
    config: &ServiceConfig,
) -> DispatchReport {
    let start = Instant::now();
    let mut report = DispatchReport::default();
    loop {
        let wave = run_wave(queue, Arc::clone(&converter), config).await;
        if wave.claimed == 0 {
            break;
        }
        report.absorb(wave);
    }
    info!(
        "Dispatcher idle after {} wave(s): {} succeeded, {} failed ({} timed out), {} cancelled, {} retried in {:.1}s",
        report.waves,
        report.succeeded,
        report.failed,
        report.timed_out,
        report.cancelled,
        report.retried,
        start.elapsed().as_secs_f64()
    );
    report
}

/// Claim one batch, convert it concurrently and report the outcomes back.
pub async fn run_wave(
    queue: &SharedQueue,
    converter: Arc<dyn Converter>,
    config: &ServiceConfig,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let batch = lock(queue).claim_batch(config.max_concurrent_tasks);
    if batch.is_empty() {
        return report;
    }
    report.waves = 1;
    report.claimed = batch.len();
    debug!("Dispatching {} task(s)", batch.len());

    let timeout = config.task_timeout();
    let timeout_secs = config.task_timeout_secs;
    let results: Vec<(Task, Outcome)> = stream::iter(batch.into_iter().map(|task| {
        let converter = Arc::clone(&converter);
        async move {
            let result = tokio::time::timeout(timeout, converter.convert(&task)).await;
            let outcome = match result {
                Ok(Ok(output)) => Outcome::Converted(output),
                Ok(Err(e)) => {
                    warn!("Task {} conversion error: {}", task.id(), e);
                    Outcome::from_error(&e)
                }
                Err(_) => {
                    warn!("Task {} timed out after {}s", task.id(), timeout_secs);
                    Outcome::from_error(&DoctorError::task_timeout(task.id(), timeout_secs))
                }
            };
            (task, outcome)
        }
    }))
    .buffer_unordered(config.max_concurrent_tasks)
    .collect()
    .await;

    let mut q = lock(queue);
    let mut failed_ids = Vec::new();
    for (task, outcome) in results {
        let id = task.id();
        let timed_out = matches!(
            outcome,
            Outcome::Failed {
                code: ErrorCode::TaskTimeout,
                ..
            }
        );
        match q.finish(task, outcome) {
            Ok(TaskStatus::Success) => report.succeeded += 1,
            Ok(TaskStatus::Failed) => {
                report.failed += 1;
                if timed_out {
                    report.timed_out += 1;
                }
                failed_ids.push(id);
            }
            Ok(TaskStatus::Cancelled) => report.cancelled += 1,
            Ok(other) => debug!("Task {} returned in {}", id, other),
            Err(e) => warn!("Could not finish task {}: {}", id, e),
        }
    }

    if config.auto_retry {
        for id in failed_ids {
            let retryable = q.get(id).is_some_and(Task::can_retry);
            if !retryable {
                continue;
            }
            match q.retry(id) {
                Ok(_) => report.retried += 1,
                Err(e) => warn!("Retry of task {} refused: {}", id, e),
            }
        }
    }
    report
}
