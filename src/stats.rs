//! Aggregate task statistics.

use crate::task::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters accumulated over the life of a queue.
///
/// Bucket counts follow each task through its transitions: `queued` covers
/// every task that has not started yet (created, queued or waiting), `active`
/// the ones being processed, and the final buckets only ever grow. A retried
/// task stays counted as failed; its new attempt is counted as a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub queued_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    pub expired_tasks: u64,

    /// Mean processing time in seconds over tasks that ran to completion.
    pub avg_processing_time: f64,
    pub total_files_processed: u64,
    pub total_bytes_processed: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,

    pub last_task_at: Option<DateTime<Utc>>,
    pub since: DateTime<Utc>,

    #[serde(skip)]
    timed_tasks: u64,
}

impl Default for TaskStats {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            active_tasks: 0,
            queued_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            cancelled_tasks: 0,
            expired_tasks: 0,
            avg_processing_time: 0.0,
            total_files_processed: 0,
            total_bytes_processed: 0,
            cache_hits: 0,
            cache_misses: 0,
            last_task_at: None,
            since: Utc::now(),
            timed_tasks: 0,
        }
    }
}

impl TaskStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits over lookups; `0.0` before any lookup.
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Successes over finished conversions (success + failed); `0.0` before any.
    pub fn success_rate(&self) -> f64 {
        ratio(self.completed_tasks, self.completed_tasks + self.failed_tasks)
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.since)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// A new task entered the system in `status`.
    pub fn record_new(&mut self, status: TaskStatus) {
        self.total_tasks += 1;
        self.last_task_at = Some(Utc::now());
        *self.bucket(status) += 1;
    }

    /// A tracked task moved from `from` to `to`.
    pub fn record_transition(&mut self, from: TaskStatus, to: TaskStatus) {
        if bucket_of(from) == bucket_of(to) {
            return;
        }
        let slot = self.bucket(from);
        *slot = slot.saturating_sub(1);
        *self.bucket(to) += 1;
    }

    /// A conversion produced output from `input_bytes` of input.
    pub fn record_processed(&mut self, input_bytes: u64, processing_time: Option<f64>) {
        self.total_files_processed += 1;
        self.total_bytes_processed += input_bytes;
        if let Some(secs) = processing_time {
            self.timed_tasks += 1;
            self.avg_processing_time += (secs - self.avg_processing_time) / self.timed_tasks as f64;
        }
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    fn bucket(&mut self, status: TaskStatus) -> &mut u64 {
        match bucket_of(status) {
            Bucket::Queued => &mut self.queued_tasks,
            Bucket::Active => &mut self.active_tasks,
            Bucket::Completed => &mut self.completed_tasks,
            Bucket::Failed => &mut self.failed_tasks,
            Bucket::Cancelled => &mut self.cancelled_tasks,
            Bucket::Expired => &mut self.expired_tasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Queued,
    Active,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

fn bucket_of(status: TaskStatus) -> Bucket {
    match status {
        TaskStatus::Created | TaskStatus::Queued | TaskStatus::Waiting => Bucket::Queued,
        TaskStatus::Processing => Bucket::Active,
        TaskStatus::Success => Bucket::Completed,
        TaskStatus::Failed => Bucket::Failed,
        TaskStatus::Cancelled => Bucket::Cancelled,
        TaskStatus::Expired => Bucket::Expired,
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
