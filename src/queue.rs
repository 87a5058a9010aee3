//! In-memory priority queue driving tasks through their lifecycle.
//!
//! ## Ownership
//!
//! A claimed task is moved out of the queue and handed to the caller, so a
//! task in `Processing` has exactly one owner. The queue only remembers that
//! it is in flight; the caller must give it back through [`TaskQueue::finish`].
//! A cancel that arrives while the task is away is recorded and applied when
//! it returns.
//!
//! ## Ordering
//!
//! Higher [`Priority::queue_weight`](crate::task::Priority::queue_weight) runs
//! first; equal weights run in submission order. The heap may hold stale
//! entries (cancelled, parked or already-claimed tasks); they are discarded
//! when popped.

use crate::config::ServiceConfig;
use crate::error::{DoctorError, ErrorCode, TransitionError};
use crate::events::{NoopObserver, SharedObserver};
use crate::file_info::FileInfo;
use crate::stats::TaskStats;
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a claimed task ended, as reported by whoever ran it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Conversion produced the file with this id.
    Converted(Uuid),
    Failed { code: ErrorCode, details: String },
}

impl Outcome {
    pub fn from_error(err: &DoctorError) -> Self {
        Outcome::Failed {
            code: err.code(),
            details: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    weight: u32,
    seq: u64,
    id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            // earlier submissions win ties in a max-heap
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    cancel_requested: bool,
}

pub struct TaskQueue {
    /// Every task not currently claimed, final ones included until purged.
    tasks: HashMap<Uuid, Task>,
    in_flight: HashMap<Uuid, InFlight>,
    heap: BinaryHeap<QueueEntry>,
    /// Submission sequence per task, kept so unparking restores its place.
    seqs: HashMap<Uuid, u64>,
    input_sizes: HashMap<Uuid, u64>,
    next_seq: u64,
    capacity: usize,
    stats: TaskStats,
    observer: SharedObserver,
}

impl TaskQueue {
    /// Queue holding at most `capacity` unfinished tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            in_flight: HashMap::new(),
            heap: BinaryHeap::new(),
            seqs: HashMap::new(),
            input_sizes: HashMap::new(),
            next_seq: 0,
            capacity: capacity.max(1),
            stats: TaskStats::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_tasks_in_memory)
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// A task held by the queue. Claimed tasks are not visible here.
    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Current status, including for tasks that are in flight.
    pub fn status_of(&self, id: Uuid) -> Result<TaskStatus, DoctorError> {
        if self.in_flight.contains_key(&id) {
            return Ok(TaskStatus::Processing);
        }
        self.tasks
            .get(&id)
            .map(Task::status)
            .ok_or_else(|| DoctorError::task_not_found(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks not yet final, claimed ones included.
    pub fn unfinished_count(&self) -> usize {
        self.in_flight.len() + self.tasks.values().filter(|t| !t.is_complete()).count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Tasks that a claim could return right now.
    pub fn ready_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Queued)
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Accept a freshly created task for `input` and queue it.
    pub fn submit(&mut self, mut task: Task, input: &FileInfo) -> Result<Uuid, DoctorError> {
        if task.input_file_id() != input.id() {
            return Err(DoctorError::file_not_found_by_id(task.input_file_id()));
        }
        if task.status() != TaskStatus::Created {
            return Err(TransitionError {
                from: task.status(),
                to: TaskStatus::Queued,
            }
            .into());
        }
        self.ensure_capacity()?;

        self.stats.record_new(task.status());
        task.mark_queued()?;
        self.stats.record_transition(TaskStatus::Created, TaskStatus::Queued);

        let id = task.id();
        debug!(
            "Submitted task {} ({} -> {}, {})",
            id,
            task.source_format(),
            task.target_format(),
            task.priority()
        );
        self.input_sizes.insert(id, input.size());
        self.enqueue(task);
        Ok(id)
    }

    fn ensure_capacity(&self) -> Result<(), DoctorError> {
        let current = self.unfinished_count();
        if current >= self.capacity {
            warn!("Task limit reached: {}/{}", current, self.capacity);
            return Err(DoctorError::task_limit_exceeded(current, self.capacity));
        }
        Ok(())
    }

    fn enqueue(&mut self, task: Task) {
        let id = task.id();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seqs.insert(id, seq);
        self.heap.push(QueueEntry {
            weight: task.priority().queue_weight(),
            seq,
            id,
        });
        self.observer.on_status_change(&task);
        self.tasks.insert(id, task);
    }

    // ── Claiming ─────────────────────────────────────────────────────────

    /// Take the next runnable task, already moved to `Processing`.
    pub fn claim_next(&mut self) -> Option<Task> {
        while let Some(entry) = self.heap.pop() {
            let runnable = self
                .tasks
                .get(&entry.id)
                .is_some_and(|t| t.status() == TaskStatus::Queued);
            if !runnable {
                continue;
            }
            let Some(mut task) = self.tasks.remove(&entry.id) else {
                continue;
            };
            if let Err(e) = task.set_processing() {
                warn!("Cannot start task {}: {}", entry.id, e);
                self.tasks.insert(entry.id, task);
                continue;
            }
            self.stats
                .record_transition(TaskStatus::Queued, TaskStatus::Processing);
            self.in_flight.insert(
                entry.id,
                InFlight {
                    cancel_requested: false,
                },
            );
            self.observer.on_status_change(&task);
            return Some(task);
        }
        None
    }

    /// Claim up to `n` tasks in priority order.
    pub fn claim_batch(&mut self, n: usize) -> Vec<Task> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.claim_next() {
                Some(t) => batch.push(t),
                None => break,
            }
        }
        batch
    }

    /// Apply a progress report to a claimed task and notify the observer.
    pub fn report_progress(&self, task: &mut Task, percent: u8, message: impl Into<String>) -> bool {
        if !self.in_flight.contains_key(&task.id()) {
            return false;
        }
        let applied = task.update_progress(percent, message);
        if applied {
            self.observer.on_progress(task);
        }
        applied
    }

    // ── Completion ───────────────────────────────────────────────────────

    /// Return a claimed task with its outcome. Yields the status it ended in.
    pub fn finish(&mut self, mut task: Task, outcome: Outcome) -> Result<TaskStatus, DoctorError> {
        let id = task.id();
        let Some(flight) = self.in_flight.remove(&id) else {
            return Err(DoctorError::task_not_found(id));
        };
        let from = task.status();

        if flight.cancel_requested {
            task.cancel();
            info!("Task {} cancelled while running", id);
        } else {
            let applied = match &outcome {
                Outcome::Converted(output) => task.set_completed(*output),
                Outcome::Failed { code, details } => task.set_failed(*code, details.as_str()),
            };
            if let Err(e) = applied {
                self.in_flight.insert(id, flight);
                return Err(e.into());
            }
        }

        let to = task.status();
        self.stats.record_transition(from, to);
        self.observer.on_status_change(&task);
        match to {
            TaskStatus::Success => {
                let bytes = self.input_sizes.get(&id).copied().unwrap_or(0);
                self.stats.record_processed(bytes, task.processing_time());
                self.observer.on_task_completed(&task);
                info!("Task {} completed", id);
            }
            TaskStatus::Failed => {
                self.observer.on_task_failed(&task);
                warn!("Task {} failed: {}", id, task.message());
            }
            _ => {}
        }
        self.tasks.insert(id, task);
        Ok(to)
    }

    /// Complete a pending task from the conversion cache without running it.
    pub fn complete_from_cache(&mut self, id: Uuid, output_file_id: Uuid) -> Result<(), DoctorError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DoctorError::task_not_found(id))?;
        let from = task.status();
        task.set_completed(output_file_id)?;
        self.stats.record_transition(from, TaskStatus::Success);
        self.stats.record_cache_hit();
        self.observer.on_status_change(task);
        self.observer.on_task_completed(task);
        debug!("Task {} served from cache", id);
        Ok(())
    }

    pub fn record_cache_hit(&mut self) {
        self.stats.record_cache_hit();
    }

    pub fn record_cache_miss(&mut self) {
        self.stats.record_cache_miss();
    }

    // ── Control ──────────────────────────────────────────────────────────

    /// Cancel a task. `Ok(false)` if it had already finished.
    ///
    /// A claimed task is cancelled when it comes back through [`finish`](Self::finish).
    pub fn cancel(&mut self, id: Uuid) -> Result<bool, DoctorError> {
        if let Some(flight) = self.in_flight.get_mut(&id) {
            flight.cancel_requested = true;
            debug!("Cancel requested for running task {}", id);
            return Ok(true);
        }
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DoctorError::task_not_found(id))?;
        let from = task.status();
        if !task.cancel() {
            return Ok(false);
        }
        self.stats.record_transition(from, TaskStatus::Cancelled);
        self.observer.on_status_change(task);
        info!("Task {} cancelled", id);
        Ok(true)
    }

    /// Hold a queued task back from claiming.
    pub fn park(&mut self, id: Uuid) -> Result<(), DoctorError> {
        let observer = Arc::clone(&self.observer);
        let task = self.pending_mut(id)?;
        task.mark_waiting()?;
        observer.on_status_change(task);
        Ok(())
    }

    /// Make a parked task claimable again, in its original position.
    pub fn unpark(&mut self, id: Uuid) -> Result<(), DoctorError> {
        let observer = Arc::clone(&self.observer);
        let task = self.pending_mut(id)?;
        task.mark_queued()?;
        let weight = task.priority().queue_weight();
        observer.on_status_change(task);
        let seq = self.seqs.get(&id).copied().unwrap_or(self.next_seq);
        self.heap.push(QueueEntry { weight, seq, id });
        Ok(())
    }

    fn pending_mut(&mut self, id: Uuid) -> Result<&mut Task, DoctorError> {
        if self.in_flight.contains_key(&id) {
            return Err(DoctorError::from(TransitionError {
                from: TaskStatus::Processing,
                to: TaskStatus::Waiting,
            }));
        }
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DoctorError::task_not_found(id))?;
        if task.status() == TaskStatus::Expired {
            return Err(DoctorError::task_expired(id));
        }
        Ok(task)
    }

    /// Queue the next attempt of a failed task. Returns the new task's id.
    ///
    /// Each failed task can be retried once; the attempt chain as a whole is
    /// capped at [`MAX_RETRIES`](crate::task::MAX_RETRIES).
    pub fn retry(&mut self, id: Uuid) -> Result<Uuid, DoctorError> {
        let failed = self
            .tasks
            .get(&id)
            .ok_or_else(|| DoctorError::task_not_found(id))?;
        if failed.status() == TaskStatus::Expired {
            return Err(DoctorError::task_expired(id));
        }
        if !failed.can_retry() {
            return Err(TransitionError {
                from: failed.status(),
                to: TaskStatus::Created,
            }
            .into());
        }
        self.ensure_capacity()?;

        let mut next = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DoctorError::task_not_found(id))?
            .retry()?;

        self.stats.record_new(next.status());
        next.mark_queued()?;
        self.stats.record_transition(TaskStatus::Created, TaskStatus::Queued);

        let new_id = next.id();
        if let Some(size) = self.input_sizes.get(&id).copied() {
            self.input_sizes.insert(new_id, size);
        }
        info!(
            "Retrying task {} as {} (attempt {})",
            id,
            new_id,
            next.retry_count()
        );
        self.enqueue(next);
        Ok(new_id)
    }

    /// Every failed task that still has retries left, oldest first.
    pub fn retryable(&self) -> Vec<Uuid> {
        let mut ids: Vec<&Task> = self.tasks.values().filter(|t| t.can_retry()).collect();
        ids.sort_by_key(|t| t.created_at());
        ids.into_iter().map(Task::id).collect()
    }

    // ── Housekeeping ─────────────────────────────────────────────────────

    /// Expire tasks that have waited longer than `ttl` without starting.
    pub fn expire_stale(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> Vec<Uuid> {
        let mut expired = Vec::new();
        for task in self.tasks.values_mut() {
            if !task.status().is_pending() || task.age(now) <= ttl {
                continue;
            }
            let from = task.status();
            if task.expire().is_ok() {
                self.stats.record_transition(from, TaskStatus::Expired);
                self.observer.on_status_change(task);
                expired.push(task.id());
            }
        }
        if !expired.is_empty() {
            info!("Expired {} stale task(s)", expired.len());
        }
        expired
    }

    /// Drop finished tasks from memory. Returns how many were removed.
    pub fn purge_finished(&mut self) -> usize {
        let done: Vec<Uuid> = self
            .tasks
            .values()
            .filter(|t| t.is_complete())
            .map(Task::id)
            .collect();
        for id in &done {
            self.tasks.remove(id);
            self.seqs.remove(id);
            self.input_sizes.remove(id);
        }
        // only one entry per claimable task survives
        let tasks = &self.tasks;
        let mut live = HashSet::new();
        self.heap.retain(|e| {
            tasks
                .get(&e.id)
                .is_some_and(|t| t.status() == TaskStatus::Queued)
                && live.insert(e.id)
        });
        debug!("Purged {} finished task(s)", done.len());
        done.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimits;
    use crate::events::TaskObserver;
    use crate::format::DocumentFormat;
    use crate::task::Priority;
    use crate::validate::hash_bytes;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn input(size: u64) -> FileInfo {
        FileInfo::builder("doc.md", DocumentFormat::Markdown, size, "uploads/doc.md", hash_bytes(b"x"))
            .build(&SizeLimits::default())
            .unwrap()
    }

    fn submit(q: &mut TaskQueue, priority: Priority) -> Uuid {
        let file = input(10);
        let task = Task::new(file.id(), DocumentFormat::Markdown, DocumentFormat::Pdf)
            .unwrap()
            .with_priority(priority);
        q.submit(task, &file).unwrap()
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut q = TaskQueue::new(10);
        let low = submit(&mut q, Priority::Low);
        let n1 = submit(&mut q, Priority::Normal);
        let urgent = submit(&mut q, Priority::Urgent);
        let n2 = submit(&mut q, Priority::Normal);

        let order: Vec<Uuid> = q.claim_batch(10).iter().map(Task::id).collect();
        assert_eq!(order, vec![urgent, n1, n2, low]);
        assert!(q.claim_next().is_none());
    }

    #[test]
    fn test_submit_rejects_mismatched_input() {
        let mut q = TaskQueue::new(10);
        let file = input(10);
        let task = Task::new(Uuid::new_v4(), DocumentFormat::Markdown, DocumentFormat::Html).unwrap();
        let err = q.submit(task, &file).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileNotFound);
    }

    #[test]
    fn test_capacity_counts_unfinished() {
        let mut q = TaskQueue::new(2);
        let a = submit(&mut q, Priority::Normal);
        submit(&mut q, Priority::Normal);

        let file = input(1);
        let extra = Task::new(file.id(), DocumentFormat::Markdown, DocumentFormat::Pdf).unwrap();
        let err = q.submit(extra, &file).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TaskLimitExceeded);
        assert_eq!(err.status_code(), 429);

        assert!(q.cancel(a).unwrap());
        submit(&mut q, Priority::Normal);
    }

    #[test]
    fn test_finish_updates_stats() {
        let mut q = TaskQueue::new(10);
        submit(&mut q, Priority::Normal);
        submit(&mut q, Priority::Normal);
        let first = q.claim_next().unwrap();
        let second = q.claim_next().unwrap();
        assert_eq!(q.stats().active_tasks, 2);

        let status = q.finish(first, Outcome::Converted(Uuid::new_v4())).unwrap();
        assert_eq!(status, TaskStatus::Success);
        let status = q
            .finish(
                second,
                Outcome::Failed {
                    code: ErrorCode::ConversionFailed,
                    details: "bad table".into(),
                },
            )
            .unwrap();
        assert_eq!(status, TaskStatus::Failed);

        let s = q.stats();
        assert_eq!(s.total_tasks, 2);
        assert_eq!((s.active_tasks, s.completed_tasks, s.failed_tasks), (0, 1, 1));
        assert_eq!(s.total_files_processed, 1);
        assert_eq!(s.total_bytes_processed, 10);
        assert!((s.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_finish_unknown_task() {
        let mut q = TaskQueue::new(10);
        let stray = Task::new(Uuid::new_v4(), DocumentFormat::Pdf, DocumentFormat::Html).unwrap();
        let err = q.finish(stray, Outcome::Converted(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TaskNotFound);
    }

    #[test]
    fn test_cancel_in_flight_applies_on_finish() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::Normal);
        let task = q.claim_next().unwrap();
        assert_eq!(q.status_of(id).unwrap(), TaskStatus::Processing);

        assert!(q.cancel(id).unwrap());
        let status = q.finish(task, Outcome::Converted(Uuid::new_v4())).unwrap();
        assert_eq!(status, TaskStatus::Cancelled);
        assert_eq!(q.get(id).unwrap().output_file_id(), None);
        assert!(!q.cancel(id).unwrap());
        assert_eq!(q.stats().cancelled_tasks, 1);
    }

    #[test]
    fn test_cancel_unknown() {
        let mut q = TaskQueue::new(10);
        assert_eq!(
            q.cancel(Uuid::new_v4()).unwrap_err().code(),
            ErrorCode::TaskNotFound
        );
    }

    #[test]
    fn test_cancelled_task_is_not_claimed() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::Urgent);
        let other = submit(&mut q, Priority::Low);
        q.cancel(id).unwrap();
        assert_eq!(q.claim_next().unwrap().id(), other);
    }

    #[test]
    fn test_park_and_unpark_keep_position() {
        let mut q = TaskQueue::new(10);
        let a = submit(&mut q, Priority::Normal);
        let b = submit(&mut q, Priority::Normal);

        q.park(a).unwrap();
        assert_eq!(q.get(a).unwrap().status(), TaskStatus::Waiting);
        assert_eq!(q.ready_count(), 1);

        q.unpark(a).unwrap();
        let order: Vec<Uuid> = q.claim_batch(2).iter().map(Task::id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_parked_task_is_skipped() {
        let mut q = TaskQueue::new(10);
        let a = submit(&mut q, Priority::Urgent);
        let b = submit(&mut q, Priority::Low);
        q.park(a).unwrap();
        assert_eq!(q.claim_next().unwrap().id(), b);
        assert!(q.claim_next().is_none());
        q.unpark(a).unwrap();
        assert_eq!(q.claim_next().unwrap().id(), a);
    }

    #[test]
    fn test_retry_queues_new_attempt() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::High);
        let task = q.claim_next().unwrap();
        q.finish(
            task,
            Outcome::Failed {
                code: ErrorCode::ConversionFailed,
                details: "x".into(),
            },
        )
        .unwrap();
        assert_eq!(q.retryable(), vec![id]);

        let next = q.retry(id).unwrap();
        assert_ne!(next, id);
        assert_eq!(q.get(id).unwrap().status(), TaskStatus::Failed);
        let attempt = q.claim_next().unwrap();
        assert_eq!(attempt.id(), next);
        assert_eq!(attempt.retry_count(), 1);
        assert_eq!(attempt.previous_attempt(), Some(id));
        assert_eq!(attempt.priority(), Priority::High);
    }

    #[test]
    fn test_failed_task_is_retried_only_once() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::Normal);
        let task = q.claim_next().unwrap();
        q.finish(
            task,
            Outcome::Failed {
                code: ErrorCode::ConversionFailed,
                details: "x".into(),
            },
        )
        .unwrap();

        let next = q.retry(id).unwrap();
        assert!(q.retryable().is_empty());
        assert_eq!(q.get(id).unwrap().retried_by(), Some(next));

        let err = q.retry(id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(q.ready_count(), 1);
        assert_eq!(q.stats().total_tasks, 2);
    }

    #[test]
    fn test_retry_requires_failed() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::Normal);
        assert!(q.retry(id).is_err());
    }

    #[test]
    fn test_expire_stale() {
        let mut q = TaskQueue::new(10);
        let running = submit(&mut q, Priority::Normal);
        let waiting = submit(&mut q, Priority::Low);
        let claimed = q.claim_next().unwrap();
        assert_eq!(claimed.id(), running);

        let later = Utc::now() + chrono::Duration::hours(2);
        let expired = q.expire_stale(later, chrono::Duration::hours(1));
        assert_eq!(expired, vec![waiting]);
        assert_eq!(q.get(waiting).unwrap().status(), TaskStatus::Expired);
        assert_eq!(q.stats().expired_tasks, 1);
        assert_eq!(
            q.retry(waiting).unwrap_err().code(),
            ErrorCode::TaskExpired
        );

        // fresh tasks survive
        assert!(q.expire_stale(Utc::now(), chrono::Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_purge_finished() {
        let mut q = TaskQueue::new(10);
        let done = submit(&mut q, Priority::Urgent);
        let pending = submit(&mut q, Priority::Low);
        let t = q.claim_next().unwrap();
        q.finish(t, Outcome::Converted(Uuid::new_v4())).unwrap();

        assert_eq!(q.purge_finished(), 1);
        assert!(q.get(done).is_none());
        assert!(q.get(pending).is_some());
        assert_eq!(q.stats().completed_tasks, 1);
    }

    #[test]
    fn test_purge_drops_stale_heap_entries() {
        let mut q = TaskQueue::new(10);
        let parked = submit(&mut q, Priority::Normal);
        let cancelled = submit(&mut q, Priority::Normal);
        let kept = submit(&mut q, Priority::Low);
        q.park(parked).unwrap();
        q.unpark(parked).unwrap();
        q.cancel(cancelled).unwrap();
        assert_eq!(q.heap.len(), 4);

        q.purge_finished();
        assert_eq!(q.heap.len(), 2);
        let order: Vec<Uuid> = q.claim_batch(10).iter().map(Task::id).collect();
        assert_eq!(order, vec![parked, kept]);
    }

    #[test]
    fn test_cache_hit_completes_pending_task() {
        let mut q = TaskQueue::new(10);
        let id = submit(&mut q, Priority::Normal);
        let out = Uuid::new_v4();
        q.complete_from_cache(id, out).unwrap();
        q.record_cache_miss();

        let t = q.get(id).unwrap();
        assert_eq!(t.status(), TaskStatus::Success);
        assert_eq!(t.output_file_id(), Some(out));
        assert!(q.claim_next().is_none());
        assert!((q.stats().cache_hit_rate() - 0.5).abs() < 1e-9);
        assert_eq!(q.stats().queued_tasks, 0);
    }

    #[derive(Default)]
    struct Recorder {
        changes: AtomicUsize,
        progress: AtomicUsize,
        completed: AtomicUsize,
    }

    impl TaskObserver for Recorder {
        fn on_status_change(&self, _task: &Task) {
            self.changes.fetch_add(1, AtomicOrdering::SeqCst);
        }

        fn on_progress(&self, _task: &Task) {
            self.progress.fetch_add(1, AtomicOrdering::SeqCst);
        }

        fn on_task_completed(&self, _task: &Task) {
            self.completed.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    #[test]
    fn test_observer_sees_each_transition() {
        let rec = Arc::new(Recorder::default());
        let mut q = TaskQueue::new(10).with_observer(rec.clone());
        submit(&mut q, Priority::Normal);
        let mut t = q.claim_next().unwrap();
        assert!(q.report_progress(&mut t, 50, "half"));
        q.finish(t, Outcome::Converted(Uuid::new_v4())).unwrap();

        // queued, processing, success
        assert_eq!(rec.changes.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(rec.progress.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(rec.completed.load(AtomicOrdering::SeqCst), 1);
    }
}
