//! Task lifecycle notifications.
//!
//! The queue calls a [`TaskObserver`] after every status change it applies.
//! Observers only see finished transitions, never half-updated tasks, and run
//! while the queue is borrowed, so they must be quick: forward the event
//! somewhere and return. [`BroadcastObserver`] does exactly that, turning each
//! notification into a [`TaskEvent`] on a Tokio broadcast channel that a
//! WebSocket or SSE layer can subscribe to.
//!
//! # Example
//!
//! ```rust
//! use doctor_core::{Task, TaskObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Failures(AtomicUsize);
//!
//! impl TaskObserver for Failures {
//!     fn on_task_failed(&self, _task: &Task) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::error::ErrorCode;
use crate::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Receives lifecycle notifications from the queue.
///
/// All methods default to no-ops. `on_status_change` fires for every
/// transition, including the final one; the completion and failure hooks fire
/// in addition to it.
pub trait TaskObserver: Send + Sync {
    fn on_status_change(&self, task: &Task) {
        let _ = task;
    }

    /// Progress moved while the task is processing.
    fn on_progress(&self, task: &Task) {
        let _ = task;
    }

    fn on_task_completed(&self, task: &Task) {
        let _ = task;
    }

    fn on_task_failed(&self, task: &Task) {
        let _ = task;
    }
}

/// Observer that ignores everything. The queue's default.
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn TaskObserver>;

/// Wire message for task subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    StatusUpdate {
        task_id: Uuid,
        status: TaskStatus,
        message: String,
    },
    ProgressUpdate {
        task_id: Uuid,
        progress: u8,
        message: String,
    },
    TaskCompleted {
        task_id: Uuid,
        output_file_id: Option<Uuid>,
        processing_time: Option<f64>,
    },
    TaskFailed {
        task_id: Uuid,
        error_code: Option<ErrorCode>,
        error_details: Option<String>,
        can_retry: bool,
    },
}

impl TaskEvent {
    pub fn status(task: &Task) -> Self {
        TaskEvent::StatusUpdate {
            task_id: task.id(),
            status: task.status(),
            message: task.message().to_string(),
        }
    }

    pub fn progress(task: &Task) -> Self {
        TaskEvent::ProgressUpdate {
            task_id: task.id(),
            progress: task.progress(),
            message: task.message().to_string(),
        }
    }

    pub fn completed(task: &Task) -> Self {
        TaskEvent::TaskCompleted {
            task_id: task.id(),
            output_file_id: task.output_file_id(),
            processing_time: task.processing_time(),
        }
    }

    pub fn failed(task: &Task) -> Self {
        TaskEvent::TaskFailed {
            task_id: task.id(),
            error_code: task.error_code(),
            error_details: task.error_details().map(str::to_string),
            can_retry: task.can_retry(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        match self {
            TaskEvent::StatusUpdate { task_id, .. }
            | TaskEvent::ProgressUpdate { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. } => *task_id,
        }
    }

    /// Event name as used on the wire (`"status_update"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::StatusUpdate { .. } => "status_update",
            TaskEvent::ProgressUpdate { .. } => "progress_update",
            TaskEvent::TaskCompleted { .. } => "task_completed",
            TaskEvent::TaskFailed { .. } => "task_failed",
        }
    }
}

/// Publishes every notification as a [`TaskEvent`] on a broadcast channel.
///
/// Sending never blocks; with no live receivers the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<TaskEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: TaskEvent) {
        if self.tx.send(event).is_err() {
            trace!("No task event subscribers");
        }
    }
}

impl TaskObserver for BroadcastObserver {
    fn on_status_change(&self, task: &Task) {
        self.publish(TaskEvent::status(task));
    }

    fn on_progress(&self, task: &Task) {
        self.publish(TaskEvent::progress(task));
    }

    fn on_task_completed(&self, task: &Task) {
        self.publish(TaskEvent::completed(task));
    }

    fn on_task_failed(&self, task: &Task) {
        self.publish(TaskEvent::failed(task));
    }
}
