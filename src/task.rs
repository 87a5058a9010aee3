//! The conversion task and its lifecycle.
//!
//! A [`Task`] only changes status through its mutators, and every mutator
//! checks [`TaskStatus::can_transition_to`] first. Final statuses have no
//! outgoing edges, so a finished task can never be reopened: a retry is a new
//! task (see [`Task::retry`]) that remembers the attempt it replaces.
//!
//! ```text
//! Created ──► Queued ◄──► Waiting
//!    │          │            │
//!    └──────────┴─────┬──────┘
//!                     ▼
//!                Processing ──► Success | Failed | Cancelled
//!
//! Created / Queued / Waiting ──► Expired | Cancelled | Success | Failed
//! ```

use crate::error::{DoctorError, ErrorCode, TransitionError};
use crate::format::{can_convert, DocumentFormat};
use crate::options::ConversionOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Attempts allowed after the first failure.
pub const MAX_RETRIES: u8 = 3;

// ── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Queued,
    Waiting,
    Processing,
    Success,
    Failed,
    Cancelled,
    Expired,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Created,
        TaskStatus::Queued,
        TaskStatus::Waiting,
        TaskStatus::Processing,
        TaskStatus::Success,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Processing => "processing",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Expired => "expired",
        }
    }

    /// No further transitions are possible.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Expired
        )
    }

    /// A worker currently owns the task.
    pub fn is_active(self) -> bool {
        self == TaskStatus::Processing
    }

    pub fn is_cancellable(self) -> bool {
        !self.is_final()
    }

    /// Not yet started and not finished.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            TaskStatus::Created | TaskStatus::Queued | TaskStatus::Waiting
        )
    }

    /// The transition table.
    ///
    /// Pending tasks may finish without running (a cache hit completes them,
    /// a rejected input fails them). Processing can only end.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, to) {
            (Created, Queued | Waiting) => true,
            (Queued, Waiting) | (Waiting, Queued) => true,
            (Created | Queued | Waiting, Processing | Expired) => true,
            (Created | Queued | Waiting | Processing, Success | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Priority & source ────────────────────────────────────────────────────────

/// Ordered `Low < Normal < High < Urgent`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    /// Selection weight used by the queue; higher runs first.
    pub fn queue_weight(self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 5,
            Priority::High => 10,
            Priority::Urgent => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the task's input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSource {
    #[default]
    File,
    Text,
    Url,
    Api,
}

impl UploadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadSource::File => "file",
            UploadSource::Text => "text",
            UploadSource::Url => "url",
            UploadSource::Api => "api",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Some(UploadSource::File),
            "text" => Some(UploadSource::Text),
            "url" => Some(UploadSource::Url),
            "api" => Some(UploadSource::Api),
            _ => None,
        }
    }
}

impl fmt::Display for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Task ─────────────────────────────────────────────────────────────────────

/// One conversion request moving through the lifecycle.
///
/// Fields are read-only from outside; the mutators below are the only way to
/// change status, and each refuses transitions the table does not allow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: Uuid,
    status: TaskStatus,
    priority: Priority,
    source: UploadSource,

    input_file_id: Uuid,
    output_file_id: Option<Uuid>,
    cache_key: Option<String>,

    source_format: DocumentFormat,
    target_format: DocumentFormat,
    options: ConversionOptions,

    progress: u8,
    message: String,
    error_code: Option<ErrorCode>,
    error_details: Option<String>,

    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,

    /// Seconds between start and completion.
    processing_time: Option<f64>,
    /// Peak bytes reported by the converter.
    memory_used: Option<u64>,
    retry_count: u8,
    /// The failed task this one retries.
    previous_attempt: Option<Uuid>,
    /// The attempt that replaced this one, once retried.
    retried_by: Option<Uuid>,
}

impl Task {
    /// New task in `Created` with default priority, source and options.
    ///
    /// Fails with `unsupported_conversion` when `target` is not reachable from
    /// `source` (including `source == target`).
    pub fn new(
        input_file_id: Uuid,
        source_format: DocumentFormat,
        target_format: DocumentFormat,
    ) -> Result<Self, DoctorError> {
        if !can_convert(source_format, target_format) {
            return Err(DoctorError::unsupported_conversion(
                source_format.as_str(),
                target_format.as_str(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Created,
            priority: Priority::default(),
            source: UploadSource::default(),
            input_file_id,
            output_file_id: None,
            cache_key: None,
            source_format,
            target_format,
            options: ConversionOptions::default(),
            progress: 0,
            message: "Task created".to_string(),
            error_code: None,
            error_details: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time: None,
            memory_used: None,
            retry_count: 0,
            previous_attempt: None,
            retried_by: None,
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: UploadSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Attach options, rejecting a malformed margin with `invalid_options`.
    pub fn with_options(mut self, options: ConversionOptions) -> Result<Self, DoctorError> {
        if let Err(msg) = options.validate().into_result() {
            return Err(DoctorError::invalid_options(msg, Some("margin")));
        }
        self.options = options;
        Ok(self)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source(&self) -> UploadSource {
        self.source
    }

    pub fn input_file_id(&self) -> Uuid {
        self.input_file_id
    }

    pub fn output_file_id(&self) -> Option<Uuid> {
        self.output_file_id
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    pub fn source_format(&self) -> DocumentFormat {
        self.source_format
    }

    pub fn target_format(&self) -> DocumentFormat {
        self.target_format
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn processing_time(&self) -> Option<f64> {
        self.processing_time
    }

    pub fn memory_used(&self) -> Option<u64> {
        self.memory_used
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn previous_attempt(&self) -> Option<Uuid> {
        self.previous_attempt
    }

    pub fn retried_by(&self) -> Option<Uuid> {
        self.retried_by
    }

    // ── Derived ──────────────────────────────────────────────────────────

    pub fn is_complete(&self) -> bool {
        self.status.is_final()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Failed, under the cap, and not already replaced by a retry.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed
            && self.retry_count < MAX_RETRIES
            && self.retried_by.is_none()
    }

    /// Seconds from start to completion, when both are known.
    pub fn duration(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(seconds_between(start, end)),
            _ => None,
        }
    }

    /// Time since creation.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    // ── Mutators ─────────────────────────────────────────────────────────

    fn check(&self, to: TaskStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    fn finish_clock(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(start) = self.started_at {
            self.processing_time = Some(seconds_between(start, now));
        }
    }

    pub fn mark_queued(&mut self) -> Result<(), TransitionError> {
        self.check(TaskStatus::Queued)?;
        self.status = TaskStatus::Queued;
        self.message = "Task queued".to_string();
        Ok(())
    }

    pub fn mark_waiting(&mut self) -> Result<(), TransitionError> {
        self.check(TaskStatus::Waiting)?;
        self.status = TaskStatus::Waiting;
        self.message = "Waiting for resources".to_string();
        Ok(())
    }

    pub fn set_processing(&mut self) -> Result<(), TransitionError> {
        self.check(TaskStatus::Processing)?;
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
        self.message = "Processing conversion".to_string();
        debug!("Task {} processing", self.id);
        Ok(())
    }

    /// Finish successfully with the produced file.
    pub fn set_completed(&mut self, output_file_id: Uuid) -> Result<(), TransitionError> {
        self.check(TaskStatus::Success)?;
        self.status = TaskStatus::Success;
        self.output_file_id = Some(output_file_id);
        self.progress = 100;
        self.message = "Conversion completed successfully".to_string();
        self.finish_clock();
        debug!("Task {} completed -> {}", self.id, output_file_id);
        Ok(())
    }

    pub fn set_failed(
        &mut self,
        code: ErrorCode,
        details: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.check(TaskStatus::Failed)?;
        let details = details.into();
        self.status = TaskStatus::Failed;
        self.error_code = Some(code);
        self.message = format!("Conversion failed: {details}");
        self.error_details = Some(details);
        self.finish_clock();
        debug!("Task {} failed: {}", self.id, code);
        Ok(())
    }

    /// Cancel if still cancellable. Returns `false` (and changes nothing) for a
    /// task that has already finished.
    pub fn cancel(&mut self) -> bool {
        if !self.status.is_cancellable() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.message = "Task cancelled".to_string();
        self.finish_clock();
        true
    }

    /// Expire a task that never started.
    pub fn expire(&mut self) -> Result<(), TransitionError> {
        self.check(TaskStatus::Expired)?;
        self.status = TaskStatus::Expired;
        self.message = "Task expired".to_string();
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Report progress while processing. Clamped to 99 (100 is reserved for
    /// completion). Ignored in any other status; returns whether it applied.
    pub fn update_progress(&mut self, percent: u8, message: impl Into<String>) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        self.progress = percent.min(99).max(self.progress);
        self.message = message.into();
        true
    }

    /// Record a memory reading; the peak is kept.
    pub fn record_memory(&mut self, bytes: u64) {
        self.memory_used = Some(self.memory_used.map_or(bytes, |m| m.max(bytes)));
    }

    /// Build the next attempt for a failed task.
    ///
    /// `self` stays `Failed` and records the new attempt, so a failed task
    /// is retried at most once. The new task has a fresh id, starts in
    /// `Created` with `retry_count + 1`, and keeps the input, formats,
    /// options, priority and cache key.
    pub fn retry(&mut self) -> Result<Task, TransitionError> {
        if !self.can_retry() {
            return Err(TransitionError {
                from: self.status,
                to: TaskStatus::Created,
            });
        }
        let attempt = self.retry_count + 1;
        let next = Task {
            id: Uuid::new_v4(),
            status: TaskStatus::Created,
            priority: self.priority,
            source: self.source,
            input_file_id: self.input_file_id,
            output_file_id: None,
            cache_key: self.cache_key.clone(),
            source_format: self.source_format,
            target_format: self.target_format,
            options: self.options.clone(),
            progress: 0,
            message: format!("Retry {attempt} of {MAX_RETRIES}"),
            error_code: None,
            error_details: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time: None,
            memory_used: None,
            retry_count: attempt,
            previous_attempt: Some(self.id),
            retried_by: None,
        };
        self.retried_by = Some(next.id);
        Ok(next)
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md_to_pdf() -> Task {
        Task::new(Uuid::new_v4(), DocumentFormat::Markdown, DocumentFormat::Pdf).unwrap()
    }

    #[test]
    fn test_new_task_defaults() {
        let t = md_to_pdf();
        assert_eq!(t.status(), TaskStatus::Created);
        assert_eq!(t.priority(), Priority::Normal);
        assert_eq!(t.source(), UploadSource::File);
        assert_eq!(t.progress(), 0);
        assert_eq!(t.message(), "Task created");
        assert_eq!(t.retry_count(), 0);
        assert!(t.duration().is_none());
    }

    #[test]
    fn test_new_rejects_self_conversion() {
        let err = Task::new(Uuid::new_v4(), DocumentFormat::Pdf, DocumentFormat::Pdf).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedConversion);
    }

    #[test]
    fn test_with_options_rejects_bad_margin() {
        let opts = ConversionOptions {
            margin: "ten".into(),
            ..Default::default()
        };
        let err = md_to_pdf().with_options(opts).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOptions);
    }

    #[test]
    fn test_happy_path() {
        let mut t = md_to_pdf();
        t.mark_queued().unwrap();
        t.set_processing().unwrap();
        assert!(t.is_active());
        assert!(t.started_at().is_some());
        assert!(t.update_progress(150, "halfway"));
        assert_eq!(t.progress(), 99);

        let out = Uuid::new_v4();
        t.set_completed(out).unwrap();
        assert_eq!(t.status(), TaskStatus::Success);
        assert_eq!(t.output_file_id(), Some(out));
        assert_eq!(t.progress(), 100);
        assert_eq!(t.message(), "Conversion completed successfully");
        assert!(t.processing_time().unwrap() >= 0.0);
        assert!(t.duration().is_some());
        assert!(t.is_complete());
    }

    #[test]
    fn test_cache_hit_completes_without_start() {
        let mut t = md_to_pdf();
        t.set_completed(Uuid::new_v4()).unwrap();
        assert_eq!(t.status(), TaskStatus::Success);
        assert!(t.processing_time().is_none());
        assert!(t.duration().is_none());
    }

    #[test]
    fn test_failed_sets_error_fields() {
        let mut t = md_to_pdf();
        t.set_processing().unwrap();
        t.set_failed(ErrorCode::ConversionFailed, "renderer crashed")
            .unwrap();
        assert_eq!(t.error_code(), Some(ErrorCode::ConversionFailed));
        assert_eq!(t.error_details(), Some("renderer crashed"));
        assert_eq!(t.message(), "Conversion failed: renderer crashed");
    }

    #[test]
    fn test_final_statuses_are_immutable() {
        for finish in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Cancelled, TaskStatus::Expired] {
            let mut t = md_to_pdf();
            match finish {
                TaskStatus::Success => t.set_completed(Uuid::new_v4()).unwrap(),
                TaskStatus::Failed => t.set_failed(ErrorCode::InternalError, "x").unwrap(),
                TaskStatus::Cancelled => assert!(t.cancel()),
                _ => t.expire().unwrap(),
            }
            let snapshot = t.clone();
            assert!(t.mark_queued().is_err());
            assert!(t.mark_waiting().is_err());
            assert!(t.set_processing().is_err());
            assert!(t.set_completed(Uuid::new_v4()).is_err());
            assert!(t.set_failed(ErrorCode::InternalError, "y").is_err());
            assert!(t.expire().is_err());
            assert!(!t.cancel());
            assert!(!t.update_progress(10, "late"));
            assert_eq!(t, snapshot, "{finish} task changed");
        }
    }

    #[test]
    fn test_transition_table_has_no_exits_from_final() {
        for from in TaskStatus::ALL.into_iter().filter(|s| s.is_final()) {
            for to in TaskStatus::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
        assert!(!TaskStatus::Processing.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Processing.can_transition_to(TaskStatus::Expired));
        assert!(TaskStatus::Waiting.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn test_status_sets() {
        let active: Vec<_> = TaskStatus::ALL.into_iter().filter(|s| s.is_active()).collect();
        assert_eq!(active, vec![TaskStatus::Processing]);
        let cancellable: Vec<_> = TaskStatus::ALL
            .into_iter()
            .filter(|s| s.is_cancellable())
            .collect();
        assert_eq!(
            cancellable,
            vec![
                TaskStatus::Created,
                TaskStatus::Queued,
                TaskStatus::Waiting,
                TaskStatus::Processing
            ]
        );
    }

    #[test]
    fn test_cancel_processing() {
        let mut t = md_to_pdf();
        t.set_processing().unwrap();
        assert!(t.cancel());
        assert_eq!(t.status(), TaskStatus::Cancelled);
        assert!(t.completed_at().is_some());
    }

    #[test]
    fn test_expire_only_pending() {
        let mut t = md_to_pdf();
        t.set_processing().unwrap();
        let err = t.expire().unwrap_err();
        assert_eq!(err.from, TaskStatus::Processing);
        assert_eq!(err.to, TaskStatus::Expired);
    }

    #[test]
    fn test_retry_cap() {
        let mut t = md_to_pdf();
        assert!(!t.can_retry());
        assert!(t.retry().is_err());

        for expected in 1..=MAX_RETRIES {
            t.set_failed(ErrorCode::ConversionFailed, "boom").unwrap();
            assert!(t.can_retry());
            let next = t.retry().unwrap();
            assert_eq!(t.status(), TaskStatus::Failed);
            assert_eq!(t.retried_by(), Some(next.id()));
            assert_eq!(next.retry_count(), expected);
            assert_eq!(next.previous_attempt(), Some(t.id()));
            assert_ne!(next.id(), t.id());
            assert_eq!(next.status(), TaskStatus::Created);
            assert_eq!(next.input_file_id(), t.input_file_id());
            t = next;
        }

        t.set_failed(ErrorCode::ConversionFailed, "boom").unwrap();
        assert_eq!(t.retry_count(), MAX_RETRIES);
        assert!(!t.can_retry());
        assert!(t.retry().is_err());
    }

    #[test]
    fn test_failed_task_is_retried_once() {
        let mut t = md_to_pdf();
        t.set_failed(ErrorCode::ConversionFailed, "boom").unwrap();
        let first = t.retry().unwrap();

        assert!(!t.can_retry());
        let err = t.retry().unwrap_err();
        assert_eq!(err.from, TaskStatus::Failed);
        assert_eq!(t.retried_by(), Some(first.id()));
    }

    #[test]
    fn test_progress_ignored_unless_processing() {
        let mut t = md_to_pdf();
        assert!(!t.update_progress(40, "nope"));
        assert_eq!(t.progress(), 0);
        t.set_processing().unwrap();
        assert!(t.update_progress(40, "converting"));
        assert!(t.update_progress(20, "still converting"));
        assert_eq!(t.progress(), 40);
    }

    #[test]
    fn test_memory_keeps_peak() {
        let mut t = md_to_pdf();
        t.record_memory(10);
        t.record_memory(30);
        t.record_memory(20);
        assert_eq!(t.memory_used(), Some(30));
    }

    #[test]
    fn test_priority_order_and_weight() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::High < Priority::Urgent);
        let weights: Vec<u32> = Priority::ALL.iter().map(|p| p.queue_weight()).collect();
        assert_eq!(weights, vec![1, 5, 10, 100]);
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
    }

    #[test]
    fn test_task_serializes_wire_names() {
        let t = md_to_pdf().with_priority(Priority::High);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["status"], "created");
        assert_eq!(v["priority"], "high");
        assert_eq!(v["source_format"], "markdown");
        assert_eq!(v["target_format"], "pdf");
        assert_eq!(v["options"]["margin"], "20mm");
    }
}
