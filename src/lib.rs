//! # doctor-core
//!
//! Task lifecycle and conversion-policy core for the Doctor document
//! conversion service (Markdown ⇄ PDF ⇄ HTML).
//!
//! The crate decides whether a conversion request is acceptable, turns it
//! into a tracked [`Task`], and moves that task through its lifecycle. It
//! never renders documents or talks to the network; the converter and the
//! HTTP/WebSocket layer are external collaborators.
//!
//! ## Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Validate   filename / size / URL / text / options   (validate)
//!  ├─ 2. Record     FileInfo with hash and storage path      (file_info)
//!  ├─ 3. Create     Task with checked conversion pair        (task)
//!  ├─ 4. Queue      weight-ordered, FIFO within a weight     (queue)
//!  ├─ 5. Dispatch   bounded concurrency + per-task timeout   (dispatch)
//!  └─ 6. Observe    TaskEvent / TaskStats                    (events, stats)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use doctor_core::{
//!     validate, DocumentFormat, FileInfo, Priority, ServiceConfig, Task, TaskQueue,
//! };
//!
//! let config = ServiceConfig::default();
//! assert!(validate::validate_filename("report.md").is_valid());
//!
//! let content = b"# Quarterly report";
//! let file = FileInfo::builder(
//!     "report.md",
//!     DocumentFormat::Markdown,
//!     content.len() as u64,
//!     "uploads/report.md",
//!     validate::hash_bytes(content),
//! )
//! .build(&config.limits)
//! .unwrap();
//!
//! let task = Task::new(file.id(), DocumentFormat::Markdown, DocumentFormat::Pdf)
//!     .unwrap()
//!     .with_priority(Priority::High);
//!
//! let mut queue = TaskQueue::from_config(&config);
//! let id = queue.submit(task, &file).unwrap();
//! let claimed = queue.claim_next().unwrap();
//! assert_eq!(claimed.id(), id);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctor` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doctor-core = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod file_info;
pub mod format;
pub mod options;
pub mod queue;
pub mod stats;
pub mod task;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, SizeLimits, StorageArea, StorageLayout};
pub use dispatch::{run_until_idle, run_wave, Converter, DispatchReport, SharedQueue};
pub use error::{DoctorError, ErrorCode, ErrorPayload, TransitionError};
pub use events::{BroadcastObserver, NoopObserver, SharedObserver, TaskEvent, TaskObserver};
pub use file_info::{FileInfo, FileInfoBuilder};
pub use format::{can_convert, can_convert_str, normalize, DocumentFormat, SUPPORTED_EXTENSIONS};
pub use options::{CodeStyle, ConversionOptions, ConversionTheme, PageSize};
pub use queue::{Outcome, TaskQueue};
pub use stats::TaskStats;
pub use task::{Priority, Task, TaskStatus, UploadSource, MAX_RETRIES};
pub use validate::ValidationResult;
