//! Error types for the doctor-core library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DoctorError`]: a domain or system failure that crosses the core/API
//!   boundary unchanged. Every variant maps to exactly one [`ErrorCode`], and
//!   every code maps to exactly one HTTP-style status, so a handler can render
//!   [`DoctorError::to_payload`] straight into a response body.
//!
//! * [`TransitionError`]: a caller asked a [`crate::task::Task`] to move to a
//!   status its current status does not allow (for example completing a task
//!   that was already cancelled). Converts into [`DoctorError`] with the
//!   `internal_error` code.
//!
//! Expected user-input rejections are *not* errors at all: validators return
//! [`crate::validate::ValidationResult`].

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ── Error codes ──────────────────────────────────────────────────────────

/// Stable, machine-readable error code surfaced to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // File errors
    FileTooLarge,
    FileNotFound,
    InvalidFileFormat,
    FileCorrupted,

    // Task errors
    TaskNotFound,
    TaskExpired,
    TaskLimitExceeded,
    TaskTimeout,

    // Conversion errors
    ConversionFailed,
    UnsupportedConversion,
    InvalidOptions,

    // System errors
    StorageError,
    MemoryLimit,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::FileTooLarge,
        ErrorCode::FileNotFound,
        ErrorCode::InvalidFileFormat,
        ErrorCode::FileCorrupted,
        ErrorCode::TaskNotFound,
        ErrorCode::TaskExpired,
        ErrorCode::TaskLimitExceeded,
        ErrorCode::TaskTimeout,
        ErrorCode::ConversionFailed,
        ErrorCode::UnsupportedConversion,
        ErrorCode::InvalidOptions,
        ErrorCode::StorageError,
        ErrorCode::MemoryLimit,
        ErrorCode::InternalError,
        ErrorCode::ServiceUnavailable,
    ];

    /// HTTP status used when this code is surfaced by the transport layer.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::FileTooLarge => 413,
            ErrorCode::FileNotFound => 404,
            ErrorCode::InvalidFileFormat => 400,
            ErrorCode::FileCorrupted => 422,
            ErrorCode::TaskNotFound => 404,
            ErrorCode::TaskExpired => 410,
            ErrorCode::TaskLimitExceeded => 429,
            ErrorCode::TaskTimeout => 408,
            ErrorCode::ConversionFailed => 500,
            ErrorCode::UnsupportedConversion => 400,
            ErrorCode::InvalidOptions => 400,
            ErrorCode::StorageError => 507,
            ErrorCode::MemoryLimit => 507,
            ErrorCode::InternalError => 500,
            ErrorCode::ServiceUnavailable => 503,
        }
    }

    /// Wire name, e.g. `"file_too_large"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "file_too_large",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::InvalidFileFormat => "invalid_file_format",
            ErrorCode::FileCorrupted => "file_corrupted",
            ErrorCode::TaskNotFound => "task_not_found",
            ErrorCode::TaskExpired => "task_expired",
            ErrorCode::TaskLimitExceeded => "task_limit_exceeded",
            ErrorCode::TaskTimeout => "task_timeout",
            ErrorCode::ConversionFailed => "conversion_failed",
            ErrorCode::UnsupportedConversion => "unsupported_conversion",
            ErrorCode::InvalidOptions => "invalid_options",
            ErrorCode::StorageError => "storage_error",
            ErrorCode::MemoryLimit => "memory_limit",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Domain errors ────────────────────────────────────────────────────────

/// All domain and system errors returned by doctor-core.
#[derive(Debug, Clone, Error)]
pub enum DoctorError {
    // ── Generic ───────────────────────────────────────────────────────────
    /// Base error with an explicit code and free-form details.
    ///
    /// Built with [`DoctorError::new`] (code `internal_error`) or
    /// [`DoctorError::with_code`].
    #[error("{message}")]
    Other {
        message: String,
        code: ErrorCode,
        details: Map<String, Value>,
    },

    /// Structural validation of a request field failed.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // ── File errors ───────────────────────────────────────────────────────
    /// No file with the given id or name exists.
    #[error("{}", file_not_found_message(.file_id, .filename))]
    FileNotFound {
        file_id: Option<Uuid>,
        filename: Option<String>,
    },

    #[error("File size {size} bytes exceeds maximum of {max_size} bytes")]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("File '{filename}' is corrupted: {reason}")]
    FileCorrupted { filename: String, reason: String },

    // ── Task errors ───────────────────────────────────────────────────────
    #[error("Task with ID {task_id} not found")]
    TaskNotFound { task_id: Uuid },

    #[error("Task with ID {task_id} has expired")]
    TaskExpired { task_id: Uuid },

    /// Too many tasks are held in memory at once.
    #[error("Task limit exceeded: {current_count}/{max_count} tasks active")]
    TaskLimitExceeded {
        current_count: usize,
        max_count: usize,
    },

    #[error("Task {task_id} timed out after {timeout_secs} seconds")]
    TaskTimeout { task_id: Uuid, timeout_secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external converter reported a failure.
    #[error("Conversion from {source_format} to {target_format} failed: {reason}")]
    ConversionFailed {
        source_format: String,
        target_format: String,
        reason: String,
    },

    /// The pair is not in the conversion matrix.
    #[error("Conversion from {source_format} to {target_format} is not supported")]
    UnsupportedConversion {
        source_format: String,
        target_format: String,
    },

    #[error("Invalid conversion options: {message}")]
    InvalidOptions {
        message: String,
        option_name: Option<String>,
    },

    // ── System errors ─────────────────────────────────────────────────────
    #[error("Storage error during {operation}: {message}")]
    Storage { message: String, operation: String },

    #[error("Memory limit exceeded: {current_usage} > {max_usage} bytes")]
    MemoryLimit { current_usage: u64, max_usage: u64 },

    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },
}

fn file_not_found_message(file_id: &Option<Uuid>, filename: &Option<String>) -> String {
    match (file_id, filename) {
        (Some(id), _) => format!("File with ID {id} not found"),
        (None, Some(name)) => format!("File '{name}' not found"),
        (None, None) => "File not found".to_string(),
    }
}

impl DoctorError {
    /// Base error with the default `internal_error` code.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(message, ErrorCode::InternalError)
    }

    /// Base error with an explicit code and no details.
    pub fn with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        DoctorError::Other {
            message: message.into(),
            code,
            details: Map::new(),
        }
    }

    /// Attach a detail entry. Only affects [`DoctorError::Other`]; the
    /// specialised variants derive their details from their fields.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let DoctorError::Other { details, .. } = &mut self {
            details.insert(key.into(), value.into());
        }
        self
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        DoctorError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn file_not_found_by_id(file_id: Uuid) -> Self {
        DoctorError::FileNotFound {
            file_id: Some(file_id),
            filename: None,
        }
    }

    pub fn file_not_found_by_name(filename: impl Into<String>) -> Self {
        DoctorError::FileNotFound {
            file_id: None,
            filename: Some(filename.into()),
        }
    }

    pub fn file_too_large(size: u64, max_size: u64) -> Self {
        DoctorError::FileTooLarge { size, max_size }
    }

    pub fn file_corrupted(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        DoctorError::FileCorrupted {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    pub fn task_not_found(task_id: Uuid) -> Self {
        DoctorError::TaskNotFound { task_id }
    }

    pub fn task_expired(task_id: Uuid) -> Self {
        DoctorError::TaskExpired { task_id }
    }

    pub fn task_limit_exceeded(current_count: usize, max_count: usize) -> Self {
        DoctorError::TaskLimitExceeded {
            current_count,
            max_count,
        }
    }

    pub fn task_timeout(task_id: Uuid, timeout_secs: u64) -> Self {
        DoctorError::TaskTimeout {
            task_id,
            timeout_secs,
        }
    }

    pub fn conversion_failed(
        source_format: impl Into<String>,
        target_format: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DoctorError::ConversionFailed {
            source_format: source_format.into(),
            target_format: target_format.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_conversion(
        source_format: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        DoctorError::UnsupportedConversion {
            source_format: source_format.into(),
            target_format: target_format.into(),
        }
    }

    pub fn invalid_options(message: impl Into<String>, option_name: Option<&str>) -> Self {
        DoctorError::InvalidOptions {
            message: message.into(),
            option_name: option_name.map(str::to_string),
        }
    }

    pub fn storage(message: impl Into<String>, operation: impl Into<String>) -> Self {
        DoctorError::Storage {
            message: message.into(),
            operation: operation.into(),
        }
    }

    pub fn memory_limit(current_usage: u64, max_usage: u64) -> Self {
        DoctorError::MemoryLimit {
            current_usage,
            max_usage,
        }
    }

    pub fn service_unavailable(reason: impl Into<String>) -> Self {
        DoctorError::ServiceUnavailable {
            reason: reason.into(),
        }
    }

    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DoctorError::Other { code, .. } => *code,
            DoctorError::Validation { .. } => ErrorCode::InvalidFileFormat,
            DoctorError::FileNotFound { .. } => ErrorCode::FileNotFound,
            DoctorError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            DoctorError::FileCorrupted { .. } => ErrorCode::FileCorrupted,
            DoctorError::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            DoctorError::TaskExpired { .. } => ErrorCode::TaskExpired,
            DoctorError::TaskLimitExceeded { .. } => ErrorCode::TaskLimitExceeded,
            DoctorError::TaskTimeout { .. } => ErrorCode::TaskTimeout,
            DoctorError::ConversionFailed { .. } => ErrorCode::ConversionFailed,
            DoctorError::UnsupportedConversion { .. } => ErrorCode::UnsupportedConversion,
            DoctorError::InvalidOptions { .. } => ErrorCode::InvalidOptions,
            DoctorError::Storage { .. } => ErrorCode::StorageError,
            DoctorError::MemoryLimit { .. } => ErrorCode::MemoryLimit,
            DoctorError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Externally visible status classification.
    pub fn status_code(&self) -> u16 {
        self.code().http_status()
    }

    /// Structured details for the API payload.
    pub fn details(&self) -> Map<String, Value> {
        let value = match self {
            DoctorError::Other { details, .. } => return details.clone(),
            DoctorError::Validation { field, .. } => match field {
                Some(f) => json!({ "field": f }),
                None => json!({}),
            },
            DoctorError::FileNotFound { file_id, filename } => match (file_id, filename) {
                (Some(id), _) => json!({ "file_id": id.to_string() }),
                (None, Some(name)) => json!({ "filename": name }),
                (None, None) => json!({}),
            },
            DoctorError::FileTooLarge { size, max_size } => {
                json!({ "size": size, "max_size": max_size })
            }
            DoctorError::FileCorrupted { filename, reason } => {
                json!({ "filename": filename, "reason": reason })
            }
            DoctorError::TaskNotFound { task_id } | DoctorError::TaskExpired { task_id } => {
                json!({ "task_id": task_id.to_string() })
            }
            DoctorError::TaskLimitExceeded {
                current_count,
                max_count,
            } => json!({ "current_count": current_count, "max_count": max_count }),
            DoctorError::TaskTimeout {
                task_id,
                timeout_secs,
            } => json!({ "task_id": task_id.to_string(), "timeout": timeout_secs }),
            DoctorError::ConversionFailed {
                source_format,
                target_format,
                reason,
            } => json!({
                "source_format": source_format,
                "target_format": target_format,
                "reason": reason,
            }),
            DoctorError::UnsupportedConversion {
                source_format,
                target_format,
            } => json!({ "source_format": source_format, "target_format": target_format }),
            DoctorError::InvalidOptions { option_name, .. } => match option_name {
                Some(name) => json!({ "option_name": name }),
                None => json!({}),
            },
            DoctorError::Storage { operation, .. } => json!({ "operation": operation }),
            DoctorError::MemoryLimit {
                current_usage,
                max_usage,
            } => json!({ "current_usage": current_usage, "max_usage": max_usage }),
            DoctorError::ServiceUnavailable { reason } => json!({ "reason": reason }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Structured payload for API surfacing.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error_code: self.code(),
            message: self.to_string(),
            details: self.details(),
            status_code: self.status_code(),
        }
    }
}

/// `{error_code, message, details, status_code}` as rendered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Map<String, Value>,
    pub status_code: u16,
}

// ── Lifecycle errors ─────────────────────────────────────────────────────

/// A task was asked to move between two statuses that are not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid task transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl From<TransitionError> for DoctorError {
    fn from(e: TransitionError) -> Self {
        DoctorError::new(e.to_string())
            .with_detail("from", e.from.as_str())
            .with_detail("to", e.to.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_has_one_status_in_known_families() {
        let allowed = [400, 404, 408, 410, 413, 422, 429, 500, 503, 507];
        for code in ErrorCode::ALL {
            assert!(
                allowed.contains(&code.http_status()),
                "{code} maps to unexpected status {}",
                code.http_status()
            );
        }
    }

    #[test]
    fn code_wire_names_match_serde() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn base_error_defaults_to_internal() {
        let e = DoctorError::new("boom");
        assert_eq!(e.code(), ErrorCode::InternalError);
        assert_eq!(e.status_code(), 500);
        assert!(e.details().is_empty());
    }

    #[test]
    fn with_code_and_detail() {
        let e = DoctorError::with_code("slow down", ErrorCode::ServiceUnavailable)
            .with_detail("retry_after", 30);
        assert_eq!(e.status_code(), 503);
        assert_eq!(e.details()["retry_after"], 30);
    }

    #[test]
    fn file_not_found_messages() {
        let id = Uuid::new_v4();
        let by_id = DoctorError::file_not_found_by_id(id);
        assert_eq!(by_id.to_string(), format!("File with ID {id} not found"));
        assert_eq!(by_id.details()["file_id"], id.to_string());

        let by_name = DoctorError::file_not_found_by_name("a.md");
        assert_eq!(by_name.to_string(), "File 'a.md' not found");
        assert_eq!(by_name.status_code(), 404);

        let bare = DoctorError::FileNotFound {
            file_id: None,
            filename: None,
        };
        assert_eq!(bare.to_string(), "File not found");
        assert!(bare.details().is_empty());
    }

    #[test]
    fn file_too_large_payload() {
        let payload = DoctorError::file_too_large(600, 500).to_payload();
        assert_eq!(payload.error_code, ErrorCode::FileTooLarge);
        assert_eq!(payload.status_code, 413);
        assert_eq!(payload.details["size"], 600);
        assert_eq!(payload.details["max_size"], 500);
        assert!(payload.message.contains("600 bytes"));
    }

    #[test]
    fn payload_serialises_flat() {
        let payload = DoctorError::unsupported_conversion("pdf", "pdf").to_payload();
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["error_code"], "unsupported_conversion");
        assert_eq!(v["status_code"], 400);
        assert_eq!(v["details"]["source_format"], "pdf");
    }

    #[test]
    fn specialised_codes() {
        let id = Uuid::new_v4();
        assert_eq!(DoctorError::task_expired(id).status_code(), 410);
        assert_eq!(DoctorError::task_limit_exceeded(11, 10).status_code(), 429);
        assert_eq!(DoctorError::task_timeout(id, 300).status_code(), 408);
        assert_eq!(DoctorError::memory_limit(2, 1).status_code(), 507);
        assert_eq!(DoctorError::storage("disk full", "write").status_code(), 507);
        assert_eq!(
            DoctorError::file_corrupted("a.pdf", "bad xref").code(),
            ErrorCode::FileCorrupted
        );
        assert_eq!(
            DoctorError::validation("bad", Some("filename")).code(),
            ErrorCode::InvalidFileFormat
        );
    }

    #[test]
    fn invalid_options_detail_is_optional() {
        let with = DoctorError::invalid_options("bad margin", Some("margin"));
        assert_eq!(with.details()["option_name"], "margin");
        assert!(with.to_string().starts_with("Invalid conversion options"));

        let without = DoctorError::invalid_options("bad", None);
        assert!(without.details().is_empty());
    }

    #[test]
    fn transition_error_converts_to_internal() {
        let e: DoctorError = TransitionError {
            from: TaskStatus::Success,
            to: TaskStatus::Processing,
        }
        .into();
        assert_eq!(e.code(), ErrorCode::InternalError);
        assert_eq!(e.details()["from"], "success");
        assert_eq!(e.details()["to"], "processing");
    }
}
