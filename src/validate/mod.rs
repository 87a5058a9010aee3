//! Security-oriented input validation.
//!
//! Every check here is a pure function of its input (plus, for the quick
//! format check and hashing, a read of the file). Expected rejections come
//! back as a [`ValidationResult`], never as an `Err`: an oversized upload or a
//! `javascript:` URL is normal user input, not a failure of the service.
//!
//! ## Layout
//!
//! 1. [`file`]     filenames, sizes, storage paths, quick header checks, hashing
//! 2. [`url`]      scheme allow-list and private-address blocking
//! 3. [`text`]     raw text input and line-ending sanitisation
//! 4. [`options`]  conversion pair and option-map shape checks
//!
//! Formats are never inferred from content or filenames; the caller-declared
//! format is trusted and real validation is left to the converter.

pub mod file;
pub mod options;
pub mod text;
pub mod url;

use serde::Serialize;

pub use file::{
    content_hash, content_hash_with_progress, hash_bytes, quick_format_check, sanitize_path,
    validate_file_size, validate_filename,
};
pub use options::{validate_conversion, validate_conversion_options};
pub use text::{sanitize_text, validate_text};
pub use url::validate_url;

/// Outcome of a validator: valid, or rejected with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `Ok(())` when valid, otherwise the rejection reason.
    pub fn into_result(self) -> Result<(), String> {
        if self.valid {
            Ok(())
        } else {
            Err(self.error.unwrap_or_else(|| "invalid input".to_string()))
        }
    }
}
