//! Raw text input (pasted Markdown/HTML).

use crate::validate::ValidationResult;

/// Accept non-empty text without NUL bytes whose UTF-8 size fits `max_size`.
///
/// `None` or `Some(0)` disables the size check.
pub fn validate_text(text: &str, max_size: Option<usize>) -> ValidationResult {
    if text.is_empty() {
        return ValidationResult::rejected("Text cannot be empty");
    }
    if text.contains('\0') {
        return ValidationResult::rejected("Text contains null bytes");
    }
    if let Some(max) = max_size.filter(|m| *m > 0) {
        let size = text.len();
        if size > max {
            return ValidationResult::rejected(format!(
                "Text size {size} bytes exceeds maximum of {max} bytes"
            ));
        }
    }
    ValidationResult::ok()
}

/// Strip NUL bytes and normalise line endings to `\n`.
pub fn sanitize_text(text: &str) -> String {
    text.replace('\0', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}
