//! Conversion pair and raw option-map checks.
//!
//! Options arrive as loosely-typed JSON from clients, so the shape checks run
//! on a `serde_json` map before anything is deserialised into
//! [`ConversionOptions`](crate::options::ConversionOptions). Themes and code
//! styles are not checked here; only values the renderer cannot recover from.

use crate::format::{can_convert, normalize};
use crate::options::PageSize;
use crate::validate::ValidationResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_MARGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(mm|cm|in|px)$").unwrap());

/// Whether `margin` is a number followed by `mm`, `cm`, `in` or `px`.
pub fn is_valid_margin(margin: &str) -> bool {
    RE_MARGIN.is_match(margin)
}

/// Check that `source` → `target` is a distinct, supported pair.
///
/// Names are normalised first, so unknown names fold to Markdown.
pub fn validate_conversion(source: &str, target: &str) -> ValidationResult {
    let source = normalize(source);
    let target = normalize(target);

    if source == target {
        return ValidationResult::rejected("Source and target formats are the same");
    }
    if !can_convert(source, target) {
        return ValidationResult::rejected(format!(
            "Conversion from {source} to {target} is not supported"
        ));
    }
    ValidationResult::ok()
}

/// Shape check for a raw option map. An empty map is valid.
pub fn validate_conversion_options(options: &Map<String, Value>) -> ValidationResult {
    if let Some(page_size) = options.get("page_size") {
        let known = page_size.as_str().and_then(PageSize::parse).is_some();
        if !known {
            return ValidationResult::rejected(format!(
                "Invalid page size: {}",
                display_value(page_size)
            ));
        }
    }

    if let Some(margin) = options.get("margin") {
        let Some(margin) = margin.as_str() else {
            return ValidationResult::rejected("Margin must be a string (e.g., '20mm')");
        };
        if !is_valid_margin(margin) {
            return ValidationResult::rejected(format!(
                "Invalid margin format: {margin} (use format like '20mm')"
            ));
        }
    }

    ValidationResult::ok()
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
