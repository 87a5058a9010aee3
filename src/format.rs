//! Document formats and the static conversion matrix.
//!
//! The service only ever deals with three canonical formats. Aliases such as
//! `md` or `htm` are folded into their canonical member by [`normalize`], and
//! anything unrecognised falls back to Markdown rather than being rejected:
//! call sites rely on that permissive default, so it is kept as-is. Use
//! [`DocumentFormat::parse`] when an unknown string must be told apart.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A supported document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum DocumentFormat {
    Markdown,
    Pdf,
    Html,
}

/// Every extension the service recognises, lower-case with leading dot.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".md", ".markdown", ".pdf", ".html", ".htm"];

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [
        DocumentFormat::Markdown,
        DocumentFormat::Pdf,
        DocumentFormat::Html,
    ];

    /// Strict parse: `None` for anything outside the closed set and its aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(DocumentFormat::Markdown),
            "pdf" => Some(DocumentFormat::Pdf),
            "html" | "htm" => Some(DocumentFormat::Html),
            _ => None,
        }
    }

    /// Map a file extension (`"md"` or `".MD"`) to a format, Markdown fallback.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "md" | "markdown" => DocumentFormat::Markdown,
            "pdf" => DocumentFormat::Pdf,
            "html" | "htm" => DocumentFormat::Html,
            _ => DocumentFormat::Markdown,
        }
    }

    /// Canonical lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "text/markdown",
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Html => "text/html",
        }
    }

    /// Extensions accepted for this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentFormat::Markdown => &[".md", ".markdown"],
            DocumentFormat::Pdf => &[".pdf"],
            DocumentFormat::Html => &[".html", ".htm"],
        }
    }

    /// Text formats get the NUL-byte / decodability quick check; PDF gets the
    /// magic-byte check instead.
    pub fn is_text(self) -> bool {
        !matches!(self, DocumentFormat::Pdf)
    }

    /// Formats this one can be converted into.
    pub fn targets(self) -> &'static [DocumentFormat] {
        match self {
            DocumentFormat::Markdown => &[DocumentFormat::Pdf, DocumentFormat::Html],
            DocumentFormat::Pdf => &[DocumentFormat::Markdown, DocumentFormat::Html],
            DocumentFormat::Html => &[DocumentFormat::Markdown, DocumentFormat::Pdf],
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(normalize(s))
    }
}

impl From<String> for DocumentFormat {
    fn from(s: String) -> Self {
        normalize(&s)
    }
}

/// Case-insensitive alias resolution; unknown input becomes Markdown.
pub fn normalize(raw: &str) -> DocumentFormat {
    DocumentFormat::parse(raw).unwrap_or(DocumentFormat::Markdown)
}

/// Whether `source` can be converted into `target`. Self-conversion is never
/// supported.
pub fn can_convert(source: DocumentFormat, target: DocumentFormat) -> bool {
    source != target && source.targets().contains(&target)
}

/// String form of [`can_convert`]. Unknown format names are never
/// convertible here, unlike [`normalize`] which would fold them to Markdown.
pub fn can_convert_str(source: &str, target: &str) -> bool {
    match (DocumentFormat::parse(source), DocumentFormat::parse(target)) {
        (Some(s), Some(t)) => can_convert(s, t),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize("md"), DocumentFormat::Markdown);
        assert_eq!(normalize("MarkDown"), DocumentFormat::Markdown);
        assert_eq!(normalize("PDF"), DocumentFormat::Pdf);
        assert_eq!(normalize("htm"), DocumentFormat::Html);
        assert_eq!(normalize("HTML"), DocumentFormat::Html);
    }

    #[test]
    fn test_normalize_falls_back_to_markdown() {
        assert_eq!(normalize("docx"), DocumentFormat::Markdown);
        assert_eq!(normalize(""), DocumentFormat::Markdown);
        // no whitespace trimming
        assert_eq!(normalize(" pdf "), DocumentFormat::Markdown);
        assert_eq!(DocumentFormat::parse(" pdf "), None);
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["md", "markdown", "pdf", "html", "htm", "HTM", "unknown", ""] {
            let once = normalize(raw);
            assert_eq!(normalize(once.as_str()), once, "raw = {raw:?}");
        }
    }

    #[test]
    fn test_no_self_conversion() {
        for f in DocumentFormat::ALL {
            assert!(!can_convert(f, f));
        }
    }

    #[test]
    fn test_matrix_symmetric_triangle() {
        for a in DocumentFormat::ALL {
            for b in DocumentFormat::ALL {
                assert_eq!(can_convert(a, b), can_convert(b, a));
                assert_eq!(can_convert(a, b), a != b);
            }
        }
    }

    #[test]
    fn test_can_convert_str_rejects_unknown() {
        assert!(can_convert_str("md", "pdf"));
        assert!(can_convert_str("HTM", "markdown"));
        assert!(!can_convert_str("docx", "pdf"));
        assert!(!can_convert_str("pdf", "epub"));
        assert!(!can_convert_str("html", "htm"));
    }

    #[test]
    fn test_mime_and_extensions() {
        assert_eq!(DocumentFormat::Pdf.mime_type(), "application/pdf");
        assert_eq!(DocumentFormat::Markdown.mime_type(), "text/markdown");
        assert_eq!(DocumentFormat::Html.mime_type(), "text/html");
        let all: Vec<&str> = DocumentFormat::ALL
            .iter()
            .flat_map(|f| f.extensions().iter().copied())
            .collect();
        assert_eq!(all.len(), SUPPORTED_EXTENSIONS.len());
        for ext in SUPPORTED_EXTENSIONS {
            assert!(all.contains(&ext));
        }
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(DocumentFormat::from_extension(".HTM"), DocumentFormat::Html);
        assert_eq!(DocumentFormat::from_extension("pdf"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_extension(".txt"), DocumentFormat::Markdown);
    }

    #[test]
    fn test_serde_normalises_on_input() {
        let f: DocumentFormat = serde_json::from_str("\"HTM\"").unwrap();
        assert_eq!(f, DocumentFormat::Html);
        assert_eq!(serde_json::to_string(&DocumentFormat::Pdf).unwrap(), "\"pdf\"");
    }
}
