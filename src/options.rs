//! Presentation options carried by a conversion task.
//!
//! None of these change how the core behaves; they are validated for shape and
//! handed to the external converter untouched.

use crate::validate::{options::is_valid_margin, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual theme for the converted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionTheme {
    #[default]
    Default,
    Github,
    Material,
    Dark,
    Light,
    Academic,
}

impl ConversionTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionTheme::Default => "default",
            ConversionTheme::Github => "github",
            ConversionTheme::Material => "material",
            ConversionTheme::Dark => "dark",
            ConversionTheme::Light => "light",
            ConversionTheme::Academic => "academic",
        }
    }

    /// Stylesheet served for this theme.
    pub fn css_url(self) -> String {
        format!("/static/themes/{}.css", self.as_str())
    }
}

/// Syntax-highlighting style for code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeStyle {
    #[default]
    Default,
    Monokai,
    Github,
    Dracula,
    SolarizedLight,
    SolarizedDark,
    VsCode,
    AtomOne,
}

impl CodeStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeStyle::Default => "default",
            CodeStyle::Monokai => "monokai",
            CodeStyle::Github => "github",
            CodeStyle::Dracula => "dracula",
            CodeStyle::SolarizedLight => "solarized-light",
            CodeStyle::SolarizedDark => "solarized-dark",
            CodeStyle::VsCode => "vs-code",
            CodeStyle::AtomOne => "atom-one",
        }
    }

    /// CSS class applied to highlighted blocks.
    pub fn highlight_class(self) -> String {
        format!("highlight-{}", self.as_str())
    }
}

/// Page size for PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PageSize {
    pub const ALL: [PageSize; 4] = [PageSize::A4, PageSize::A3, PageSize::Letter, PageSize::Legal];

    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::A3 => "A3",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        }
    }

    /// Exact, case-sensitive match against the four accepted names.
    pub fn parse(raw: &str) -> Option<Self> {
        PageSize::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single conversion.
///
/// Deserialises from partial JSON; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub theme: ConversionTheme,
    pub code_style: CodeStyle,
    pub page_size: PageSize,
    /// Page margin, e.g. `"20mm"`. Must match `^\d+(mm|cm|in|px)$`.
    pub margin: String,
    pub include_toc: bool,
    pub include_page_numbers: bool,
    pub embed_images: bool,
    pub process_math: bool,
    pub process_mermaid: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            theme: ConversionTheme::default(),
            code_style: CodeStyle::default(),
            page_size: PageSize::default(),
            margin: "20mm".to_string(),
            include_toc: false,
            include_page_numbers: true,
            embed_images: true,
            process_math: true,
            process_mermaid: true,
        }
    }
}

impl ConversionOptions {
    /// Structural check of the typed options (only the margin can be malformed).
    pub fn validate(&self) -> ValidationResult {
        if is_valid_margin(&self.margin) {
            ValidationResult::ok()
        } else {
            ValidationResult::rejected(format!(
                "Invalid margin format: {} (use format like '20mm')",
                self.margin
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_defaults() {
        let o = ConversionOptions::default();
        assert_eq!(o.page_size, PageSize::A4);
        assert_eq!(o.margin, "20mm");
        assert!(!o.include_toc);
        assert!(o.include_page_numbers && o.embed_images && o.process_math && o.process_mermaid);
        assert!(o.validate().is_valid());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let o: ConversionOptions =
            serde_json::from_str(r#"{"theme":"github","code_style":"solarized-dark","include_toc":true}"#)
                .unwrap();
        assert_eq!(o.theme, ConversionTheme::Github);
        assert_eq!(o.code_style, CodeStyle::SolarizedDark);
        assert!(o.include_toc);
        assert_eq!(o.margin, "20mm");
    }

    #[test]
    fn bad_margin_rejected() {
        let o = ConversionOptions {
            margin: "20 mm".into(),
            ..Default::default()
        };
        let v = o.validate();
        assert!(!v.is_valid());
        assert!(v.error().unwrap_or_default().contains("20 mm"));
    }

    #[test]
    fn theme_and_style_helpers() {
        assert_eq!(ConversionTheme::Academic.css_url(), "/static/themes/academic.css");
        assert_eq!(CodeStyle::VsCode.highlight_class(), "highlight-vs-code");
        assert_eq!(
            serde_json::to_string(&CodeStyle::AtomOne).unwrap(),
            "\"atom-one\""
        );
    }

    #[test]
    fn page_size_parse_is_exact() {
        assert_eq!(PageSize::parse("Letter"), Some(PageSize::Letter));
        assert_eq!(PageSize::parse("letter"), None);
        assert_eq!(PageSize::parse("B5"), None);
    }
}
