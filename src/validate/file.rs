//! File-level checks: names, sizes, storage paths, header sniffing, hashing.
//!
//! The quick format check is deliberately lenient. It rejects only the
//! obvious (a "PDF" without `%PDF`, a "Markdown" file full of NUL bytes); when
//! the file cannot be read it passes and leaves the verdict to the converter.

use crate::config::SizeLimits;
use crate::format::DocumentFormat;
use crate::task::UploadSource;
use crate::validate::ValidationResult;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Longest accepted filename, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Bytes read by [`quick_format_check`].
pub const QUICK_CHECK_BYTES: u64 = 1024;

/// Chunk size used by [`content_hash`].
pub const HASH_CHUNK_SIZE: usize = 8192;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

static RE_DANGEROUS_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"|?*]"#).unwrap());

// ── Filename ─────────────────────────────────────────────────────────────────

/// Reject filenames that could escape the upload directory or smuggle markup.
///
/// Extensions are not checked: `no_extension` and `file.xyz` are both fine.
pub fn validate_filename(filename: &str) -> ValidationResult {
    if filename.is_empty() {
        return ValidationResult::rejected("Filename cannot be empty");
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return ValidationResult::rejected("Filename contains path traversal characters");
    }
    if filename.contains('\0') {
        return ValidationResult::rejected("Filename contains null bytes");
    }
    if filename.chars().count() > MAX_FILENAME_LEN {
        return ValidationResult::rejected(format!(
            "Filename too long (max {MAX_FILENAME_LEN} characters)"
        ));
    }
    if RE_DANGEROUS_CHARS.is_match(filename) {
        return ValidationResult::rejected("Filename contains potentially dangerous characters");
    }
    ValidationResult::ok()
}

// ── Size ─────────────────────────────────────────────────────────────────────

/// Size must be positive and within the ceiling for `source`.
pub fn validate_file_size(size: u64, source: UploadSource, limits: &SizeLimits) -> ValidationResult {
    if size == 0 {
        return ValidationResult::rejected("File size must be positive");
    }
    let max_size = limits.for_source(source);
    if size > max_size {
        return ValidationResult::rejected(format!(
            "Size {size} bytes exceeds maximum of {max_size} bytes"
        ));
    }
    ValidationResult::ok()
}

// ── Quick format check ───────────────────────────────────────────────────────

/// Best-effort header sanity check against the caller-declared format.
///
/// A missing file is rejected. Any error while opening or reading an existing
/// file passes: the converter will produce the authoritative error.
pub fn quick_format_check(path: &Path, expected: DocumentFormat) -> ValidationResult {
    if !path.exists() {
        return ValidationResult::rejected("File does not exist");
    }

    let header = match read_header(path) {
        Ok(h) => h,
        Err(e) => {
            warn!(
                "Quick check could not read {}: {} (passing)",
                path.display(),
                e
            );
            return ValidationResult::ok();
        }
    };

    if expected == DocumentFormat::Pdf {
        if !header.starts_with(PDF_MAGIC) {
            return ValidationResult::rejected(
                "File doesn't appear to be a PDF (missing %PDF header)",
            );
        }
    } else if expected.is_text() {
        if header.contains(&0u8) {
            return ValidationResult::rejected("File appears to be binary, not text");
        }
        if std::str::from_utf8(&header).is_err() {
            // Latin-1 maps every byte to a code point, so the fallback decode
            // always succeeds.
            debug!("{} is not UTF-8; accepting as Latin-1", path.display());
        }
    }

    ValidationResult::ok()
}

fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(QUICK_CHECK_BYTES as usize);
    File::open(path)?
        .take(QUICK_CHECK_BYTES)
        .read_to_end(&mut header)?;
    Ok(header)
}

// ── Path sanitisation ────────────────────────────────────────────────────────

/// Turn an arbitrary path into a safe relative storage path.
///
/// Absolute paths and paths with a `..` segment collapse to their final
/// component; everything else keeps its structure with `/` separators.
/// Both `/` and `\` are treated as separators, and empty or `.` segments are
/// dropped, so the result is a fixed point: `sanitize_path(sanitize_path(p))`
/// equals `sanitize_path(p)`.
pub fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if is_absolute(path) || segments.iter().any(|s| *s == "..") {
        return segments
            .iter()
            .rev()
            .find(|s| **s != "..")
            .map(|s| s.to_string())
            .unwrap_or_default();
    }

    segments.join("/")
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    // Windows drive prefix, e.g. `C:\` or `c:/`
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

// ── Hashing ──────────────────────────────────────────────────────────────────

/// SHA-256 of a file's full content as 64 lowercase hex characters.
pub fn content_hash(path: &Path) -> io::Result<String> {
    content_hash_with_progress(path, HASH_CHUNK_SIZE, None)
}

/// Streaming SHA-256 with a caller-chosen chunk size and an optional progress
/// callback receiving the running byte count. The digest does not depend on
/// `chunk_size`.
pub fn content_hash_with_progress(
    path: &Path,
    chunk_size: usize,
    on_progress: Option<&dyn Fn(u64)>,
) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
        if let Some(cb) = on_progress {
            cb(total);
        }
    }

    debug!("Hashed {} bytes of {}", total, path.display());
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer (text uploads).
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
