//! Stored-file records.
//!
//! A [`FileInfo`] is created once, after the upload has been validated and
//! written by the storage layer, and is immutable afterwards except for its
//! metadata map (which bumps `updated_at`). Construction goes through
//! [`FileInfoBuilder::build`], which enforces every field invariant.

use crate::config::SizeLimits;
use crate::error::DoctorError;
use crate::format::DocumentFormat;
use crate::validate::file::{content_hash, MAX_FILENAME_LEN};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Length of a hex-encoded SHA-256 digest.
pub const CONTENT_HASH_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    id: Uuid,
    filename: String,
    format: DocumentFormat,
    size: u64,
    /// Relative to the storage root.
    path: String,
    content_hash: String,
    mime_type: String,
    encoding: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: HashMap<String, Value>,
}

impl FileInfo {
    pub fn builder(
        filename: impl Into<String>,
        format: DocumentFormat,
        size: u64,
        path: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> FileInfoBuilder {
        FileInfoBuilder {
            filename: filename.into(),
            format,
            size,
            path: path.into(),
            content_hash: content_hash.into(),
            mime_type: None,
            encoding: None,
            metadata: HashMap::new(),
        }
    }

    /// Describe a file already on local disk, hashing its content.
    ///
    /// `stored_as` is the relative storage path recorded on the result; the
    /// filename is taken from `local`.
    pub fn from_local_file(
        local: &Path,
        format: DocumentFormat,
        stored_as: &str,
        limits: &SizeLimits,
    ) -> Result<Self, DoctorError> {
        let filename = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = std::fs::metadata(local)
            .map_err(|_| DoctorError::file_not_found_by_name(local.display().to_string()))?;
        let hash = content_hash(local)
            .map_err(|e| DoctorError::storage(e.to_string(), "hash"))?;
        FileInfo::builder(filename, format, meta.len(), stored_as, hash).build(limits)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Lower-cased final suffix including the dot, or `""` when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    pub fn full_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builder for [`FileInfo`]; see [`FileInfo::builder`].
#[derive(Debug, Clone)]
pub struct FileInfoBuilder {
    filename: String,
    format: DocumentFormat,
    size: u64,
    path: String,
    content_hash: String,
    mime_type: Option<String>,
    encoding: Option<String>,
    metadata: HashMap<String, Value>,
}

impl FileInfoBuilder {
    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self, limits: &SizeLimits) -> Result<FileInfo, DoctorError> {
        check_filename(&self.filename)?;

        if self.size == 0 {
            return Err(DoctorError::validation("File size must be positive", Some("size")));
        }
        if self.size > limits.file {
            return Err(DoctorError::file_too_large(self.size, limits.file));
        }

        check_storage_path(&self.path)?;

        if self.content_hash.len() != CONTENT_HASH_LEN
            || !self.content_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(DoctorError::validation(
                format!("Content hash must be {CONTENT_HASH_LEN} hex characters"),
                Some("content_hash"),
            ));
        }

        let now = Utc::now();
        let info = FileInfo {
            id: Uuid::new_v4(),
            mime_type: self
                .mime_type
                .unwrap_or_else(|| self.format.mime_type().to_string()),
            encoding: self.encoding.unwrap_or_else(|| "utf-8".to_string()),
            filename: self.filename,
            format: self.format,
            size: self.size,
            path: self.path,
            content_hash: self.content_hash.to_ascii_lowercase(),
            created_at: now,
            updated_at: now,
            metadata: self.metadata,
        };
        debug!("FileInfo {} for '{}' ({} bytes)", info.id, info.filename, info.size);
        Ok(info)
    }
}

fn check_filename(name: &str) -> Result<(), DoctorError> {
    let field = Some("filename");
    if name.is_empty() || name.trim() != name {
        return Err(DoctorError::validation(
            "Filename cannot be empty or contain leading/trailing spaces",
            field,
        ));
    }
    for bad in ["/", "\\", "\0", ".."] {
        if name.contains(bad) {
            return Err(DoctorError::validation(
                format!("Filename cannot contain {}", bad.escape_default()),
                field,
            ));
        }
    }
    if name.chars().count() > MAX_FILENAME_LEN {
        return Err(DoctorError::validation(
            format!("Filename too long (max {MAX_FILENAME_LEN} characters)"),
            field,
        ));
    }
    Ok(())
}

fn check_storage_path(path: &str) -> Result<(), DoctorError> {
    let field = Some("path");
    let bytes = path.as_bytes();
    let absolute = path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':');
    if absolute {
        return Err(DoctorError::validation("File path must be relative", field));
    }
    if path.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(DoctorError::validation(
            "File path cannot contain parent directory references",
            field,
        ));
    }
    Ok(())
}
