//! Service configuration.
//!
//! Everything the lifecycle core needs to know about its deployment lives in
//! [`ServiceConfig`], built via [`ServiceConfigBuilder`]. The config is passed
//! explicitly to whatever needs it; there is no process-wide settings object.

use crate::error::DoctorError;
use crate::task::UploadSource;
use crate::validate::sanitize_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default file upload ceiling: 500 MB (decimal).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500_000_000;
/// Default raw-text ceiling: 10 MiB.
pub const DEFAULT_MAX_TEXT_SIZE: u64 = 10 * 1024 * 1024;
/// Default URL-fetch ceiling: 100 MiB.
pub const DEFAULT_MAX_URL_SIZE: u64 = 100 * 1024 * 1024;

// ── Size limits ──────────────────────────────────────────────────────────────

/// Per-source upload ceilings, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLimits {
    pub file: u64,
    pub text: u64,
    pub url: u64,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            file: DEFAULT_MAX_FILE_SIZE,
            text: DEFAULT_MAX_TEXT_SIZE,
            url: DEFAULT_MAX_URL_SIZE,
        }
    }
}

impl SizeLimits {
    /// Ceiling for `source`. API uploads share the file ceiling.
    pub fn for_source(&self, source: UploadSource) -> u64 {
        match source {
            UploadSource::File | UploadSource::Api => self.file,
            UploadSource::Text => self.text,
            UploadSource::Url => self.url,
        }
    }

    /// Same as [`for_source`](Self::for_source) for a raw source name;
    /// unrecognised names fall back to the file ceiling.
    pub fn for_source_name(&self, name: &str) -> u64 {
        UploadSource::parse(name)
            .map(|s| self.for_source(s))
            .unwrap_or(self.file)
    }
}

// ── Storage layout ───────────────────────────────────────────────────────────

/// Storage areas under the service root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Uploads,
    Temp,
    Cache,
    Files,
    Preview,
    Logs,
}

impl StorageArea {
    pub const ALL: [StorageArea; 6] = [
        StorageArea::Uploads,
        StorageArea::Temp,
        StorageArea::Cache,
        StorageArea::Files,
        StorageArea::Preview,
        StorageArea::Logs,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            StorageArea::Uploads => "uploads",
            StorageArea::Temp => "temp",
            StorageArea::Cache => "cache",
            StorageArea::Files => "files",
            StorageArea::Preview => "preview",
            StorageArea::Logs => "logs",
        }
    }
}

/// Directory layout rooted at `root` (default `var/doctor`).
///
/// The core never writes here itself; the layout only resolves where an
/// external storage layer should put things.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub root: PathBuf,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("var").join("doctor"),
        }
    }
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self, area: StorageArea) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Resolve a caller-supplied relative path inside `area`.
    ///
    /// The path goes through [`sanitize_path`] first, so the result always
    /// stays under the area directory.
    pub fn path_for(&self, area: StorageArea, relative: &str) -> PathBuf {
        let safe = sanitize_path(relative);
        let mut path = self.dir(area);
        for segment in safe.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// True if `path` lies under this layout's root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

// ── Service config ───────────────────────────────────────────────────────────

/// Configuration for the lifecycle core and the reference scheduler.
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use doctor_core::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .max_concurrent_tasks(4)
///     .task_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_concurrent_tasks, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Upload ceilings per source.
    pub limits: SizeLimits,

    /// Tasks converted at the same time by the dispatcher. Default: 10.
    pub max_concurrent_tasks: usize,

    /// Non-final tasks the queue will hold before refusing submissions. Default: 100.
    pub max_tasks_in_memory: usize,

    /// Per-conversion timeout in seconds. Default: 300.
    pub task_timeout_secs: u64,

    /// Age after which a task still waiting to run is expired. Default: 3600.
    pub task_ttl_secs: u64,

    /// Re-queue failed tasks automatically while retries remain. Default: true.
    pub auto_retry: bool,

    pub storage: StorageLayout,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: SizeLimits::default(),
            max_concurrent_tasks: 10,
            max_tasks_in_memory: 100,
            task_timeout_secs: 300,
            task_ttl_secs: 3600,
            auto_retry: true,
            storage: StorageLayout::default(),
        }
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn task_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.task_timeout_secs)
    }

    pub fn task_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.task_ttl_secs).unwrap_or(i64::MAX))
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn limits(mut self, limits: SizeLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.limits.file = bytes;
        self
    }

    pub fn max_text_size(mut self, bytes: u64) -> Self {
        self.config.limits.text = bytes;
        self
    }

    pub fn max_url_size(mut self, bytes: u64) -> Self {
        self.config.limits.url = bytes;
        self
    }

    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.config.max_concurrent_tasks = n.max(1);
        self
    }

    pub fn max_tasks_in_memory(mut self, n: usize) -> Self {
        self.config.max_tasks_in_memory = n.max(1);
        self
    }

    pub fn task_timeout_secs(mut self, secs: u64) -> Self {
        self.config.task_timeout_secs = secs.max(1);
        self
    }

    pub fn task_ttl_secs(mut self, secs: u64) -> Self {
        self.config.task_ttl_secs = secs;
        self
    }

    pub fn auto_retry(mut self, v: bool) -> Self {
        self.config.auto_retry = v;
        self
    }

    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageLayout::new(root);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DoctorError> {
        let c = &self.config;
        for (name, value) in [
            ("max_file_size", c.limits.file),
            ("max_text_size", c.limits.text),
            ("max_url_size", c.limits.url),
        ] {
            if value == 0 {
                return Err(DoctorError::invalid_options(
                    format!("{name} must be positive"),
                    Some(name),
                ));
            }
        }
        if c.max_concurrent_tasks > c.max_tasks_in_memory {
            return Err(DoctorError::invalid_options(
                format!(
                    "max_concurrent_tasks ({}) cannot exceed max_tasks_in_memory ({})",
                    c.max_concurrent_tasks, c.max_tasks_in_memory
                ),
                Some("max_concurrent_tasks"),
            ));
        }
        Ok(self.config)
    }
}
