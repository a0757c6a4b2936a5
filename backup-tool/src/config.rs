//! Configuration management for the backup tool.
//!
//! Loads configuration from a TOML file; every field falls back to a default,
//! so a partial file (or none at all) is valid.

use crate::utils::errors::{BackupError, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub walk: WalkConfig,
    pub copy: CopyConfig,
    pub archive: ArchiveConfig,
    pub performance: PerformanceConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, written in addition to stdout
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Follow symbolic links into directories
    #[serde(default)]
    pub follow_links: bool,

    /// Skip entries whose file name contains any of these patterns
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Buffer size in bytes used when streaming file contents (default: 1MB)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Compression algorithm (zstd, gzip, none)
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Compression level (1-22 for zstd, 0-9 for gzip)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// chrono format string for the timestamp in archive names
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum destinations processed at once (0 = all at once)
    #[serde(default)]
    pub max_concurrent_destinations: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Where artifacts for remote destinations are staged (default: system temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

/// Codec applied to every entry of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zstd,
    Gzip,
    None,
}

impl Compression {
    /// File extension of archives written with this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Zstd => "tar.zst",
            Compression::Gzip => "tar.gz",
            Compression::None => "tar",
        }
    }
}

impl FromStr for Compression {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" => Ok(Compression::Zstd),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "none" => Ok(Compression::None),
            other => Err(BackupError::Config(format!(
                "unknown compression '{other}' (expected zstd, gzip or none)"
            ))),
        }
    }
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_compression() -> String {
    "zstd".to_string()
}

fn default_compression_level() -> i32 {
    3
}

fn default_timestamp_format() -> String {
    "%Y%m%dT%H%M%S".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: default_compression(),
            compression_level: default_compression_level(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_destinations: 0,
        }
    }
}

impl ArchiveConfig {
    pub fn compression(&self) -> Result<Compression> {
        self.compression.parse()
    }
}

impl RemoteConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, mid-backup.
    pub fn validate(&self) -> Result<()> {
        if self.copy.buffer_size == 0 {
            return Err(BackupError::Config("copy.buffer_size must be positive".into()));
        }

        let level = self.archive.compression_level;
        match self.archive.compression()? {
            Compression::Zstd if !zstd::compression_level_range().contains(&level) => {
                return Err(BackupError::Config(format!(
                    "zstd compression level {level} out of range"
                )));
            }
            Compression::Gzip if !(0..=9).contains(&level) => {
                return Err(BackupError::Config(format!(
                    "gzip compression level {level} out of range (0-9)"
                )));
            }
            _ => {}
        }

        let format = &self.archive.timestamp_format;
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(BackupError::Config(format!(
                "archive.timestamp_format '{format}' is not a valid chrono format"
            )));
        }
        // Specifiers such as %D expand to separators, so check the rendered form.
        let sample = chrono::Local::now().format(format).to_string();
        if sample.contains(['/', '\\', '\0']) {
            return Err(BackupError::Config(format!(
                "archive.timestamp_format '{format}' renders as '{sample}', which is not a valid file name part"
            )));
        }

        Ok(())
    }
}
