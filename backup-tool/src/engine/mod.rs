//! Backup engine - strategies and the multi-destination coordinator.
//!
//! - [`copy`]: mirror the source tree under a destination directory
//! - [`archive`]: stream the source tree into one compressed tar file
//! - [`fanout`]: run a strategy against every destination concurrently

pub mod archive;
pub mod copy;
pub mod fanout;

pub use archive::ArchiveStrategy;
pub use copy::CopyStrategy;
pub use fanout::{Coordinator, DestinationOutcome, RunReport};

use crate::config::Config;
use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// What one destination ended up with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    /// Files written (copied or archived)
    pub files: usize,
    /// Directories visited below the source root
    pub directories: usize,
    /// Payload bytes read from the source
    pub bytes: u64,
    /// Archive file, or the tree handed to a remote upload
    pub artifact: Option<PathBuf>,
    pub duration: Duration,
}

/// Strategy selector as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Copy,
    Archive,
}

impl FromStr for StrategyKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copy" => Ok(StrategyKind::Copy),
            "compress" | "archive" => Ok(StrategyKind::Archive),
            other => Err(BackupError::Validation(format!(
                "unknown backup strategy '{other}' (expected copy, compress or archive)"
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Copy => f.write_str("copy"),
            StrategyKind::Archive => f.write_str("archive"),
        }
    }
}

/// A configured backup strategy.
#[derive(Debug, Clone)]
pub enum Strategy {
    Copy(CopyStrategy),
    Archive(ArchiveStrategy),
}

impl Strategy {
    /// Build the strategy for one run. Archive timestamps are fixed here, so
    /// every destination of the run gets the same archive name.
    pub fn from_config(kind: StrategyKind, config: &Config) -> Result<Self> {
        Ok(match kind {
            StrategyKind::Copy => Strategy::Copy(CopyStrategy::from_config(config)),
            StrategyKind::Archive => Strategy::Archive(ArchiveStrategy::from_config(config)?),
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Copy(_) => StrategyKind::Copy,
            Strategy::Archive(_) => StrategyKind::Archive,
        }
    }

    /// Back `source` up into the local directory `destination`.
    pub fn backup(&self, source: &Path, destination: &Path) -> Result<BackupSummary> {
        match self {
            Strategy::Copy(copy) => copy.backup(source, destination),
            Strategy::Archive(archive) => archive.backup(source, destination),
        }
    }

    /// Prepare what a remote upload hands off: the archive, built inside
    /// `staging_dir`, or the source tree itself for copies.
    pub fn stage(&self, source: &Path, staging_dir: &Path) -> Result<BackupSummary> {
        match self {
            Strategy::Copy(_) => Ok(BackupSummary {
                artifact: Some(source.to_path_buf()),
                ..BackupSummary::default()
            }),
            Strategy::Archive(archive) => archive.backup(source, staging_dir),
        }
    }
}

/// Check that `source` is an existing, readable directory and make it absolute.
pub fn validate_source(source: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(source).map_err(|e| {
        BackupError::Validation(format!("cannot resolve source {}: {e}", source.display()))
    })?;

    let metadata = std::fs::metadata(&absolute).map_err(|e| {
        BackupError::Validation(format!("source {} is not accessible: {e}", absolute.display()))
    })?;

    if !metadata.is_dir() {
        return Err(BackupError::Validation(format!(
            "source {} is not a directory",
            absolute.display()
        )));
    }

    std::fs::read_dir(&absolute).map_err(|e| {
        BackupError::Validation(format!("source {} is not readable: {e}", absolute.display()))
    })?;

    Ok(absolute)
}

/// Fail when `destination` is `source` itself or lies anywhere below it.
///
/// Both paths are resolved through symlinks; a destination that does not
/// exist yet is resolved through its closest existing ancestor.
pub fn ensure_outside_source(source: &Path, destination: &Path) -> Result<()> {
    let resolved_source = resolve_path(source).map_err(BackupError::io(source))?;
    let resolved_destination = resolve_path(destination).map_err(BackupError::io(destination))?;

    if resolved_destination.starts_with(&resolved_source) {
        return Err(BackupError::Validation(format!(
            "destination {} lies inside source {}",
            destination.display(),
            source.display()
        )));
    }
    Ok(())
}

fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(canonical, |resolved, part| resolved.join(part)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
