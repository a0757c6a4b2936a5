//! Copy strategy: mirror the source tree under a destination directory.

use super::{ensure_outside_source, BackupSummary};
use crate::config::Config;
use crate::fs::metadata::{ensure_owner_writable, EntryMetadata};
use crate::fs::walker::{walk_tree, EntryHandler, TreeEntry, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CopyStrategy {
    buffer_size: usize,
    walk: WalkOptions,
}

impl CopyStrategy {
    pub fn new(buffer_size: usize, walk: WalkOptions) -> Self {
        Self { buffer_size, walk }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.copy.buffer_size, WalkOptions::from(&config.walk))
    }

    /// Copy `source` into `destination`, overwriting files that already exist.
    ///
    /// Stops at the first error; whatever was copied so far stays in place.
    pub fn backup(&self, source: &Path, destination: &Path) -> Result<BackupSummary> {
        let start = Instant::now();
        ensure_outside_source(source, destination)?;
        tracing::debug!("Copying {} into {}", source.display(), destination.display());

        let mut handler = CopyHandler {
            root: destination,
            buffer_size: self.buffer_size,
            directory_modes: Vec::new(),
            summary: BackupSummary::default(),
        };
        walk_tree(source, &self.walk, &mut handler)?;
        handler.apply_directory_modes()?;

        Ok(BackupSummary {
            duration: start.elapsed(),
            ..handler.summary
        })
    }
}

struct CopyHandler<'a> {
    root: &'a Path,
    buffer_size: usize,
    /// Directory permissions, applied after the walk so read-only source
    /// directories can still be filled.
    directory_modes: Vec<(PathBuf, EntryMetadata)>,
    summary: BackupSummary,
}

impl CopyHandler<'_> {
    fn apply_directory_modes(&mut self) -> Result<()> {
        // Walk order is parents first; children must be locked down first.
        for (path, metadata) in self.directory_modes.drain(..).rev() {
            metadata
                .apply_permissions(&path)
                .map_err(BackupError::io(&path))?;
        }
        Ok(())
    }
}

impl EntryHandler for CopyHandler<'_> {
    fn on_directory(&mut self, entry: &TreeEntry) -> Result<()> {
        let target = entry.mirrored_under(self.root);
        std::fs::create_dir_all(&target).map_err(BackupError::io(&target))?;
        // A previous run may have left this directory read-only.
        ensure_owner_writable(&target).map_err(BackupError::io(&target))?;

        if !entry.is_root() {
            self.summary.directories += 1;
        }
        self.directory_modes.push((target, entry.metadata));
        Ok(())
    }

    fn on_file(&mut self, entry: &TreeEntry) -> Result<()> {
        let target = entry.mirrored_under(self.root);
        let bytes = copy_file(entry, &target, self.buffer_size)?;
        self.summary.files += 1;
        self.summary.bytes += bytes;
        Ok(())
    }
}

/// Copy one file, carrying over its permission bits.
fn copy_file(entry: &TreeEntry, target: &Path, buffer_size: usize) -> Result<u64> {
    tracing::trace!("Copying file {} to {}", entry.path.display(), target.display());

    let source = File::open(&entry.path).map_err(BackupError::io(&entry.path))?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(BackupError::io(parent))?;
    }
    ensure_owner_writable(target).map_err(BackupError::io(target))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(entry.metadata.mode);
    }
    let output = options.open(target).map_err(BackupError::io(target))?;

    let mut reader = BufReader::with_capacity(buffer_size, source);
    let mut writer = BufWriter::with_capacity(buffer_size, output);
    let bytes = std::io::copy(&mut reader, &mut writer).map_err(BackupError::io(target))?;
    writer.flush().map_err(BackupError::io(target))?;

    // The creation mode is filtered by the umask and ignored for existing files.
    entry
        .metadata
        .apply_permissions(target)
        .map_err(BackupError::io(target))?;

    Ok(bytes)
}
