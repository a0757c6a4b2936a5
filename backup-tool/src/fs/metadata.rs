//! File metadata handling for backup operations.
//!
//! Captures the permission bits and modification time that copies and
//! archive entries must carry over from the source tree.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Metadata preserved for every entry of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Permission bits (Unix mode & 0o7777)
    pub mode: u32,

    /// Last modified time (seconds since Unix epoch)
    pub modified: u64,

    /// Is this a directory?
    pub is_dir: bool,
}

impl EntryMetadata {
    /// Extract metadata from an already-resolved `fs::Metadata`
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode: mode_bits(metadata),
            modified,
            is_dir: metadata.is_dir(),
        }
    }

    /// Extract metadata from a path, following symlinks
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs::metadata(path)?))
    }

    /// Apply the permission bits to `path`
    #[cfg(unix)]
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
    }

    #[cfg(not(unix))]
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(self.mode & 0o200 == 0);
        fs::set_permissions(path, perms)
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Make an existing file writable by its owner so it can be truncated.
pub fn ensure_owner_writable(path: &Path) -> std::io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !metadata.permissions().readonly() {
        return Ok(());
    }

    let mut entry = EntryMetadata::from_metadata(&metadata);
    entry.mode |= 0o200;
    entry.apply_permissions(path)
}
