//! Remote upload capability.
//!
//! The engine hands remote destinations a prepared artifact (an archive file
//! or the source tree itself) through [`RemoteUpload`]. No storage client
//! ships with the tool: [`UnsupportedUpload`] reports every upload as a
//! failure of that destination.

use crate::destination::{Destination, DestinationKind};
use crate::utils::errors::{BackupError, Result};
use std::path::Path;

pub trait RemoteUpload: Send + Sync {
    /// Upload `artifact` (prepared from `source_root`) to `destination`.
    fn upload(&self, source_root: &Path, destination: &Destination, artifact: &Path) -> Result<()>;
}

/// Default uploader: no platform is supported yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedUpload;

impl RemoteUpload for UnsupportedUpload {
    fn upload(&self, _source_root: &Path, destination: &Destination, artifact: &Path) -> Result<()> {
        match destination.kind {
            DestinationKind::Remote(platform) => {
                tracing::debug!(
                    "No uploader for {} (artifact {})",
                    platform,
                    artifact.display()
                );
                Err(BackupError::Remote {
                    platform,
                    reason: format!("upload to {} is not implemented", destination.target),
                })
            }
            DestinationKind::Local => Err(BackupError::Validation(format!(
                "{} is not a remote destination",
                destination.target
            ))),
        }
    }
}
