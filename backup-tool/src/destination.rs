//! Destination descriptors and classification of raw destination strings.

use std::fmt;
use std::path::{Path, PathBuf};

/// Remote storage platforms a destination may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    AwsS3,
    Azure,
    GoogleDrive,
    Ftp,
    Unknown,
}

impl Platform {
    fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "s3" => Platform::AwsS3,
            "azure" => Platform::Azure,
            "gdrive" => Platform::GoogleDrive,
            "ftp" => Platform::Ftp,
            _ => Platform::Unknown,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::AwsS3 => "aws-s3",
            Platform::Azure => "azure",
            Platform::GoogleDrive => "google-drive",
            Platform::Ftp => "ftp",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Local,
    Remote(Platform),
}

/// One backup target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub target: String,
    pub kind: DestinationKind,
}

impl Destination {
    /// Local destination rooted at `path`.
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self {
            target: path.as_ref().display().to_string(),
            kind: DestinationKind::Local,
        }
    }

    /// Classify a raw destination string.
    ///
    /// `scheme://...` strings are remote; everything else is a local path,
    /// made absolute against the current directory.
    pub fn parse(raw: &str) -> std::io::Result<Self> {
        if let Some((scheme, _)) = raw.split_once("://") {
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Ok(Self {
                    target: raw.to_string(),
                    kind: DestinationKind::Remote(Platform::from_scheme(scheme)),
                });
            }
        }

        let absolute = std::path::absolute(raw)?;
        Ok(Self::local(absolute))
    }

    /// Filesystem root for local destinations.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.kind {
            DestinationKind::Local => Some(PathBuf::from(&self.target)),
            DestinationKind::Remote(_) => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}
