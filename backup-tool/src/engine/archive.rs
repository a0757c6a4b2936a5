//! Archive strategy: stream the source tree into a single compressed tarball.
//!
//! Entries follow walk order. Files carry their relative path (always `/`
//! separated), permission bits and mtime; a directory only gets its own
//! entry, named with a trailing `/`, when it has no children.

use super::{ensure_outside_source, BackupSummary};
use crate::config::{Compression, Config};
use crate::fs::walker::{is_empty_dir, walk_tree, EntryHandler, TreeEntry, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tar::{Builder, EntryType, Header};

#[derive(Debug, Clone)]
pub struct ArchiveStrategy {
    compression: Compression,
    level: i32,
    timestamp: String,
    walk: WalkOptions,
}

impl ArchiveStrategy {
    pub fn new(compression: Compression, level: i32, timestamp: impl Into<String>, walk: WalkOptions) -> Self {
        Self {
            compression,
            level,
            timestamp: timestamp.into(),
            walk,
        }
    }

    /// Build from config, stamping archive names with the current local time.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let timestamp = chrono::Local::now()
            .format(&config.archive.timestamp_format)
            .to_string();

        Ok(Self::new(
            config.archive.compression()?,
            config.archive.compression_level,
            timestamp,
            WalkOptions::from(&config.walk),
        ))
    }

    /// `<source dir name>_<timestamp>.<extension>`
    pub fn archive_name(&self, source: &Path) -> Result<String> {
        let base = source.file_name().ok_or_else(|| {
            BackupError::Validation(format!("source {} has no directory name", source.display()))
        })?;

        Ok(format!(
            "{}_{}.{}",
            base.to_string_lossy(),
            self.timestamp,
            self.compression.extension()
        ))
    }

    /// Write the archive of `source` into the `destination` directory.
    pub fn backup(&self, source: &Path, destination: &Path) -> Result<BackupSummary> {
        self.backup_into(source, destination, |artifact| File::create(artifact).map(BufWriter::new))
    }

    fn backup_into<S, F>(&self, source: &Path, destination: &Path, open: F) -> Result<BackupSummary>
    where
        S: ArchiveSink,
        F: FnOnce(&Path) -> io::Result<S>,
    {
        let start = Instant::now();
        ensure_outside_source(source, destination)?;
        std::fs::create_dir_all(destination).map_err(BackupError::io(destination))?;

        let artifact = destination.join(self.archive_name(source)?);
        tracing::debug!("Writing archive of {} to {}", source.display(), artifact.display());

        match self.write_archive(source, &artifact, open) {
            Ok(mut summary) => {
                summary.duration = start.elapsed();
                summary.artifact = Some(artifact);
                Ok(summary)
            }
            Err(e) => {
                // A truncated archive must not pass for a backup.
                if let Err(rm) = std::fs::remove_file(&artifact) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove incomplete archive {}: {}", artifact.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_archive<S, F>(&self, source: &Path, artifact: &Path, open: F) -> Result<BackupSummary>
    where
        S: ArchiveSink,
        F: FnOnce(&Path) -> io::Result<S>,
    {
        let sink = open(artifact).map_err(BackupError::io(artifact))?;
        let writer = ArchiveWriter::new(sink, self.compression, self.level).map_err(BackupError::io(artifact))?;

        let mut handler = ArchiveHandler {
            builder: Builder::new(writer),
            walk: &self.walk,
            summary: BackupSummary::default(),
        };
        walk_tree(source, &self.walk, &mut handler)?;

        let finalize = |source: io::Error| BackupError::Finalize {
            artifact: artifact.to_path_buf(),
            source,
        };
        let writer = handler.builder.into_inner().map_err(finalize)?;
        writer.finish().map_err(finalize)?;

        Ok(handler.summary)
    }
}

struct ArchiveHandler<'a, W: Write> {
    builder: Builder<W>,
    walk: &'a WalkOptions,
    summary: BackupSummary,
}

impl<W: Write> EntryHandler for ArchiveHandler<'_, W> {
    fn on_file(&mut self, entry: &TreeEntry) -> Result<()> {
        let file = File::open(&entry.path).map_err(BackupError::io(&entry.path))?;
        // Size the entry from the open handle, not the earlier walk metadata.
        let size = file.metadata().map_err(BackupError::io(&entry.path))?.len();

        let mut header = entry_header(entry, EntryType::Regular, size);
        self.builder
            .append_data(&mut header, entry.archive_name(), io::Read::take(file, size))
            .map_err(BackupError::io(&entry.path))?;

        self.summary.files += 1;
        self.summary.bytes += size;
        Ok(())
    }

    fn on_directory(&mut self, entry: &TreeEntry) -> Result<()> {
        // The archive itself stands for the root.
        if entry.is_root() {
            return Ok(());
        }
        self.summary.directories += 1;

        if !is_empty_dir(&entry.path, self.walk)? {
            return Ok(());
        }

        let mut header = entry_header(entry, EntryType::Directory, 0);
        let name = format!("{}/", entry.archive_name());
        self.builder
            .append_data(&mut header, name, io::empty())
            .map_err(BackupError::io(&entry.path))
    }
}

fn entry_header(entry: &TreeEntry, entry_type: EntryType, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(entry.metadata.mode);
    header.set_mtime(entry.metadata.modified);
    header
}

/// Where archive bytes end up once compressed.
trait ArchiveSink: Write {
    /// Make everything written so far durable.
    fn commit(self) -> io::Result<()>;
}

impl ArchiveSink for BufWriter<File> {
    fn commit(mut self) -> io::Result<()> {
        self.flush()?;
        self.get_ref().sync_all()
    }
}

/// Output stream of an archive, compressed with the configured codec.
enum ArchiveWriter<W: Write> {
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Gzip(GzEncoder<W>),
    Plain(W),
}

impl<W: Write> ArchiveWriter<W> {
    fn new(inner: W, compression: Compression, level: i32) -> io::Result<Self> {
        Ok(match compression {
            Compression::Zstd => ArchiveWriter::Zstd(zstd::stream::write::Encoder::new(inner, level)?),
            Compression::Gzip => {
                let level = flate2::Compression::new(level.clamp(0, 9) as u32);
                ArchiveWriter::Gzip(GzEncoder::new(inner, level))
            }
            Compression::None => ArchiveWriter::Plain(inner),
        })
    }
}

impl<S: ArchiveSink> ArchiveWriter<S> {
    /// Flush the compressor trailer and commit the sink.
    fn finish(self) -> io::Result<()> {
        let inner = match self {
            ArchiveWriter::Zstd(encoder) => encoder.finish()?,
            ArchiveWriter::Gzip(encoder) => encoder.finish()?,
            ArchiveWriter::Plain(inner) => inner,
        };
        inner.commit()
    }
}

impl<W: Write> Write for ArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveWriter::Zstd(w) => w.write(buf),
            ArchiveWriter::Gzip(w) => w.write(buf),
            ArchiveWriter::Plain(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveWriter::Zstd(w) => w.flush(),
            ArchiveWriter::Gzip(w) => w.flush(),
            ArchiveWriter::Plain(w) => w.flush(),
        }
    }
}
