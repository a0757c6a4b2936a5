//! Directory traversal with metadata preservation.
//!
//! The walker visits every node of a source tree in a fixed order (sorted by
//! file name, depth-first, parents before children) and hands each one to an
//! [`EntryHandler`]. Strategies only differ in the handler they supply.

use crate::config::WalkConfig;
use crate::fs::metadata::EntryMetadata;
use crate::utils::errors::{BackupError, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Exclude patterns, matched as substrings of the file name
    pub exclude_patterns: Vec<String>,
}

impl WalkOptions {
    fn is_excluded(&self, file_name: &OsStr) -> bool {
        let file_name = file_name.to_string_lossy();
        self.exclude_patterns
            .iter()
            .any(|pattern| file_name.contains(pattern.as_str()))
    }
}

impl From<&WalkConfig> for WalkOptions {
    fn from(config: &WalkConfig) -> Self {
        Self {
            follow_links: config.follow_links,
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

/// A node discovered during walking
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path to the node
    pub path: PathBuf,

    /// Path relative to the source root (empty for the root itself)
    pub relative_path: PathBuf,

    /// Permission bits, mtime and size, resolved through symlinks
    pub metadata: EntryMetadata,

    /// Depth from root
    pub depth: usize,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Location of this entry under another root.
    pub fn mirrored_under(&self, root: &Path) -> PathBuf {
        root.join(&self.relative_path)
    }

    /// Relative path joined with `/`, independent of the host separator.
    pub fn archive_name(&self) -> String {
        self.relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Build a TreeEntry from a DirEntry.
    ///
    /// Returns `None` for nodes the walk skips: dangling symlinks, symlinks to
    /// directories when links are not followed, and special files.
    fn from_entry(entry: &DirEntry, root: &Path, canonical_root: Option<&Path>) -> Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| BackupError::Traversal {
                path: path.clone(),
                reason: format!("not inside source root {}", root.display()),
            })?
            .to_path_buf();

        if let Some(canonical_root) = canonical_root {
            let resolved = path.canonicalize().map_err(BackupError::io(&path))?;
            if !resolved.starts_with(canonical_root) {
                return Err(BackupError::Traversal {
                    path,
                    reason: format!("resolves to {} outside the source root", resolved.display()),
                });
            }
        }

        let Some(metadata) = visited_metadata(entry)? else {
            return Ok(None);
        };

        Ok(Some(Self {
            path,
            relative_path,
            metadata,
            depth: entry.depth(),
        }))
    }
}

/// Metadata of a node the walk visits, or `None` for nodes it skips.
fn visited_metadata(entry: &DirEntry) -> Result<Option<EntryMetadata>> {
    let path = entry.path();
    let file_type = entry.file_type();

    if file_type.is_symlink() {
        // Only reachable when links are not followed
        return Ok(match std::fs::metadata(path) {
            Ok(resolved) if resolved.is_file() => Some(EntryMetadata::from_metadata(&resolved)),
            Ok(_) => {
                tracing::debug!("Skipping symlink to non-file: {}", path.display());
                None
            }
            Err(e) => {
                tracing::debug!("Skipping broken symlink {}: {}", path.display(), e);
                None
            }
        });
    }

    if file_type.is_dir() || file_type.is_file() {
        Ok(Some(EntryMetadata::from_metadata(&entry.metadata()?)))
    } else {
        tracing::debug!("Skipping special file: {}", path.display());
        Ok(None)
    }
}

/// Per-entry callbacks invoked by [`walk_tree`]. Both default to doing nothing.
pub trait EntryHandler {
    fn on_file(&mut self, _entry: &TreeEntry) -> Result<()> {
        Ok(())
    }

    fn on_directory(&mut self, _entry: &TreeEntry) -> Result<()> {
        Ok(())
    }
}

/// Walk a directory tree, dispatching every node to `handler`
///
/// # Arguments
/// * `root` - Source root; also visited, as a directory with an empty relative path
/// * `options` - Walking options (links, exclusions)
/// * `handler` - Receives files and directories in walk order
///
/// # Returns
/// * `Ok(())` - If every node was handled
/// * `Err(BackupError)` - The first traversal, I/O or handler error; the walk stops there
///
/// # Example
/// ```no_run
/// use backup_tool::fs::walker::{walk_tree, EntryHandler, TreeEntry, WalkOptions};
/// use std::path::Path;
///
/// struct Counter(usize);
///
/// impl EntryHandler for Counter {
///     fn on_file(&mut self, _entry: &TreeEntry) -> backup_tool::Result<()> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
///
/// let mut counter = Counter(0);
/// walk_tree(Path::new("/data"), &WalkOptions::default(), &mut counter).unwrap();
/// println!("Found {} files", counter.0);
/// ```
pub fn walk_tree<H>(root: &Path, options: &WalkOptions, handler: &mut H) -> Result<()>
where
    H: EntryHandler + ?Sized,
{
    let canonical_root = if options.follow_links {
        Some(root.canonicalize().map_err(BackupError::io(root))?)
    } else {
        None
    };

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !options.is_excluded(e.file_name()));

    for entry in walker {
        let entry = entry?;

        let Some(tree_entry) = TreeEntry::from_entry(&entry, root, canonical_root.as_deref())? else {
            tracing::warn!("Skipping {}: not a regular file, directory or link to a file", entry.path().display());
            continue;
        };

        if tree_entry.is_dir() {
            handler.on_directory(&tree_entry)?;
        } else {
            handler.on_file(&tree_entry)?;
        }
    }

    Ok(())
}

/// Check whether a directory has no children that the walk would visit.
///
/// Excluded names, dangling symlinks, links to directories (when links are
/// not followed) and special files do not count.
pub fn is_empty_dir(path: &Path, options: &WalkOptions) -> Result<bool> {
    let children = WalkDir::new(path)
        .follow_links(options.follow_links)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !options.is_excluded(e.file_name()));

    for child in children {
        if visited_metadata(&child?)?.is_some() {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        files: Vec<String>,
        dirs: Vec<String>,
        order: Vec<String>,
    }

    impl EntryHandler for Recorder {
        fn on_file(&mut self, entry: &TreeEntry) -> Result<()> {
            self.files.push(entry.archive_name());
            self.order.push(entry.archive_name());
            Ok(())
        }

        fn on_directory(&mut self, entry: &TreeEntry) -> Result<()> {
            self.dirs.push(entry.archive_name());
            self.order.push(format!("{}/", entry.archive_name()));
            Ok(())
        }
    }

    fn sample_tree() -> std::io::Result<TempDir> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("b/inner"))?;
        fs::create_dir(temp_dir.path().join("a"))?;
        fs::write(temp_dir.path().join("z.txt"), b"z")?;
        fs::write(temp_dir.path().join("a/one.txt"), b"1")?;
        fs::write(temp_dir.path().join("b/inner/two.txt"), b"2")?;
        Ok(temp_dir)
    }

    #[test]
    fn test_walk_empty_directory() -> Result<()> {
        let temp_dir = TempDir::new().map_err(BackupError::io("tempdir"))?;
        let mut recorder = Recorder::default();
        walk_tree(temp_dir.path(), &WalkOptions::default(), &mut recorder)?;
        assert!(recorder.files.is_empty());
        assert_eq!(recorder.dirs, vec![String::new()]);
        Ok(())
    }

    #[test]
    fn test_walk_order_is_sorted_and_parents_first() -> Result<()> {
        let temp_dir = sample_tree().map_err(BackupError::io("fixture"))?;
        let mut recorder = Recorder::default();
        walk_tree(temp_dir.path(), &WalkOptions::default(), &mut recorder)?;

        assert_eq!(
            recorder.order,
            vec!["/", "a/", "a/one.txt", "b/", "b/inner/", "b/inner/two.txt", "z.txt"]
        );
        Ok(())
    }

    #[test]
    fn test_walk_is_deterministic() -> Result<()> {
        let temp_dir = sample_tree().map_err(BackupError::io("fixture"))?;
        let mut first = Recorder::default();
        let mut second = Recorder::default();
        walk_tree(temp_dir.path(), &WalkOptions::default(), &mut first)?;
        walk_tree(temp_dir.path(), &WalkOptions::default(), &mut second)?;
        assert_eq!(first.order, second.order);
        Ok(())
    }

    #[test]
    fn test_exclude_patterns_skip_subtrees() -> Result<()> {
        let temp_dir = sample_tree().map_err(BackupError::io("fixture"))?;
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref").unwrap();

        let options = WalkOptions {
            follow_links: false,
            exclude_patterns: vec![".git".to_string()],
        };
        let mut recorder = Recorder::default();
        walk_tree(temp_dir.path(), &options, &mut recorder)?;

        assert!(!recorder.order.iter().any(|p| p.starts_with(".git")));
        assert_eq!(recorder.files.len(), 3);
        Ok(())
    }

    #[test]
    fn test_handler_error_aborts_walk() {
        struct FailOnFile(usize);
        impl EntryHandler for FailOnFile {
            fn on_file(&mut self, entry: &TreeEntry) -> Result<()> {
                self.0 += 1;
                Err(BackupError::Validation(entry.archive_name()))
            }
        }

        let temp_dir = sample_tree().unwrap();
        let mut handler = FailOnFile(0);
        let err = walk_tree(temp_dir.path(), &WalkOptions::default(), &mut handler).unwrap_err();
        assert!(matches!(err, BackupError::Validation(ref name) if name == "a/one.txt"));
        assert_eq!(handler.0, 1);
    }

    #[test]
    fn test_archive_name_uses_forward_slashes() {
        let entry = TreeEntry {
            path: PathBuf::from("/src/a/b/c.txt"),
            relative_path: Path::new("a").join("b").join("c.txt"),
            metadata: EntryMetadata {
                size: 0,
                mode: 0o644,
                modified: 0,
                is_dir: false,
            },
            depth: 3,
        };
        assert_eq!(entry.archive_name(), "a/b/c.txt");
    }

    #[test]
    fn test_is_empty_dir_respects_exclusions() -> Result<()> {
        let temp_dir = TempDir::new().map_err(BackupError::io("tempdir"))?;
        assert!(is_empty_dir(temp_dir.path(), &WalkOptions::default())?);

        fs::write(temp_dir.path().join(".DS_Store"), b"x").unwrap();
        assert!(!is_empty_dir(temp_dir.path(), &WalkOptions::default())?);

        let options = WalkOptions {
            follow_links: false,
            exclude_patterns: vec![".DS_Store".to_string()],
        };
        assert!(is_empty_dir(temp_dir.path(), &options)?);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_is_empty_dir_ignores_skipped_children() -> Result<()> {
        let temp_dir = TempDir::new().map_err(BackupError::io("tempdir"))?;
        let dir = temp_dir.path().join("sub");
        fs::create_dir(&dir).unwrap();
        fs::create_dir(temp_dir.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(dir.join("nowhere"), dir.join("dangling")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("elsewhere"), dir.join("dirlink")).unwrap();
        assert!(is_empty_dir(&dir, &WalkOptions::default())?);

        fs::write(temp_dir.path().join("file.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("file.txt"), dir.join("filelink")).unwrap();
        assert!(!is_empty_dir(&dir, &WalkOptions::default())?);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_without_following() -> Result<()> {
        let temp_dir = TempDir::new().map_err(BackupError::io("tempdir"))?;
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("dir")).unwrap();
        fs::write(root.join("target.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root.join("target.txt"), root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(root.join("dir"), root.join("dirlink")).unwrap();
        std::os::unix::fs::symlink(root.join("missing"), root.join("dangling")).unwrap();

        let mut recorder = Recorder::default();
        walk_tree(&root, &WalkOptions::default(), &mut recorder)?;

        assert_eq!(recorder.files, vec!["link.txt", "target.txt"]);
        assert_eq!(recorder.dirs, vec!["", "dir"]);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_followed_link_escaping_root_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("escape")).unwrap();

        let options = WalkOptions {
            follow_links: true,
            exclude_patterns: Vec::new(),
        };
        let err = walk_tree(&root, &options, &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, BackupError::Traversal { .. }));
    }
}
