//! File system utilities for backup operations.

pub mod metadata;
pub mod walker;

pub use metadata::EntryMetadata;
pub use walker::{walk_tree, EntryHandler, TreeEntry, WalkOptions};
