//! Backup Tool Library
//!
//! Copies or archives a directory tree to several destinations in parallel,
//! isolating failures per destination.

pub mod config;
pub mod destination;
pub mod engine;
pub mod events;
pub mod fs;
pub mod remote;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use destination::{Destination, DestinationKind, Platform};
pub use engine::{Coordinator, Strategy, StrategyKind};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
