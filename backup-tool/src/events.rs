//! Backup lifecycle events.
//!
//! The coordinator receives an [`EventSink`] and reports every run and
//! destination lifecycle step through it. Strategies and the walker only emit
//! diagnostic `tracing` records. [`TracingSink`] forwards events to `tracing`;
//! tests install a recorder.

use crate::engine::{BackupSummary, StrategyKind};
use crate::utils::format::{format_bytes, format_duration};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Events emitted during a backup run
#[derive(Debug, Clone)]
pub enum BackupEvent {
    /// Run accepted; destinations are about to be launched
    RunStarted {
        run_id: Uuid,
        source: PathBuf,
        strategy: StrategyKind,
        destinations: usize,
    },

    /// A destination unit started working
    DestinationStarted { target: String },

    /// A destination finished successfully
    DestinationCompleted { target: String, summary: BackupSummary },

    /// A destination failed; siblings keep running
    DestinationFailed { target: String, error: String },

    /// Every destination has been attempted
    RunFinished {
        run_id: Uuid,
        succeeded: usize,
        failed: usize,
        elapsed: Duration,
    },
}

/// Receiver of backup events, shared by every unit of a run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BackupEvent);
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: BackupEvent) {
        match event {
            BackupEvent::RunStarted {
                run_id,
                source,
                strategy,
                destinations,
            } => {
                tracing::info!(
                    %run_id,
                    "Starting {} backup of {} to {} destination(s)",
                    strategy,
                    source.display(),
                    destinations
                );
            }
            BackupEvent::DestinationStarted { target } => {
                tracing::info!(destination = %target, "Starting backup to {}", target);
            }
            BackupEvent::DestinationCompleted { target, summary } => {
                let artifact = summary
                    .artifact
                    .as_ref()
                    .map(|p| format!(" -> {}", p.display()))
                    .unwrap_or_default();
                tracing::info!(
                    destination = %target,
                    "Backup to {} completed: {} files, {} directories, {} in {}{}",
                    target,
                    summary.files,
                    summary.directories,
                    format_bytes(summary.bytes),
                    format_duration(summary.duration),
                    artifact
                );
            }
            BackupEvent::DestinationFailed { target, error } => {
                tracing::error!(destination = %target, "Backup to {} failed: {}", target, error);
            }
            BackupEvent::RunFinished {
                run_id,
                succeeded,
                failed,
                elapsed,
            } => {
                if failed == 0 {
                    tracing::info!(
                        %run_id,
                        "Backup run finished: {} destination(s) succeeded in {}",
                        succeeded,
                        format_duration(elapsed)
                    );
                } else {
                    tracing::warn!(
                        %run_id,
                        "Backup run finished with failures: {} succeeded, {} failed",
                        succeeded,
                        failed
                    );
                }
            }
        }
    }
}
