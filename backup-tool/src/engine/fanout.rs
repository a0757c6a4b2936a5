//! Destination fan-out - runs one strategy execution per destination.
//!
//! Every destination gets its own blocking task. A failing destination never
//! cancels the others: the run waits for all of them, records exactly one
//! outcome per destination (in submission order), and only then reduces the
//! outcomes to an overall result.

use super::{validate_source, BackupSummary, Strategy};
use crate::config::Config;
use crate::destination::Destination;
use crate::events::{BackupEvent, EventSink};
use crate::remote::{RemoteUpload, UnsupportedUpload};
use crate::utils::errors::{BackupError, Result};
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

/// Result of backing up to one destination
#[derive(Debug)]
pub struct DestinationOutcome {
    pub destination: Destination,
    pub result: Result<BackupSummary>,
}

/// All outcomes of one run, in the order destinations were given
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<DestinationOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Reduce to one result: the summaries if everything succeeded, otherwise
    /// the first failure in submission order together with the failure count.
    pub fn into_result(self) -> Result<Vec<(Destination, BackupSummary)>> {
        let total = self.outcomes.len();
        let failed = self.failed();
        let mut summaries = Vec::with_capacity(total);

        for outcome in self.outcomes {
            match outcome.result {
                Ok(summary) => summaries.push((outcome.destination, summary)),
                Err(source) => {
                    return Err(BackupError::DestinationsFailed {
                        target: outcome.destination.target,
                        failed,
                        total,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(summaries)
    }
}

/// Runs a strategy against many destinations at once
pub struct Coordinator {
    events: Arc<dyn EventSink>,
    uploader: Arc<dyn RemoteUpload>,
    staging_dir: PathBuf,
    max_concurrent: usize,
}

impl Coordinator {
    /// Unbounded coordinator without any remote uploader.
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            uploader: Arc::new(UnsupportedUpload),
            staging_dir: std::env::temp_dir(),
            max_concurrent: 0,
        }
    }

    pub fn from_config(config: &Config, events: Arc<dyn EventSink>) -> Self {
        Self::new(events)
            .with_staging_dir(config.remote.staging_dir())
            .with_max_concurrent(config.performance.max_concurrent_destinations)
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn RemoteUpload>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = staging_dir;
        self
    }

    /// Limit how many destinations are processed at once (0 = no limit).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Back `source` up to every destination; fails unless all succeeded.
    pub async fn run(
        &self,
        source: &Path,
        destinations: Vec<Destination>,
        strategy: Strategy,
    ) -> Result<Vec<(Destination, BackupSummary)>> {
        self.execute(source, destinations, strategy).await?.into_result()
    }

    /// Back `source` up to every destination and report each outcome.
    ///
    /// Only input validation fails the call itself; destination failures are
    /// recorded in the report.
    pub async fn execute(
        &self,
        source: &Path,
        destinations: Vec<Destination>,
        strategy: Strategy,
    ) -> Result<RunReport> {
        let source = validate_source(source)?;
        if destinations.is_empty() {
            return Err(BackupError::Validation("no destinations given".into()));
        }

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let span = tracing::info_span!("backup_run", %run_id);

        self.events.emit(BackupEvent::RunStarted {
            run_id,
            source: source.clone(),
            strategy: strategy.kind(),
            destinations: destinations.len(),
        });

        let strategy = Arc::new(strategy);
        let source = Arc::new(source);
        let semaphore = (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));

        let mut handles = Vec::with_capacity(destinations.len());
        for (index, destination) in destinations.iter().enumerate() {
            let permit = match &semaphore {
                Some(sem) => Some(
                    Arc::clone(sem)
                        .acquire_owned()
                        .instrument(span.clone())
                        .await
                        .map_err(|e| BackupError::Task(format!("semaphore closed: {e}")))?,
                ),
                None => None,
            };

            let unit = DestinationUnit {
                source: Arc::clone(&source),
                destination: destination.clone(),
                strategy: Arc::clone(&strategy),
                events: Arc::clone(&self.events),
                uploader: Arc::clone(&self.uploader),
                staging_dir: self.staging_dir.join(format!("{run_id}-{index}")),
            };
            let unit_span = tracing::info_span!(parent: &span, "destination", target = %destination);

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let _entered = unit_span.enter();
                unit.run()
            }));
        }

        let outcomes: Vec<DestinationOutcome> = join_all(handles)
            .await
            .into_iter()
            .zip(destinations)
            .map(|(joined, destination)| {
                let result = joined.unwrap_or_else(|e| {
                    let err = BackupError::Task(format!("backup task for {destination} aborted: {e}"));
                    self.events.emit(BackupEvent::DestinationFailed {
                        target: destination.target.clone(),
                        error: err.to_string(),
                    });
                    Err(err)
                });
                DestinationOutcome { destination, result }
            })
            .collect();

        let report = RunReport { run_id, outcomes };
        self.events.emit(BackupEvent::RunFinished {
            run_id,
            succeeded: report.succeeded(),
            failed: report.failed(),
            elapsed: start.elapsed(),
        });

        Ok(report)
    }
}

/// Everything one destination's blocking task needs.
struct DestinationUnit {
    source: Arc<PathBuf>,
    destination: Destination,
    strategy: Arc<Strategy>,
    events: Arc<dyn EventSink>,
    uploader: Arc<dyn RemoteUpload>,
    staging_dir: PathBuf,
}

impl DestinationUnit {
    fn run(self) -> Result<BackupSummary> {
        let target = self.destination.target.clone();
        self.events.emit(BackupEvent::DestinationStarted { target: target.clone() });

        let result = match self.destination.local_path() {
            Some(path) => self.strategy.backup(&self.source, &path),
            None => self.upload(),
        };

        match &result {
            Ok(summary) => self.events.emit(BackupEvent::DestinationCompleted {
                target,
                summary: summary.clone(),
            }),
            Err(e) => self.events.emit(BackupEvent::DestinationFailed {
                target,
                error: e.to_string(),
            }),
        }

        result
    }

    /// Stage the strategy's output locally, then hand it to the uploader.
    fn upload(&self) -> Result<BackupSummary> {
        let result = self
            .strategy
            .stage(&self.source, &self.staging_dir)
            .and_then(|summary| {
                let artifact = summary.artifact.as_deref().unwrap_or(self.source.as_path());
                self.uploader.upload(&self.source, &self.destination, artifact)?;
                Ok(summary)
            });

        if self.staging_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.staging_dir) {
                tracing::warn!("Failed to clean staging dir {}: {}", self.staging_dir.display(), e);
            }
        }

        result
    }
}
