//! Download orchestrator
//!
//! This module contains the main harvest loop that ties together all components:
//! - Consulting the ledger so verified downloads are skipped
//! - Dispatching download tasks through the worker pool
//! - Writing fetched bytes to the local store
//! - Recording completed downloads in the ledger
//! - Persisting the pending list so a later run can resume

use crate::config::{Config, HashAlgorithm};
use crate::harvester::fetcher::{Fetch, FetchErrorKind, FetchResult, Fetcher};
use crate::harvester::pool::WorkerPool;
use crate::ledger::{
    load_pending, save_pending, verify_entry, write_atomic, FileCheck, FileLedger, Ledger,
    LedgerEntry,
};
use crate::state::{DownloadTask, ResourceId, RunSummary};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Completed downloads between two progress log lines
const PROGRESS_INTERVAL: u64 = 25;

/// Per-resource progress notifications
///
/// Sent on the optional channel given to [`Orchestrator::with_events`].
/// Events are informational; the [`RunSummary`] stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    /// Already in the ledger with an intact local copy
    Skipped { resource_id: ResourceId },

    /// In the ledger but the local copy is missing or damaged
    Refetching {
        resource_id: ResourceId,
        reason: String,
    },

    /// Written to disk and recorded in the ledger
    Stored {
        resource_id: ResourceId,
        size_bytes: u64,
    },

    /// Every fetch attempt failed
    Failed {
        resource_id: ResourceId,
        kind: FetchErrorKind,
        attempts: u32,
    },
}

/// What a worker hands back for one task
#[derive(Debug)]
enum TaskOutcome {
    Stored { size_bytes: u64, content_hash: String },
    FetchFailed { kind: FetchErrorKind, attempts: u32 },
    WriteFailed(std::io::Error),
}

/// Main orchestrator for harvest runs
///
/// Owns the ledger and the fetcher. Workers only fetch and write files; the
/// ledger and the run summary are updated from the single loop that
/// receives their results.
pub struct Orchestrator<F = Fetcher> {
    fetcher: Arc<F>,
    ledger: FileLedger,
    archive_base: Url,
    download_dir: PathBuf,
    pending_path: PathBuf,
    hash_algorithm: HashAlgorithm,
    max_concurrency: usize,
    request_delay: Duration,
    cancel: CancellationToken,
    events: Option<UnboundedSender<HarvestEvent>>,
}

impl Orchestrator<Fetcher> {
    /// Creates an orchestrator that fetches over HTTP as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Fetcher::from_config(config)?)
    }
}

impl<F: Fetch + 'static> Orchestrator<F> {
    /// Creates an orchestrator around an existing fetcher
    ///
    /// Opens (or creates) the ledger and the download directory. Failing to
    /// do either is fatal: nothing could be recorded.
    pub fn new(config: &Config, fetcher: F) -> Result<Self> {
        let archive_base = crate::url::parse_archive_base(&config.edgar.archive_base_url)?;

        let download_dir = PathBuf::from(&config.output.download_dir);
        std::fs::create_dir_all(&download_dir).map_err(|source| HarvestError::Write {
            path: download_dir.display().to_string(),
            source,
        })?;

        let ledger = FileLedger::open(Path::new(&config.output.ledger_path))?;

        tracing::info!(
            "Ledger {} holds {} entries",
            config.output.ledger_path,
            ledger.len()
        );

        Ok(Self {
            fetcher: Arc::new(fetcher),
            ledger,
            archive_base,
            download_dir,
            pending_path: PathBuf::from(&config.output.pending_path),
            hash_algorithm: config.harvest.hash_algorithm,
            max_concurrency: config.harvest.max_concurrency as usize,
            request_delay: Duration::from_millis(config.harvest.request_delay_ms),
            cancel: CancellationToken::new(),
            events: None,
        })
    }

    /// Uses `token` to stop dispatching new downloads
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sends a [`HarvestEvent`] for every resource handled
    pub fn with_events(mut self, sender: UnboundedSender<HarvestEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Token that cancels the current and any later run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The fetcher, for resolving listings with the same client and identity
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The archive base URL resource identifiers are relative to
    pub fn archive_base(&self) -> &Url {
        &self.archive_base
    }

    /// The ledger backing this orchestrator
    pub fn ledger(&self) -> &FileLedger {
        &self.ledger
    }

    /// Path of the pending list
    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    /// Splits `resource_ids` into verified skips and download tasks
    ///
    /// Reloads the ledger first so entries appended by other processes
    /// count. Duplicate identifiers collapse to their first occurrence.
    /// Two identifiers mapping to the same local file abort the plan
    /// before anything is fetched.
    pub fn plan(&mut self, resource_ids: Vec<ResourceId>) -> Result<(Vec<DownloadTask>, Vec<ResourceId>)> {
        self.ledger.load_all()?;

        let mut seen = HashSet::new();
        let mut destinations: HashMap<PathBuf, ResourceId> = HashMap::new();
        let mut tasks = Vec::new();
        let mut skipped = Vec::new();

        for resource_id in resource_ids {
            if !seen.insert(resource_id.clone()) {
                continue;
            }

            if let Some(entry) = self.ledger.get(&resource_id) {
                let reason = match verify_entry(entry, self.hash_algorithm) {
                    Ok(FileCheck::Intact) => {
                        skipped.push(resource_id);
                        continue;
                    }
                    Ok(FileCheck::Missing) => {
                        format!("{} is missing", entry.local_path.display())
                    }
                    Ok(FileCheck::Corrupt { expected, actual }) => format!(
                        "{} hash mismatch (ledger {}, disk {})",
                        entry.local_path.display(),
                        expected,
                        actual
                    ),
                    Err(e) => format!("cannot read {}: {}", entry.local_path.display(), e),
                };

                tracing::warn!("Re-fetching {}: {}", resource_id, reason);
                self.emit(HarvestEvent::Refetching {
                    resource_id: resource_id.clone(),
                    reason,
                });
            }

            let task = DownloadTask::new(resource_id, &self.archive_base, &self.download_dir)?;
            if let Some(first) = destinations.insert(task.destination.clone(), task.resource_id.clone()) {
                return Err(HarvestError::DestinationConflict {
                    path: task.destination.display().to_string(),
                    first: first.to_string(),
                    second: task.resource_id.to_string(),
                });
            }
            tasks.push(task);
        }

        Ok((tasks, skipped))
    }

    /// Downloads every resource in `resource_ids` not already harvested
    ///
    /// Per-resource failures are collected in the returned summary and never
    /// abort the batch. Local write or ledger failures do: the pending list
    /// is saved and the error returned. The pending list is rewritten at
    /// the end of every run with whatever did not complete.
    pub async fn run(&mut self, resource_ids: Vec<ResourceId>) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new();

        let (tasks, skipped) = self.plan(resource_ids)?;
        for resource_id in skipped {
            tracing::debug!("Skipping {}: already harvested", resource_id);
            summary.record_skip();
            self.emit(HarvestEvent::Skipped { resource_id });
        }

        tracing::info!(
            "Starting harvest: {} to download, {} already complete",
            tasks.len(),
            summary.skipped
        );

        let mut pool = WorkerPool::new(self.max_concurrency, self.request_delay, self.cancel.clone());

        let fetcher = Arc::clone(&self.fetcher);
        let algorithm = self.hash_algorithm;
        let worker = move |task: DownloadTask| {
            let fetcher = Arc::clone(&fetcher);
            async move { download(fetcher.as_ref(), &task, algorithm).await }
        };

        let ledger = &mut self.ledger;
        let events = &self.events;
        let mut fatal: Option<HarvestError> = None;
        let mut unfinished: Vec<ResourceId> = Vec::new();
        let mut completed: u64 = 0;

        let outcome = pool
            .run(tasks, worker, |task: DownloadTask, outcome: TaskOutcome| {
                completed += 1;

                let flow = match outcome {
                    TaskOutcome::Stored {
                        size_bytes,
                        content_hash,
                    } => {
                        let entry = LedgerEntry {
                            fetched_at: Utc::now(),
                            resource_id: task.resource_id.clone(),
                            source_url: task.remote_url.to_string(),
                            local_path: task.destination.clone(),
                            size_bytes,
                            content_hash,
                        };

                        match ledger.record(entry) {
                            Ok(_) => {
                                tracing::debug!(
                                    "Stored {} ({} bytes) at {}",
                                    task.resource_id,
                                    size_bytes,
                                    task.destination.display()
                                );
                                summary.record_success();
                                send(
                                    events,
                                    HarvestEvent::Stored {
                                        resource_id: task.resource_id,
                                        size_bytes,
                                    },
                                );
                                ControlFlow::Continue(())
                            }
                            Err(e) => {
                                tracing::error!("Cannot record {} in ledger: {}", task.resource_id, e);
                                unfinished.push(task.resource_id);
                                fatal.get_or_insert(e.into());
                                ControlFlow::Break(())
                            }
                        }
                    }
                    TaskOutcome::FetchFailed { kind, attempts } => {
                        tracing::warn!(
                            "Failed {} after {} attempts: {}",
                            task.resource_id,
                            attempts,
                            kind
                        );
                        send(
                            events,
                            HarvestEvent::Failed {
                                resource_id: task.resource_id.clone(),
                                kind: kind.clone(),
                                attempts,
                            },
                        );
                        summary.record_failure(task.resource_id, kind, attempts);
                        ControlFlow::Continue(())
                    }
                    TaskOutcome::WriteFailed(source) => {
                        tracing::error!(
                            "Cannot write {}: {}",
                            task.destination.display(),
                            source
                        );
                        unfinished.push(task.resource_id);
                        fatal.get_or_insert(HarvestError::Write {
                            path: task.destination.display().to_string(),
                            source,
                        });
                        ControlFlow::Break(())
                    }
                };

                // Progress reporting
                if completed % PROGRESS_INTERVAL == 0 {
                    let rate = completed as f64 / start_time.elapsed().as_secs_f64();
                    tracing::info!(
                        "Progress: {} downloads finished ({} stored, {} failed), {:.2} files/sec",
                        completed,
                        summary.succeeded,
                        summary.failed,
                        rate
                    );
                }

                flow
            })
            .await;

        summary.attempted = pool.dispatched();
        summary.cancelled = outcome.cancelled;
        summary.pending = outcome
            .panicked
            .into_iter()
            .chain(outcome.undispatched)
            .map(|task| task.resource_id)
            .collect();

        let mut remaining = summary.remaining();
        remaining.extend(unfinished);

        if let Err(e) = save_pending(&self.pending_path, &remaining) {
            tracing::error!(
                "Cannot save pending list {}: {}",
                self.pending_path.display(),
                e
            );
            return Err(fatal.unwrap_or_else(|| e.into()));
        }

        if let Some(e) = fatal {
            tracing::error!(
                "Harvest aborted; {} resources saved to {}",
                remaining.len(),
                self.pending_path.display()
            );
            return Err(e);
        }

        if summary.cancelled {
            tracing::warn!(
                "Harvest cancelled; {} resources saved to {}",
                remaining.len(),
                self.pending_path.display()
            );
        }

        tracing::info!(
            "Harvest finished in {:?}: {}",
            start_time.elapsed(),
            summary
        );

        Ok(summary)
    }

    /// Runs over the pending list left by the previous run
    pub async fn resume(&mut self) -> Result<RunSummary> {
        let resource_ids = load_pending(&self.pending_path)?;

        if resource_ids.is_empty() {
            tracing::info!("Nothing pending in {}", self.pending_path.display());
        } else {
            tracing::info!(
                "Resuming {} resources from {}",
                resource_ids.len(),
                self.pending_path.display()
            );
        }

        self.run(resource_ids).await
    }

    fn emit(&self, event: HarvestEvent) {
        send(&self.events, event);
    }
}

fn send(events: &Option<UnboundedSender<HarvestEvent>>, event: HarvestEvent) {
    if let Some(sender) = events {
        // A dropped receiver only means nobody is listening
        let _ = sender.send(event);
    }
}

/// Fetches one task and writes it to its destination
async fn download<F: Fetch + ?Sized>(
    fetcher: &F,
    task: &DownloadTask,
    algorithm: HashAlgorithm,
) -> TaskOutcome {
    let bytes = match fetcher.fetch(&task.remote_url).await {
        FetchResult::Success { bytes, .. } => bytes,
        FetchResult::Failure { kind, attempts } => {
            return TaskOutcome::FetchFailed { kind, attempts }
        }
    };

    let destination = task.destination.clone();
    let stored = tokio::task::spawn_blocking(move || store(&destination, &bytes, algorithm)).await;

    match stored {
        Ok(Ok((size_bytes, content_hash))) => TaskOutcome::Stored {
            size_bytes,
            content_hash,
        },
        Ok(Err(e)) => TaskOutcome::WriteFailed(e),
        Err(e) => TaskOutcome::WriteFailed(std::io::Error::other(e.to_string())),
    }
}

/// Writes `bytes` atomically and hashes the file as it landed on disk
fn store(destination: &Path, bytes: &[u8], algorithm: HashAlgorithm) -> std::io::Result<(u64, String)> {
    write_atomic(destination, bytes)?;
    let content_hash = algorithm.digest_file(destination)?;
    Ok((bytes.len() as u64, content_hash))
}
