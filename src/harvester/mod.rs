//! Harvester module for downloading archive resources
//!
//! This module contains the download machinery:
//! - HTTP fetching with retry, backoff and a backup identity
//! - A bounded, paced worker pool
//! - The orchestrator that ties fetching, storage and the ledger together

mod fetcher;
mod orchestrator;
mod pool;

pub use fetcher::{build_http_client, Fetch, FetchErrorKind, FetchResult, Fetcher, RetryPolicy};
pub use orchestrator::{HarvestEvent, Orchestrator};
pub use pool::{PoolOutcome, WorkerPool};
