//! State module for tracking harvest progress
//!
//! This module provides the record types that flow through a harvest run.
//!
//! # Components
//!
//! - `ResourceId`: Archive-relative path naming one remote file
//! - `DownloadTask`: The unit of work handed to the worker pool
//! - `RunSummary`: Counters and failure list produced by a run
//! - `Pacer`: Spaces consecutive requests to the archive host

mod pacer;
mod summary;
mod task;

// Re-export main types
pub use pacer::Pacer;
pub use summary::{FailedResource, RunSummary};
pub use task::{DownloadTask, ResourceId};
