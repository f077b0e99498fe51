//! edgar-harvest: a polite, resumable bulk harvester for the SEC EDGAR archive
//!
//! This crate discovers filings from EDGAR directory listings or quarterly
//! full-index archives, downloads each one exactly once through a bounded
//! worker pool, and keeps a hash-verified ledger so repeated runs are
//! idempotent and interrupted runs resume where they stopped.

pub mod config;
pub mod harvester;
pub mod ledger;
pub mod output;
pub mod resolver;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Every variant here is batch-level: per-resource failures are folded into
/// the [`state::RunSummary`] instead of being returned.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Pending list error: {0}")]
    Pending(#[from] ledger::PendingError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] resolver::ResolveError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("{first} and {second} would both be stored at {path}")]
    DestinationConflict {
        path: String,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors for archive paths and resource identifiers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("URL {url} is outside the archive base {base}")]
    OutsideArchive { url: String, base: String },

    #[error("Invalid resource identifier: {0}")]
    InvalidResource(String),

    #[error("Invalid accession number: {0}")]
    InvalidAccession(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use harvester::{FetchResult, Fetcher, Orchestrator};
pub use ledger::{FileLedger, Ledger, LedgerEntry};
pub use state::{DownloadTask, ResourceId, RunSummary};
