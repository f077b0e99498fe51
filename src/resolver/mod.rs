//! Resolvers that turn a remote root into resource identifiers
//!
//! Two kinds of root are supported:
//! - HTML directory listings, filtered to accession folders
//! - Quarterly compressed master indexes, one filing per data line
//!
//! A root that cannot be fetched is an error, never an empty result: an
//! empty [`Resolution`] always means the root was read and held nothing.

mod index;
mod listing;

pub use index::{decode_index, parse_index, resolve_index, resolve_quarters, IndexLine};
pub use listing::{extract_filings, resolve_listing};

use crate::harvester::{Fetch, FetchErrorKind, FetchResult};
use crate::state::ResourceId;
use crate::UrlError;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors raised while resolving a root
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Root {url} unavailable after {attempts} attempts: {kind}")]
    RootUnavailable {
        url: String,
        kind: FetchErrorKind,
        attempts: u32,
    },

    #[error("Index archive {url} is unreadable: {source}")]
    Archive {
        url: String,
        source: zip::result::ZipError,
    },

    #[error("Index archive {url} contains no index file")]
    EmptyArchive { url: String },

    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

/// Result type for resolver operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Children found under one or more roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resource identifiers in discovery order, without duplicates
    pub children: Vec<ResourceId>,

    /// Links or lines that did not match the expected structure
    pub discarded: usize,

    /// Well-formed entries dropped by the form filter
    pub filtered: usize,
}

impl Resolution {
    /// Returns true when no children were found
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of children found
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Appends another resolution, dropping children already present
    pub fn merge(&mut self, other: Resolution) {
        let mut seen: HashSet<ResourceId> = self.children.iter().cloned().collect();
        for child in other.children {
            if seen.insert(child.clone()) {
                self.children.push(child);
            }
        }
        self.discarded += other.discarded;
        self.filtered += other.filtered;
    }

    /// Pushes `child` unless it is already present
    fn push_unique(&mut self, seen: &mut HashSet<ResourceId>, child: ResourceId) {
        if seen.insert(child.clone()) {
            self.children.push(child);
        }
    }
}

/// Fetches a root, turning a failed fetch into `RootUnavailable`
async fn fetch_root<F: Fetch + ?Sized>(fetcher: &F, url: &Url) -> ResolveResult<Vec<u8>> {
    match fetcher.fetch(url).await {
        FetchResult::Success { bytes, .. } => Ok(bytes),
        FetchResult::Failure { kind, attempts } => Err(ResolveError::RootUnavailable {
            url: url.to_string(),
            kind,
            attempts,
        }),
    }
}
