//! Ledger trait and error types
//!
//! This module defines the trait interface for ledger backends and
//! associated error types.

use crate::ledger::LedgerEntry;
use crate::state::ResourceId;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Malformed ledger line: {0}")]
    MalformedLine(String),

    #[error("Field {field} cannot be stored in the ledger: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("Ledger {0} was opened read-only")]
    ReadOnly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Trait for ledger backend implementations
///
/// A ledger maps resource identifiers to completed downloads. Entries are
/// only ever appended; when the same resource appears more than once the
/// last occurrence wins.
pub trait Ledger {
    /// Re-reads persisted entries and returns the set of recorded resources
    fn load_all(&mut self) -> LedgerResult<HashSet<ResourceId>>;

    /// Returns true if the resource has a recorded entry
    fn has(&self, resource_id: &ResourceId) -> bool;

    /// Gets the current entry for a resource
    fn get(&self, resource_id: &ResourceId) -> Option<&LedgerEntry>;

    /// Appends an entry and makes it durable before returning
    ///
    /// Returns false when an entry with the same resource id and content hash
    /// is already present; nothing is written in that case.
    fn record(&mut self, entry: LedgerEntry) -> LedgerResult<bool>;

    /// All current entries, one per resource
    fn entries(&self) -> Vec<&LedgerEntry>;

    /// Number of lines read during the last load, valid or not
    fn lines_read(&self) -> usize;

    /// Number of lines skipped during the last load because they did not parse
    fn malformed_lines(&self) -> usize;

    /// Number of distinct resources recorded
    fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true when nothing has been recorded
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
