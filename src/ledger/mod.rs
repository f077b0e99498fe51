//! Ledger module for persisting harvest progress
//!
//! This module handles everything that survives between runs:
//! - The append-only content ledger (what was fetched, where it went, its hash)
//! - Hash verification of files the ledger claims are complete
//! - The pending list of resources a later run should pick up
//!
//! The ledger is a plain text file with one comma-separated line per entry:
//!
//! ```text
//! timestamp,resource_id,source_url,local_path,size_bytes,content_hash
//! ```

mod file;
mod hash;
mod pending;
mod traits;

pub use file::FileLedger;
pub use hash::{verify_entry, FileCheck};
pub use pending::{load_pending, save_pending, PendingError};
pub use traits::{Ledger, LedgerError, LedgerResult};

use crate::state::ResourceId;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

const FIELD_COUNT: usize = 6;

/// One completed download as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub fetched_at: DateTime<Utc>,
    pub resource_id: ResourceId,
    pub source_url: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub content_hash: String,
}

impl LedgerEntry {
    /// Serializes the entry as one ledger line, without the trailing newline
    pub fn to_line(&self) -> LedgerResult<String> {
        let local_path = self
            .local_path
            .to_str()
            .ok_or_else(|| LedgerError::InvalidField {
                field: "local_path",
                value: self.local_path.display().to_string(),
            })?;

        let fields = [
            ("source_url", self.source_url.as_str()),
            ("local_path", local_path),
            ("content_hash", self.content_hash.as_str()),
        ];

        for (field, value) in fields {
            if value.is_empty() || value.contains([',', '\n', '\r']) {
                return Err(LedgerError::InvalidField {
                    field,
                    value: value.to_string(),
                });
            }
        }

        Ok(format!(
            "{},{},{},{},{},{}",
            self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.resource_id,
            self.source_url,
            local_path,
            self.size_bytes,
            self.content_hash
        ))
    }

    /// Parses one ledger line
    pub fn parse_line(line: &str) -> LedgerResult<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(LedgerError::MalformedLine(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let fetched_at = DateTime::parse_from_rfc3339(fields[0])
            .map_err(|e| LedgerError::MalformedLine(format!("bad timestamp: {}", e)))?
            .with_timezone(&Utc);

        let resource_id = ResourceId::new(fields[1])
            .map_err(|e| LedgerError::MalformedLine(e.to_string()))?;

        let size_bytes = fields[4]
            .parse::<u64>()
            .map_err(|e| LedgerError::MalformedLine(format!("bad size: {}", e)))?;

        if fields[2].is_empty() || fields[3].is_empty() || fields[5].is_empty() {
            return Err(LedgerError::MalformedLine("empty field".to_string()));
        }

        Ok(Self {
            fetched_at,
            resource_id,
            source_url: fields[2].to_string(),
            local_path: PathBuf::from(fields[3]),
            size_bytes,
            content_hash: fields[5].to_string(),
        })
    }
}

/// Replaces `path` with `contents` so readers see either the old or the new file
///
/// The data goes to a temporary file in the same directory, is synced, and is
/// then renamed over the target.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
