//! Pending resource list
//!
//! The pending file holds one resource identifier per line. It is fully
//! rewritten at the end of every run and read back by `resume`.

use crate::ledger::write_atomic;
use crate::state::ResourceId;
use crate::UrlError;
use std::path::Path;
use thiserror::Error;

/// Errors reading or writing the pending list
#[derive(Debug, Error)]
pub enum PendingError {
    #[error("IO error on pending list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid entry on line {line} of pending list: {source}")]
    Invalid { line: usize, source: UrlError },
}

/// Atomically replaces the pending list with `ids`
pub fn save_pending(path: &Path, ids: &[ResourceId]) -> Result<(), PendingError> {
    let mut contents = String::with_capacity(ids.len() * 48);
    for id in ids {
        contents.push_str(id.as_str());
        contents.push('\n');
    }

    write_atomic(path, contents.as_bytes())?;
    tracing::debug!("Saved {} pending resources to {}", ids.len(), path.display());

    Ok(())
}

/// Reads the pending list; a missing file means nothing is pending
///
/// Blank lines are ignored and duplicates collapse to their first occurrence.
/// Any other unparseable line is an error: the list is written only by this
/// crate, so damage to it is not something to guess around.
pub fn load_pending(path: &Path) -> Result<Vec<ResourceId>, PendingError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let id = ResourceId::new(line).map_err(|source| PendingError::Invalid {
            line: index + 1,
            source,
        })?;

        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    Ok(ids)
}
