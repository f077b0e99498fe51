//! File-backed ledger implementation
//!
//! This module provides the append-only text file implementation of the
//! Ledger trait.

use crate::ledger::traits::{Ledger, LedgerError, LedgerResult};
use crate::ledger::{write_atomic, LedgerEntry};
use crate::state::ResourceId;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only ledger stored as one line per entry
pub struct FileLedger {
    path: PathBuf,
    file: Option<File>,
    entries: HashMap<ResourceId, LedgerEntry>,
    lines_read: usize,
    malformed: usize,
}

impl FileLedger {
    /// Opens or creates the ledger at `path` and loads its entries
    ///
    /// A final line left without its newline by an interrupted write is
    /// terminated first, so the next append starts on a fresh line.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = open_append(path)?;
        terminate_torn_line(path, &file)?;

        let mut ledger = Self {
            path: path.to_path_buf(),
            file: Some(file),
            entries: HashMap::new(),
            lines_read: 0,
            malformed: 0,
        };
        ledger.load_all()?;

        Ok(ledger)
    }

    /// Loads the ledger at `path` without creating or modifying anything
    ///
    /// A missing file reads as an empty ledger. [`Ledger::record`] on the
    /// returned handle fails with [`LedgerError::ReadOnly`].
    pub fn load(path: &Path) -> LedgerResult<Self> {
        let mut ledger = Self {
            path: path.to_path_buf(),
            file: None,
            entries: HashMap::new(),
            lines_read: 0,
            malformed: 0,
        };
        ledger.load_all()?;

        Ok(ledger)
    }

    /// Path of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the ledger with exactly one line per resource
    ///
    /// Returns the number of lines dropped. The rewrite is atomic: a crash
    /// leaves either the old file or the compacted one.
    pub fn compact(&mut self) -> LedgerResult<usize> {
        self.load_all()?;

        let mut entries: Vec<&LedgerEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.fetched_at
                .cmp(&b.fetched_at)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });

        let mut contents = String::new();
        for entry in &entries {
            contents.push_str(&entry.to_line()?);
            contents.push('\n');
        }

        write_atomic(&self.path, contents.as_bytes())?;

        // The old handle points at the replaced file
        self.file = Some(open_append(&self.path)?);

        let dropped = self.lines_read - entries.len();
        self.lines_read = entries.len();
        self.malformed = 0;

        tracing::info!(
            "Compacted ledger {}: {} entries kept, {} lines dropped",
            self.path.display(),
            entries.len(),
            dropped
        );

        Ok(dropped)
    }
}

impl Ledger for FileLedger {
    fn load_all(&mut self) -> LedgerResult<HashSet<ResourceId>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = HashMap::new();
        let mut lines_read = 0;
        let mut malformed = 0;

        // Split on raw bytes so a damaged line cannot hide the rest of the file
        for (index, raw) in content.split(|b| *b == b'\n').enumerate() {
            let parsed = std::str::from_utf8(raw)
                .map_err(|e| LedgerError::MalformedLine(format!("invalid UTF-8: {}", e)))
                .map(|line| line.trim_end_matches('\r'));

            if matches!(parsed, Ok(line) if line.trim().is_empty()) {
                continue;
            }
            lines_read += 1;

            match parsed.and_then(LedgerEntry::parse_line) {
                Ok(entry) => {
                    // Last occurrence wins
                    entries.insert(entry.resource_id.clone(), entry);
                }
                Err(e) => {
                    malformed += 1;
                    tracing::warn!(
                        "Skipping ledger line {} in {}: {}",
                        index + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }

        tracing::debug!(
            "Loaded {} ledger entries from {} lines ({} malformed)",
            entries.len(),
            lines_read,
            malformed
        );

        self.entries = entries;
        self.lines_read = lines_read;
        self.malformed = malformed;

        Ok(self.entries.keys().cloned().collect())
    }

    fn has(&self, resource_id: &ResourceId) -> bool {
        self.entries.contains_key(resource_id)
    }

    fn get(&self, resource_id: &ResourceId) -> Option<&LedgerEntry> {
        self.entries.get(resource_id)
    }

    fn record(&mut self, entry: LedgerEntry) -> LedgerResult<bool> {
        if let Some(existing) = self.entries.get(&entry.resource_id) {
            if existing.content_hash == entry.content_hash {
                return Ok(false);
            }
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LedgerError::ReadOnly(self.path.display().to_string()))?;

        let mut line = entry.to_line()?;
        line.push('\n');

        // One write per line so concurrent appenders never interleave mid-line
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()?;

        self.lines_read += 1;
        self.entries.insert(entry.resource_id.clone(), entry);

        Ok(true)
    }

    fn entries(&self) -> Vec<&LedgerEntry> {
        let mut entries: Vec<&LedgerEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        entries
    }

    fn lines_read(&self) -> usize {
        self.lines_read
    }

    fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
}

/// Appends a newline if the file is non-empty and does not end with one
fn terminate_torn_line(path: &Path, file: &File) -> LedgerResult<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut reader = File::open(path)?;
    reader.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last)?;

    if last[0] != b'\n' {
        tracing::warn!(
            "Ledger {} ends with an incomplete line; terminating it",
            path.display()
        );
        let mut handle = file;
        handle.write_all(b"\n").map_err(LedgerError::Io)?;
        handle.sync_data()?;
    }

    Ok(())
}
