//! Statistics generation from the ledger
//!
//! This module provides functionality for summarising what the ledger
//! records and, optionally, checking every recorded file on disk.

use crate::config::HashAlgorithm;
use crate::ledger::{verify_entry, FileCheck, Ledger};
use crate::state::ResourceId;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Result of re-hashing every recorded file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Files whose hash still matches
    pub intact: u64,

    /// Resources whose file is gone
    pub missing: Vec<ResourceId>,

    /// Resources whose file no longer matches its recorded hash
    pub corrupt: Vec<ResourceId>,

    /// Resources whose file exists but could not be read
    pub unreadable: Vec<ResourceId>,
}

impl VerificationReport {
    /// Resources a harvest run would fetch again
    pub fn damaged(&self) -> Vec<ResourceId> {
        self.missing
            .iter()
            .chain(&self.corrupt)
            .chain(&self.unreadable)
            .cloned()
            .collect()
    }
}

/// Ledger statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatistics {
    /// Distinct resources recorded
    pub entries: u64,

    /// Non-blank lines in the ledger file
    pub lines_read: u64,

    /// Lines that did not parse
    pub malformed_lines: u64,

    /// Valid lines shadowed by a later line for the same resource
    pub superseded_lines: u64,

    /// Sum of recorded file sizes
    pub total_bytes: u64,

    /// Distinct filer groups (CIKs) among recorded resources
    pub groups: u64,

    /// Timestamp of the oldest current entry
    pub first_fetched: Option<DateTime<Utc>>,

    /// Timestamp of the newest current entry
    pub last_fetched: Option<DateTime<Utc>>,

    /// Resources left in the pending list
    pub pending: u64,

    /// Present when verification was requested
    pub verification: Option<VerificationReport>,
}

/// Loads statistics from a ledger
///
/// # Arguments
///
/// * `ledger` - The ledger to summarise
/// * `pending` - Contents of the pending list
/// * `verify` - Re-hash every recorded file with this algorithm when set
pub fn load_statistics(
    ledger: &dyn Ledger,
    pending: &[ResourceId],
    verify: Option<HashAlgorithm>,
) -> LedgerStatistics {
    let entries = ledger.entries();

    let total_bytes = entries.iter().map(|e| e.size_bytes).sum();
    let groups: HashSet<&str> = entries.iter().map(|e| e.resource_id.group()).collect();
    let first_fetched = entries.iter().map(|e| e.fetched_at).min();
    let last_fetched = entries.iter().map(|e| e.fetched_at).max();

    let lines_read = ledger.lines_read() as u64;
    let malformed_lines = ledger.malformed_lines() as u64;
    let superseded_lines = lines_read.saturating_sub(malformed_lines + entries.len() as u64);

    let verification = verify.map(|algorithm| {
        let mut report = VerificationReport::default();

        for entry in &entries {
            match verify_entry(entry, algorithm) {
                Ok(FileCheck::Intact) => report.intact += 1,
                Ok(FileCheck::Missing) => report.missing.push(entry.resource_id.clone()),
                Ok(FileCheck::Corrupt { .. }) => report.corrupt.push(entry.resource_id.clone()),
                Err(e) => {
                    tracing::warn!("Cannot read {}: {}", entry.local_path.display(), e);
                    report.unreadable.push(entry.resource_id.clone());
                }
            }
        }

        report
    });

    LedgerStatistics {
        entries: entries.len() as u64,
        lines_read,
        malformed_lines,
        superseded_lines,
        total_bytes,
        groups: groups.len() as u64,
        first_fetched,
        last_fetched,
        pending: pending.len() as u64,
        verification,
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    println!("Overview:");
    println!("  Resources recorded: {}", stats.entries);
    println!("  Filers: {}", stats.groups);
    println!("  Total size: {}", format_bytes(stats.total_bytes));
    if let (Some(first), Some(last)) = (stats.first_fetched, stats.last_fetched) {
        println!("  Fetched between: {} and {}", first, last);
    }
    println!("  Pending: {}", stats.pending);
    println!();

    println!("Ledger File:");
    println!("  Lines: {}", stats.lines_read);
    println!("  Superseded lines: {}", stats.superseded_lines);
    println!("  Malformed lines: {}", stats.malformed_lines);
    println!();

    if let Some(report) = &stats.verification {
        println!("Verification:");
        println!("  Intact: {}", report.intact);
        println!("  Missing: {}", report.missing.len());
        println!("  Corrupt: {}", report.corrupt.len());
        println!("  Unreadable: {}", report.unreadable.len());

        for resource_id in report.damaged() {
            println!("  - {}", resource_id);
        }
        println!();

        let checked = stats.entries.max(1);
        println!(
            "Integrity: {:.1}% ({} / {} files intact)",
            (report.intact as f64 / checked as f64) * 100.0,
            report.intact,
            stats.entries
        );
    }
}

/// Formats a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
