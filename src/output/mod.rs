//! Output module for run reports and ledger statistics
//!
//! This module handles:
//! - Printing the summary of a harvest run
//! - Summarising and verifying the ledger

pub mod stats;

pub use stats::{format_bytes, load_statistics, print_statistics, LedgerStatistics, VerificationReport};

use crate::state::RunSummary;

/// Prints a run summary to stdout
///
/// Failed resources are listed one per line so the output can be fed back
/// into a retry.
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");
    println!("  Attempted: {}", summary.attempted);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);

    if !summary.pending.is_empty() {
        println!("  Not dispatched: {}", summary.pending.len());
    }
    if summary.cancelled {
        println!("  Run was cancelled before completion");
    }

    if !summary.failures.is_empty() {
        println!("\nFailed resources:");
        for failure in &summary.failures {
            println!(
                "  {} ({}, {} attempts)",
                failure.resource_id, failure.kind, failure.attempts
            );
        }
    }
}
