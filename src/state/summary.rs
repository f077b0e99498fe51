use crate::harvester::FetchErrorKind;
use crate::state::ResourceId;
use std::fmt;

/// A resource whose download failed permanently during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    pub resource_id: ResourceId,
    pub kind: FetchErrorKind,
    pub attempts: u32,
}

/// Aggregate outcome of one orchestrator run
///
/// Created at run start, updated only by the coordinating loop as results
/// come back from the pool, and returned to the caller at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks handed to the worker pool
    pub attempted: u64,

    /// Tasks whose bytes were written and recorded in the ledger
    pub succeeded: u64,

    /// Resources already present in the ledger with an intact local file
    pub skipped: u64,

    /// Tasks whose fetch failed after all retries
    pub failed: u64,

    /// Failed resources, in completion order
    pub failures: Vec<FailedResource>,

    /// Resources left unfinished: never dispatched, or their worker panicked
    pub pending: Vec<ResourceId>,

    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
}

impl RunSummary {
    /// Creates an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resource skipped as already harvested
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Records a dispatched task
    pub fn record_attempt(&mut self) {
        self.attempted += 1;
    }

    /// Records a stored download
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Records a permanent fetch failure
    pub fn record_failure(&mut self, resource_id: ResourceId, kind: FetchErrorKind, attempts: u32) {
        self.failed += 1;
        self.failures.push(FailedResource {
            resource_id,
            kind,
            attempts,
        });
    }

    /// Identifiers of every failed resource, suitable for a retry run
    pub fn failed_ids(&self) -> Vec<ResourceId> {
        self.failures
            .iter()
            .map(|f| f.resource_id.clone())
            .collect()
    }

    /// Everything not completed by this run: failures first, then undispatched
    pub fn remaining(&self) -> Vec<ResourceId> {
        let mut remaining = self.failed_ids();
        remaining.extend(self.pending.iter().cloned());
        remaining
    }

    /// Returns true when every resource was either stored or skipped
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.pending.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded: {}, skipped: {}, failed: {} (attempted {})",
            self.succeeded, self.skipped, self.failed, self.attempted
        )?;

        if !self.pending.is_empty() {
            write!(f, ", not dispatched: {}", self.pending.len())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn test_counters() {
        let mut summary = RunSummary::new();
        summary.record_attempt();
        summary.record_attempt();
        summary.record_success();
        summary.record_skip();
        summary.record_failure(id("edgar/data/1/a.txt"), FetchErrorKind::HttpStatus(404), 3);

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec![id("edgar/data/1/a.txt")]);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_remaining_lists_failures_then_pending() {
        let mut summary = RunSummary::new();
        summary.pending.push(id("edgar/data/2/b.txt"));
        summary.record_failure(id("edgar/data/1/a.txt"), FetchErrorKind::Timeout, 5);

        assert_eq!(
            summary.remaining(),
            vec![id("edgar/data/1/a.txt"), id("edgar/data/2/b.txt")]
        );
    }

    #[test]
    fn test_display() {
        let mut summary = RunSummary::new();
        summary.record_attempt();
        summary.record_success();
        assert_eq!(
            summary.to_string(),
            "succeeded: 1, skipped: 0, failed: 0 (attempted 1)"
        );

        summary.pending.push(id("edgar/data/2/b.txt"));
        assert!(summary.to_string().ends_with("not dispatched: 1"));
    }
}
