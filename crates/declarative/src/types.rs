//! Core types for apply results and options

use crate::error::Error;
use crate::graph::NodeState;
use crate::resource::ResourceKind;
use crate::value::ResourceId;
use serde::{Deserialize, Serialize};

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of concurrent provider calls
    pub jobs: usize,
    /// Stop dispatching new resources once any resource has failed
    pub fail_fast: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            fail_fast: false,
        }
    }
}

/// Outcome of one resource in an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Final node state; `None` for recorded resources that were pruned
    pub state: Option<NodeState>,
    pub result: ApplyResult,
}

/// Per-resource outcomes of an apply, in dependency order
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<ResourceOutcome>,
    pub summary: ExecuteSummary,
    /// One [`Error::ResourceApply`] per failed resource
    pub errors: Vec<Error>,
}

impl ApplyReport {
    pub(crate) fn push(&mut self, outcome: ResourceOutcome) {
        self.summary.add_result(&outcome.result);
        self.outcomes.push(outcome);
    }

    /// Whether every resource converged
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    pub fn outcome(&self, id: &str) -> Option<&ResourceOutcome> {
        self.outcomes.iter().find(|o| o.id.as_str() == id)
    }

    /// Final state of a declared resource
    pub fn state(&self, id: &str) -> Option<NodeState> {
        self.outcome(id).and_then(|o| o.state)
    }

    pub fn result(&self, id: &str) -> Option<&ApplyResult> {
        self.outcome(id).map(|o| &o.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Skipped {
            reason: "dependency failed".into(),
        });
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_changes(), 1);
        assert!(summary.is_success());

        summary.add_result(&ApplyResult::Failed {
            error: "quota exceeded".into(),
        });
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_report_lookup() {
        let mut report = ApplyReport::default();
        report.push(ResourceOutcome {
            id: ResourceId::new("net"),
            kind: ResourceKind::new("test:Network"),
            state: Some(NodeState::Created),
            result: ApplyResult::Created,
        });
        assert_eq!(report.state("net"), Some(NodeState::Created));
        assert_eq!(report.result("net"), Some(&ApplyResult::Created));
        assert_eq!(report.state("fw"), None);
        assert_eq!(report.summary.created, 1);
    }
}
