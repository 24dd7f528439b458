//! Core types for change orchestration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome category of one apply or rollback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Success,
    Failed,
    Warn,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Warn => "WARN",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one apply or rollback invocation
///
/// Produced fresh per invocation and never modified afterwards; the engine
/// records it exactly as the change returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    status: ChangeStatus,
    message: String,
}

impl ChangeResult {
    pub fn new(status: ChangeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ChangeStatus::Success, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ChangeStatus::Failed, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(ChangeStatus::Warn, message)
    }

    pub fn status(&self) -> ChangeStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_failed(&self) -> bool {
        self.status == ChangeStatus::Failed
    }
}

impl fmt::Display for ChangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

/// Which side of a change a batch drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Apply,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Options for a batch run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Surface full external command output
    pub verbose: bool,
}

/// What happened to one selected change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Already applied; `apply` was not invoked
    Skipped,
    /// A lock could not be acquired in time; the change was not invoked
    LockTimeout { result: ChangeResult },
    /// The change ran and reported this result
    Completed { result: ChangeResult },
}

impl UnitOutcome {
    /// Status used for aggregation. A skip counts as success.
    pub fn status(&self) -> ChangeStatus {
        match self {
            Self::Skipped => ChangeStatus::Success,
            Self::LockTimeout { result } | Self::Completed { result } => result.status(),
        }
    }

    pub fn result(&self) -> Option<&ChangeResult> {
        match self {
            Self::Skipped => None,
            Self::LockTimeout { result } | Self::Completed { result } => Some(result),
        }
    }
}

/// Report for a single change within a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub path: String,
    pub outcome: UnitOutcome,
}

/// Aggregated outcome of a batch, in processing order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub operation: Operation,
    pub units: Vec<UnitReport>,
}

impl BatchReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            units: Vec::new(),
        }
    }

    /// True when no processed change ended FAILED. Warnings do not count.
    pub fn is_success(&self) -> bool {
        self.units
            .iter()
            .all(|u| u.outcome.status() != ChangeStatus::Failed)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for unit in &self.units {
            summary.add_outcome(&unit.outcome);
        }
        summary
    }

    /// Look up the report for a change by name
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| u.outcome.status() == ChangeStatus::Warn)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| u.outcome.status() == ChangeStatus::Failed)
    }
}

/// Summary counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub warned: usize,
    pub skipped: usize,
}

impl BatchSummary {
    /// Total number of changes processed
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.warned + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::LockTimeout { .. } => self.failed += 1,
            UnitOutcome::Completed { result } => match result.status() {
                ChangeStatus::Success => self.succeeded += 1,
                ChangeStatus::Failed => self.failed += 1,
                ChangeStatus::Warn => self.warned += 1,
            },
        }
    }
}
