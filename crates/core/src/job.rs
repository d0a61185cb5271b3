use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::ids::{JobId, OwnerId};

/// Lifecycle: `queued → running → {succeeded, partially_failed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::PartiallyFailed | JobStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            // A job can fail before a worker ever picks it up (queue closed).
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }

    /// Terminal state for a batch that ran to completion.
    pub fn settle(processed: u64, failed: u64) -> JobStatus {
        if failed == 0 {
            JobStatus::Succeeded
        } else if processed == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyFailed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::PartiallyFailed => "partially_failed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "partially_failed" => Ok(JobStatus::PartiallyFailed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: '{other}'")),
        }
    }
}

/// One row that could not be turned into a persisted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

impl RowFailure {
    pub fn new(row: usize, reason: impl Into<String>) -> Self {
        Self { row, reason: reason.into() }
    }

    /// Renders failures as the `error_summary` text, ordered by row.
    pub fn summarize(failures: &[RowFailure]) -> Option<String> {
        if failures.is_empty() {
            return None;
        }
        let mut sorted: Vec<&RowFailure> = failures.iter().collect();
        sorted.sort_by_key(|f| f.row);
        Some(
            sorted
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_count: u64,
    pub processed_count: u64,
    pub failed_count: u64,
    pub error_summary: Option<String>,
}

impl Job {
    /// Rows not yet accounted for as committed or failed.
    pub fn outstanding(&self) -> u64 {
        self.total_count
            .saturating_sub(self.processed_count + self.failed_count)
    }
}
