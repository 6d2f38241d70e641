//! Per-entity outcomes and the final run report.

use serde::{Deserialize, Serialize};

use crate::{Direction, EntityError, EntityName, ErrorKind, InvokerStats, RunId, Timestamp};

/// Kind and message of a failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
}

impl From<&EntityError> for ErrorSummary {
    fn from(error: &EntityError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// How an entity's strategy ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The strategy completed without error.
    Succeeded,
    /// The strategy failed; the error is always present.
    Failed {
        /// What went wrong.
        error: ErrorSummary,
    },
    /// The entity was never attempted (abort policy or cancellation).
    Skipped,
}

/// The immutable result of processing one entity in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    entity: EntityName,
    #[serde(flatten)]
    status: OutcomeStatus,
    item_count: usize,
}

impl RunOutcome {
    /// A successful outcome covering `item_count` records.
    pub fn succeeded(entity: EntityName, item_count: usize) -> Self {
        Self {
            entity,
            status: OutcomeStatus::Succeeded,
            item_count,
        }
    }

    /// A failed outcome. `item_count` is the number of records processed
    /// before or despite the failure.
    pub fn failed(entity: EntityName, error: &EntityError) -> Self {
        Self {
            entity,
            status: OutcomeStatus::Failed {
                error: ErrorSummary::from(error),
            },
            item_count: error.processed(),
        }
    }

    /// An entity that was not attempted.
    pub fn skipped(entity: EntityName) -> Self {
        Self {
            entity,
            status: OutcomeStatus::Skipped,
            item_count: 0,
        }
    }

    /// The entity this outcome belongs to.
    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// How the entity ended.
    pub fn status(&self) -> &OutcomeStatus {
        &self.status
    }

    /// Records processed.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// The failure, present iff the outcome is Failed.
    pub fn error(&self) -> Option<&ErrorSummary> {
        match &self.status {
            OutcomeStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` for [`OutcomeStatus::Succeeded`].
    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }

    /// Returns `true` for [`OutcomeStatus::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Returns `true` for [`OutcomeStatus::Skipped`].
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every entity was processed (some may have failed).
    Completed,
    /// The abort policy or a cancellation stopped the run early.
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Save or restore.
    pub direction: Direction,
    /// Terminal state.
    pub state: RunState,
    /// One outcome per enabled entity, in processing order.
    pub outcomes: Vec<RunOutcome>,
    /// Invoker counters for the run.
    pub stats: InvokerStats,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run ended.
    pub finished_at: Timestamp,
}

impl RunReport {
    /// Outcomes that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_succeeded())
    }

    /// Outcomes that failed.
    pub fn failed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Outcomes that were skipped.
    pub fn skipped(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    /// `true` when the run completed and every entity succeeded.
    pub fn is_clean(&self) -> bool {
        self.state == RunState::Completed && self.outcomes.iter().all(RunOutcome::is_succeeded)
    }
}
