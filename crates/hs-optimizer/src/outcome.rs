//! Result of evaluating one trial.

use hs_types::{HsError, SchedulerError, SpaceError, TrackingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad cause of a pruned trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneKind {
    /// The assignment could not be applied to the base config.
    Resolution,
    Submission,
    /// Scheduler query or cancel failure.
    Scheduler,
    RunIdentifierNotFound,
    MetricNotFound,
    Timeout,
    /// The job failed or was cancelled outside the tuner.
    JobEnded,
    Tracking,
    Io,
    Other,
}

impl From<&HsError> for PruneKind {
    fn from(error: &HsError) -> Self {
        match error {
            HsError::Space(SpaceError::Resolution { .. })
            | HsError::Space(SpaceError::NotInSpace { .. })
            | HsError::Space(SpaceError::InvalidPath { .. }) => Self::Resolution,
            HsError::Space(_) => Self::Other,
            HsError::Scheduler(SchedulerError::Submission { .. }) => Self::Submission,
            HsError::Scheduler(SchedulerError::RunIdentifierNotFound { .. }) => {
                Self::RunIdentifierNotFound
            }
            HsError::Scheduler(SchedulerError::Timeout { .. }) => Self::Timeout,
            HsError::Scheduler(SchedulerError::JobEnded { .. }) => Self::JobEnded,
            HsError::Scheduler(_) => Self::Scheduler,
            HsError::Tracking(TrackingError::MetricNotFound { .. }) => Self::MetricNotFound,
            HsError::Tracking(_) => Self::Tracking,
            HsError::Io(_) | HsError::Yaml(_) | HsError::Serialization(_) => Self::Io,
            HsError::Config(_) => Self::Other,
        }
    }
}

/// Why a trial was pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneReason {
    pub kind: PruneKind,
    pub message: String,
}

impl From<&HsError> for PruneReason {
    fn from(error: &HsError) -> Self {
        Self {
            kind: error.into(),
            message: error.to_string(),
        }
    }
}

impl From<HsError> for PruneReason {
    fn from(error: HsError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for PruneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// What the search loop gets back for one trial: an objective value, or a
/// signal to prune it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrialOutcome {
    Value { value: f64 },
    Pruned { reason: PruneReason },
}

impl TrialOutcome {
    pub fn value(value: f64) -> Self {
        Self::Value { value }
    }

    pub fn pruned(reason: impl Into<PruneReason>) -> Self {
        Self::Pruned {
            reason: reason.into(),
        }
    }

    pub fn as_value(&self) -> Option<f64> {
        match self {
            Self::Value { value } => Some(*value),
            Self::Pruned { .. } => None,
        }
    }

    pub fn is_pruned(&self) -> bool {
        matches!(self, Self::Pruned { .. })
    }
}
