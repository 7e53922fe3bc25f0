//! Batch scheduler abstraction.

use async_trait::async_trait;
use hs_types::SchedulerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Scheduler-assigned job identifier.
pub type JobId = String;

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Job state as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SchedulerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Core scheduler interface.
///
/// Implementations may drive a real batch system (see
/// [`super::slurm::SlurmScheduler`]) or simulate one in-process (see
/// [`super::simulated::SimulatedScheduler`]).
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit a batch script. Returns the scheduler-assigned job id.
    async fn submit(&self, script_path: &Path) -> SchedulerResult<JobId>;

    /// Query the current state of a job.
    async fn query_state(&self, job_id: &str) -> SchedulerResult<SchedulerState>;

    /// Request cancellation of a job.
    async fn cancel(&self, job_id: &str) -> SchedulerResult<()>;

    /// Human-readable scheduler name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SchedulerState::Completed.is_terminal());
        assert!(SchedulerState::Failed.is_terminal());
        assert!(SchedulerState::Cancelled.is_terminal());
        assert!(!SchedulerState::Pending.is_terminal());
        assert!(!SchedulerState::Running.is_terminal());
    }
}
