//! Trial tracking and study run management.

use chrono::{DateTime, Utc};
use hs_space::Assignment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outcome::{PruneReason, TrialOutcome};
use crate::search::StrategyKind;

/// Unique study identifier.
pub type StudyId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    Maximize,
    #[default]
    Minimize,
}

impl ObjectiveDirection {
    /// Whether `candidate` beats `incumbent` in this direction.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// Top-level configuration for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub id: StudyId,
    pub name: String,

    /// Maximum number of trials to run.
    pub n_trials: usize,

    pub direction: ObjectiveDirection,

    pub strategy: StrategyKind,

    /// Seed for random search; `None` draws one from the OS.
    pub seed: Option<u64>,

    pub created_at: DateTime<Utc>,
}

impl StudyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            n_trials: 100,
            direction: ObjectiveDirection::Minimize,
            strategy: StrategyKind::Grid,
            seed: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Lifecycle state for a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyState {
    Pending,
    Running,
    Completed,
}

/// Aggregate status of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyStatus {
    pub id: StudyId,
    pub direction: ObjectiveDirection,
    pub state: StudyState,
    pub trials_completed: usize,
    pub trials_pruned: usize,
    pub best_trial: Option<Trial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StudyStatus {
    pub fn new(config: &StudyConfig) -> Self {
        Self {
            id: config.id,
            direction: config.direction,
            state: StudyState::Pending,
            trials_completed: 0,
            trials_pruned: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = StudyState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = StudyState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Count a finished trial and keep it as best if its value improves on
    /// the current best.
    pub fn record(&mut self, trial: &Trial) {
        match trial.status {
            TrialStatus::Completed => self.trials_completed += 1,
            TrialStatus::Pruned => self.trials_pruned += 1,
            TrialStatus::Pending | TrialStatus::Running => return,
        }
        self.update_best(trial);
    }

    /// Update the best trial if `trial` improves on the current best.
    pub fn update_best(&mut self, trial: &Trial) {
        let Some(value) = trial.value else {
            return;
        };
        let dominated = match self.best_trial.as_ref().and_then(|best| best.value) {
            None => true,
            Some(best) => self.direction.improves(value, best),
        };
        if dominated {
            self.best_trial = Some(trial.clone());
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial.as_ref().and_then(|t| t.value)
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial (one assignment evaluated via a training job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub study_id: StudyId,
    pub number: usize,
    pub assignment: Assignment,
    pub status: TrialStatus,
    pub value: Option<f64>,
    pub prune_reason: Option<PruneReason>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(study_id: StudyId, number: usize, assignment: Assignment) -> Self {
        Self {
            id: Uuid::new_v4(),
            study_id,
            number,
            assignment,
            status: TrialStatus::Pending,
            value: None,
            prune_reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, value: f64) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.value = Some(value);
    }

    pub fn mark_pruned(&mut self, reason: PruneReason) {
        self.status = TrialStatus::Pruned;
        self.finished_at = Some(Utc::now());
        self.prune_reason = Some(reason);
    }

    pub fn finish(&mut self, outcome: TrialOutcome) {
        match outcome {
            TrialOutcome::Value { value } => self.mark_completed(value),
            TrialOutcome::Pruned { reason } => self.mark_pruned(reason),
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_seconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Pruned,
}
