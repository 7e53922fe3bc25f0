//! The study loop: propose, evaluate, record.

use async_trait::async_trait;
use hs_space::{Assignment, ParameterSpace};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::outcome::TrialOutcome;
use crate::search::{build_strategy, SearchStrategy};
use crate::trial::{StudyConfig, StudyStatus, Trial};

/// One proposed trial: its ordinal within the study and the values to try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialProposal {
    pub number: usize,
    pub assignment: Assignment,
}

/// Evaluates a proposal. Implementations must not fail: every error is
/// reported as [`TrialOutcome::Pruned`].
#[async_trait]
pub trait Objective: Send + Sync {
    async fn evaluate(&self, proposal: &TrialProposal) -> TrialOutcome;
}

/// A sequential hyperparameter study over a fixed parameter space.
pub struct Study {
    config: StudyConfig,
    strategy: Box<dyn SearchStrategy>,
    trials: Vec<Trial>,
    status: StudyStatus,
}

impl Study {
    pub fn new(config: StudyConfig, space: ParameterSpace) -> Self {
        let strategy = build_strategy(config.strategy, space, config.seed);
        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(config: StudyConfig, strategy: Box<dyn SearchStrategy>) -> Self {
        let status = StudyStatus::new(&config);
        Self {
            config,
            strategy,
            trials: Vec::new(),
            status,
        }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn status(&self) -> &StudyStatus {
        &self.status
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn best_trial(&self) -> Option<&Trial> {
        self.status.best_trial.as_ref()
    }

    /// Run trials one at a time until `n_trials` have finished or the
    /// strategy runs out of proposals.
    pub async fn optimize(&mut self, objective: &dyn Objective) -> &StudyStatus {
        self.status.mark_running();
        info!(
            study = %self.config.name,
            strategy = self.strategy.name(),
            n_trials = self.config.n_trials,
            direction = ?self.config.direction,
            "starting study"
        );

        while self.trials.len() < self.config.n_trials {
            let Some(assignment) = self.strategy.suggest(1).into_iter().next() else {
                info!(
                    study = %self.config.name,
                    trials = self.trials.len(),
                    "search space exhausted"
                );
                break;
            };

            let number = self.trials.len();
            let mut trial = Trial::new(self.config.id, number, assignment.clone());
            trial.mark_running();

            let proposal = TrialProposal { number, assignment };
            let outcome = objective.evaluate(&proposal).await;
            self.strategy.report(&proposal.assignment, &outcome);

            match &outcome {
                TrialOutcome::Value { value } => {
                    info!(study = %self.config.name, trial = number, value, "trial completed")
                }
                TrialOutcome::Pruned { reason } => {
                    warn!(
                        study = %self.config.name,
                        trial = number,
                        reason = %reason,
                        "trial pruned"
                    )
                }
            }

            trial.finish(outcome);
            self.status.record(&trial);
            self.trials.push(trial);
        }

        self.status.mark_completed();
        info!(
            study = %self.config.name,
            completed = self.status.trials_completed,
            pruned = self.status.trials_pruned,
            best = ?self.status.best_value(),
            "study finished"
        );
        &self.status
    }
}
