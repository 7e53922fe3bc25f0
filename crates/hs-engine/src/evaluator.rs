//! Evaluation of one trial end to end: materialize, launch, monitor, fetch.

use async_trait::async_trait;
use hs_optimizer::{Objective, TrialOutcome, TrialProposal};
use hs_scheduler::{JobLauncher, JobMonitor, MonitorConfig, Scheduler, TrialJob};
use hs_space::{materialize, ModelKind, ParameterSpace, StudyDir};
use hs_tracking::MetricsStore;
use hs_types::{parse_yaml, to_yaml, HsResult, SchedulerError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DEFAULT_METRIC_KEY;

/// Marker file written into every trial directory.
pub const TRIAL_MARKER_FILE: &str = "out.txt";

/// Trial name and job id as far as a trial got, for prune logging.
#[derive(Debug, Default)]
struct TrialProgress {
    name: Option<String>,
    job_id: Option<String>,
}

/// Binds a study directory, a scheduler and a metrics store into an
/// [`Objective`]. Every failure becomes [`TrialOutcome::Pruned`].
///
/// Trial artifacts (`{name}.yaml`, `{name}.sh`, `out.txt` and the scheduler
/// logs) are written to `{study_root}/{name}/` and left in place.
pub struct TrialEvaluator {
    model: ModelKind,
    study_root: PathBuf,
    base_config_path: PathBuf,
    space: ParameterSpace,
    launcher: JobLauncher,
    monitor: JobMonitor,
    metrics: Arc<dyn MetricsStore>,
    metric_key: String,
}

impl TrialEvaluator {
    pub fn new(
        study: &StudyDir,
        model: ModelKind,
        scheduler: Arc<dyn Scheduler>,
        metrics: Arc<dyn MetricsStore>,
        monitor_config: MonitorConfig,
    ) -> Self {
        Self {
            model,
            study_root: study.root.clone(),
            base_config_path: study.config_path(),
            space: study.report.space.clone(),
            launcher: JobLauncher::new(scheduler.clone(), study.script_path()),
            monitor: JobMonitor::new(scheduler, monitor_config),
            metrics,
            metric_key: DEFAULT_METRIC_KEY.to_string(),
        }
    }

    pub fn with_metric_key(mut self, key: impl Into<String>) -> Self {
        self.metric_key = key.into();
        self
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    async fn run_trial(
        &self,
        proposal: &TrialProposal,
        progress: &mut TrialProgress,
    ) -> HsResult<f64> {
        self.space.admits(&proposal.assignment)?;

        // Re-read per trial so edits between trials take effect.
        let base = parse_yaml(&tokio::fs::read_to_string(&self.base_config_path).await?)?;
        let trial = materialize(&base, &proposal.assignment, self.model, proposal.number)?;
        progress.name = Some(trial.name.clone());

        let trial_dir = self.study_root.join(&trial.name);
        tokio::fs::create_dir_all(&trial_dir).await?;
        tokio::fs::write(trial_dir.join(TRIAL_MARKER_FILE), "").await?;
        tokio::fs::write(
            trial_dir.join(format!("{}.yaml", trial.name)),
            to_yaml(&trial.config)?,
        )
        .await?;

        let handle = self.launcher.launch(&trial_dir, &trial.name).await?;
        progress.job_id = Some(handle.job_id.clone());

        let mut job = TrialJob::new(
            proposal.number,
            proposal.assignment.clone(),
            trial,
            handle.job_id.clone(),
        );
        let state = self.monitor.drive(&mut job, &handle).await?;
        if let Some(error) = job.terminal_error(self.monitor.config().timeout) {
            return Err(error.into());
        }

        let run = job
            .run
            .as_ref()
            .ok_or_else(|| SchedulerError::RunIdentifierNotFound {
                job_id: job.job_id.clone(),
            })?;
        let value = self
            .metrics
            .fetch_scalar(&run.entity, &run.project, &run.run_id, &self.metric_key)
            .await?;

        info!(
            trial = %job.name,
            job_id = %job.job_id,
            state = %state,
            run = %run,
            metric = %self.metric_key,
            value,
            "trial produced a result"
        );
        Ok(value)
    }
}

#[async_trait]
impl Objective for TrialEvaluator {
    async fn evaluate(&self, proposal: &TrialProposal) -> TrialOutcome {
        let mut progress = TrialProgress::default();
        match self.run_trial(proposal, &mut progress).await {
            Ok(value) => TrialOutcome::value(value),
            Err(error) => {
                warn!(
                    trial_number = proposal.number,
                    trial = progress.name.as_deref().unwrap_or("-"),
                    job_id = progress.job_id.as_deref().unwrap_or("-"),
                    error = %error,
                    "pruning trial"
                );
                TrialOutcome::pruned(&error)
            }
        }
    }
}
