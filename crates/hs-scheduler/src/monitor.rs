//! Per-trial job lifecycle: waits for the job's logs, discovers the
//! tracking-service run identifier and polls the scheduler until the job
//! reaches a terminal state or exceeds its time budget.

use hs_space::{Assignment, MaterializedTrial};
use hs_types::{ConfigNode, HsResult, SchedulerError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::launcher::JobHandle;
use crate::scheduler::{JobId, Scheduler, SchedulerState};

static RUN_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://([^/\s]+)/([^/\s]+)/([^/\s]+)/runs/([^/\s]+)").expect("valid regex")
});

/// Polling cadence and time budget for a trial job.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Delay between scheduler polls once the job is running.
    pub poll_interval: Duration,
    /// Delay between checks for the job's stdout log.
    pub log_wait_interval: Duration,
    /// Budget measured from submission.
    pub timeout: Duration,
    /// Apply the budget while waiting for the stdout log to appear.
    pub bound_log_wait: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            log_wait_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10 * 60 * 60),
            bound_log_wait: true,
        }
    }
}

impl MonitorConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_log_wait_interval(mut self, interval: Duration) -> Self {
        self.log_wait_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bound_log_wait(mut self, bound: bool) -> Self {
        self.bound_log_wait = bound;
        self
    }
}

/// Run coordinates parsed from a tracking-service URL of the form
/// `https://<host>/<entity>/<project>/runs/<run_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentifier {
    pub host: String,
    pub entity: String,
    pub project: String,
    pub run_id: String,
}

impl RunIdentifier {
    /// First run URL anywhere in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        let caps = RUN_URL_RE.captures(text)?;
        Some(Self {
            host: caps[1].to_string(),
            entity: caps[2].to_string(),
            project: caps[3].to_string(),
            run_id: caps[4].to_string(),
        })
    }

    pub fn url(&self) -> String {
        format!(
            "https://{}/{}/{}/runs/{}",
            self.host, self.entity, self.project, self.run_id
        )
    }
}

impl fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity, self.project, self.run_id)
    }
}

/// Lifecycle state of a trial job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Submitted; the scheduler has not created the stdout log yet.
    Submitted,
    /// Running, run identifier not seen yet.
    RunningUnlogged,
    /// Running with a known run identifier.
    RunningLogged,
    Completed,
    Failed,
    Cancelled,
    /// Budget exceeded; cancellation was requested.
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match self {
            Submitted => matches!(next, RunningUnlogged | TimedOut),
            RunningUnlogged => matches!(
                next,
                RunningLogged | Completed | Failed | Cancelled | TimedOut
            ),
            RunningLogged => matches!(next, Completed | Failed | Cancelled | TimedOut),
            Completed | Failed | Cancelled | TimedOut => false,
        }
    }

    fn from_scheduler(state: SchedulerState) -> Option<Self> {
        match state {
            SchedulerState::Completed => Some(Self::Completed),
            SchedulerState::Failed => Some(Self::Failed),
            SchedulerState::Cancelled => Some(Self::Cancelled),
            SchedulerState::Pending | SchedulerState::Running => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One submitted trial and everything known about it.
#[derive(Debug, Clone)]
pub struct TrialJob {
    pub ordinal: usize,
    pub assignment: Assignment,
    pub config: ConfigNode,
    pub name: String,
    pub job_id: JobId,
    pub run: Option<RunIdentifier>,
    state: JobState,
    submitted_at: Instant,
}

impl TrialJob {
    /// Track a job that was just submitted for `trial`.
    pub fn new(
        ordinal: usize,
        assignment: Assignment,
        trial: MaterializedTrial,
        job_id: impl Into<JobId>,
    ) -> Self {
        Self {
            ordinal,
            assignment,
            config: trial.config,
            name: trial.name,
            job_id: job_id.into(),
            run: None,
            state: JobState::Submitted,
            submitted_at: Instant::now(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Move to `next`, rejecting moves the lifecycle does not allow.
    pub fn advance(&mut self, next: JobState) -> Result<(), SchedulerError> {
        if !self.state.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(
            trial = %self.name,
            job_id = %self.job_id,
            from = %self.state,
            to = %next,
            "job state changed"
        );
        self.state = next;
        Ok(())
    }

    /// Error describing why a non-successful terminal state produced no
    /// result. `None` for `Completed` and for non-terminal states.
    pub fn terminal_error(&self, timeout: Duration) -> Option<SchedulerError> {
        match self.state {
            JobState::TimedOut => Some(SchedulerError::Timeout {
                job_id: self.job_id.clone(),
                timeout_seconds: timeout.as_secs(),
            }),
            JobState::Failed | JobState::Cancelled => Some(SchedulerError::JobEnded {
                job_id: self.job_id.clone(),
                state: self.state.to_string(),
            }),
            _ => None,
        }
    }
}

/// Drives a [`TrialJob`] through its lifecycle by polling the scheduler and
/// the job's log files.
pub struct JobMonitor {
    scheduler: Arc<dyn Scheduler>,
    config: MonitorConfig,
}

impl JobMonitor {
    pub fn new(scheduler: Arc<dyn Scheduler>, config: MonitorConfig) -> Self {
        Self { scheduler, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Poll until `job` reaches a terminal state and return it.
    ///
    /// Scheduler query failures are returned as errors without cancelling
    /// the job. A timeout too large to represent as an instant means the job
    /// is never timed out.
    pub async fn drive(&self, job: &mut TrialJob, handle: &JobHandle) -> HsResult<JobState> {
        let deadline = job.submitted_at.checked_add(self.config.timeout);
        let past_deadline = || deadline.is_some_and(|d| Instant::now() >= d);

        while job.state() == JobState::Submitted {
            if self.config.bound_log_wait && past_deadline() {
                self.time_out(job).await?;
                return Ok(job.state());
            }
            if tokio::fs::try_exists(&handle.stdout_log)
                .await
                .unwrap_or(false)
            {
                job.advance(JobState::RunningUnlogged)?;
                break;
            }
            sleep(self.config.log_wait_interval).await;
        }

        let mut run_log = RunLogScanner::new(&handle.stderr_log);
        loop {
            if past_deadline() {
                self.time_out(job).await?;
                return Ok(job.state());
            }

            if job.run.is_none() {
                if let Some(run) = run_log.scan().await {
                    info!(
                        trial = %job.name,
                        job_id = %job.job_id,
                        run = %run.url(),
                        "found tracking run"
                    );
                    job.run = Some(run);
                    job.advance(JobState::RunningLogged)?;
                }
            }

            let state = self.scheduler.query_state(&job.job_id).await?;
            if let Some(terminal) = JobState::from_scheduler(state) {
                job.advance(terminal)?;
                info!(trial = %job.name, job_id = %job.job_id, state = %terminal, "job finished");
                return Ok(terminal);
            }

            sleep(self.config.poll_interval).await;
        }
    }

    async fn time_out(&self, job: &mut TrialJob) -> HsResult<()> {
        warn!(
            trial = %job.name,
            job_id = %job.job_id,
            timeout_secs = self.config.timeout.as_secs(),
            "job exceeded its time budget, cancelling"
        );
        if let Err(e) = self.scheduler.cancel(&job.job_id).await {
            warn!(job_id = %job.job_id, error = %e, "cancel request failed");
        }
        job.advance(JobState::TimedOut)?;
        Ok(())
    }
}

/// Incremental reader of a job's stderr log. Each scan reads only the bytes
/// appended since the previous one and keeps the trailing partial line, so a
/// URL split across two writes is still found.
#[derive(Debug)]
struct RunLogScanner {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl RunLogScanner {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            offset: 0,
            pending: Vec::new(),
        }
    }

    async fn scan(&mut self) -> Option<RunIdentifier> {
        let mut file = tokio::fs::File::open(&self.path).await.ok()?;
        file.seek(SeekFrom::Start(self.offset)).await.ok()?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended).await.ok()?;
        if appended.is_empty() {
            return None;
        }
        self.offset += appended.len() as u64;
        self.pending.extend_from_slice(&appended);

        let found = RunIdentifier::find_in(&String::from_utf8_lossy(&self.pending));
        if found.is_none() {
            if let Some(newline) = self.pending.iter().rposition(|&b| b == b'\n') {
                self.pending.drain(..=newline);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::JobLauncher;
    use crate::simulated::{SimulatedJob, SimulatedScheduler};
    use serde_json::json;

    const TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name=x
#SBATCH --output=x.out
#SBATCH --error=x.err
config_path=\"\"
temp_path=\"\"
";

    const RUN_URL: &str = "https://wandb.ai/acme/mlip/runs/r1x2y3";

    fn fast_config() -> MonitorConfig {
        MonitorConfig::default()
            .with_poll_interval(Duration::from_secs(2))
            .with_log_wait_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60))
    }

    async fn submit(dir: &Path, scheduler: Arc<SimulatedScheduler>) -> (TrialJob, JobHandle) {
        let template = dir.join("job.sh");
        tokio::fs::write(&template, TEMPLATE).await.unwrap();
        let launcher = JobLauncher::new(scheduler, &template);
        let handle = launcher.launch(dir, "Mace_0_lr_0.1").await.unwrap();
        let trial = MaterializedTrial {
            name: "Mace_0_lr_0.1".to_string(),
            config: json!({"lr": 0.1}),
        };
        let job = TrialJob::new(0, Assignment::new(), trial, handle.job_id.clone());
        (job, handle)
    }

    #[test]
    fn finds_run_identifier_anywhere_in_text() {
        let text = "wandb: Syncing run fiery-lake-7\n\
                    wandb: 🚀 View run at https://wandb.ai/acme/mlip/runs/r1x2y3\nmore";
        let run = RunIdentifier::find_in(text).unwrap();
        assert_eq!(run.host, "wandb.ai");
        assert_eq!(run.entity, "acme");
        assert_eq!(run.project, "mlip");
        assert_eq!(run.run_id, "r1x2y3");
        assert_eq!(run.url(), RUN_URL);
        assert_eq!(run.to_string(), "acme/mlip/r1x2y3");

        assert!(RunIdentifier::find_in("https://wandb.ai/acme/mlip").is_none());
        assert!(RunIdentifier::find_in("").is_none());
    }

    #[test]
    fn transition_table() {
        use JobState::*;
        assert!(Submitted.can_transition_to(RunningUnlogged));
        assert!(Submitted.can_transition_to(TimedOut));
        assert!(!Submitted.can_transition_to(Completed));
        assert!(RunningUnlogged.can_transition_to(RunningLogged));
        assert!(RunningUnlogged.can_transition_to(Failed));
        assert!(RunningLogged.can_transition_to(Completed));
        assert!(!RunningLogged.can_transition_to(RunningUnlogged));
        for terminal in [Completed, Failed, Cancelled, TimedOut] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(RunningLogged));
        }
    }

    #[test]
    fn invalid_advance_is_rejected() {
        let trial = MaterializedTrial {
            name: "t".to_string(),
            config: json!({}),
        };
        let mut job = TrialJob::new(0, Assignment::new(), trial, "7");
        let err = job.advance(JobState::Completed).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
        assert_eq!(job.state(), JobState::Submitted);
        assert!(job.terminal_error(Duration::from_secs(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_with_run_url() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::completing().with_run_url(RUN_URL)),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::Completed);
        assert_eq!(job.run.as_ref().unwrap().run_id, "r1x2y3");
        assert_eq!(scheduler.query_count(&job.job_id), 3);
        assert!(scheduler.cancelled().is_empty());
        assert!(job.terminal_error(monitor.config().timeout).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_without_run_url() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(SimulatedScheduler::new().with_job(SimulatedJob::failing()));
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::Failed);
        assert!(job.run.is_none());
        assert!(matches!(
            job.terminal_error(monitor.config().timeout),
            Some(SchedulerError::JobEnded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_job_is_cancelled_exactly_once() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::hanging().with_run_url(RUN_URL)),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::TimedOut);
        assert_eq!(scheduler.cancelled(), vec![job.job_id.clone()]);
        assert!(job.submitted_at().elapsed() >= Duration::from_secs(60));
        assert!(job.run.is_some());
        assert!(matches!(
            job.terminal_error(monitor.config().timeout),
            Some(SchedulerError::Timeout {
                timeout_seconds: 60,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cancel_still_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            SimulatedScheduler::new()
                .with_job(SimulatedJob::hanging())
                .failing_cancels(),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::TimedOut);
        assert_eq!(scheduler.cancelled().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_stdout_log_is_bounded_by_deadline() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::hanging().without_logs()),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::TimedOut);
        assert_eq!(scheduler.cancelled().len(), 1);
        assert_eq!(scheduler.query_count(&job.job_id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_propagates_without_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(SimulatedScheduler::new().with_job(SimulatedJob::hanging()));
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;
        job.job_id = "unknown".to_string();

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let result = monitor.drive(&mut job, &handle).await;

        assert!(matches!(
            result,
            Err(hs_types::HsError::Scheduler(SchedulerError::Query { .. }))
        ));
        assert!(scheduler.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_never_expires() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::completing().with_run_url(RUN_URL)),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let config = fast_config().with_timeout(Duration::from_secs(i64::MAX as u64));
        let monitor = JobMonitor::new(scheduler.clone(), config);
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::Completed);
        assert!(scheduler.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_identifier_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let mut states = vec![SchedulerState::Running; 5];
        states.push(SchedulerState::Completed);
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::new(states).with_run_url(RUN_URL)),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;
        let monitor = JobMonitor::new(scheduler.clone(), fast_config());

        let rewrite_log = async {
            sleep(Duration::from_secs(3)).await;
            tokio::fs::write(
                &handle.stderr_log,
                "wandb: View run at https://wandb.ai/other/elsewhere/runs/zzz999\n",
            )
            .await
            .unwrap();
        };
        let (state, ()) = tokio::join!(monitor.drive(&mut job, &handle), rewrite_log);

        assert_eq!(state.unwrap(), JobState::Completed);
        let run = job.run.as_ref().unwrap();
        assert_eq!(run.run_id, "r1x2y3");
        assert_eq!(run.entity, "acme");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_over_completion_seen_late() {
        let tmp = tempfile::tempdir().unwrap();
        // Polls land at 0s, 2s, ..., 58s; the 31st would report completion.
        let mut states = vec![SchedulerState::Running; 30];
        states.push(SchedulerState::Completed);
        let scheduler = Arc::new(
            SimulatedScheduler::new().with_job(SimulatedJob::new(states).with_run_url(RUN_URL)),
        );
        let (mut job, handle) = submit(tmp.path(), scheduler.clone()).await;

        let monitor = JobMonitor::new(scheduler.clone(), fast_config());
        let state = monitor.drive(&mut job, &handle).await.unwrap();

        assert_eq!(state, JobState::TimedOut);
        assert_eq!(scheduler.cancelled(), vec![job.job_id.clone()]);
        assert_eq!(scheduler.query_count(&job.job_id), 30);
    }

    #[tokio::test]
    async fn run_log_scanner_reads_only_appended_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("trial.err");
        tokio::fs::write(&log, "epoch 1\nwandb: View run at https://wan")
            .await
            .unwrap();

        let mut scanner = RunLogScanner::new(&log);
        assert!(scanner.scan().await.is_none());
        assert_eq!(scanner.pending, b"wandb: View run at https://wan");

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&log)
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut file, b"db.ai/acme/mlip/runs/r9\n")
            .await
            .unwrap();
        drop(file);

        let run = scanner.scan().await.unwrap();
        assert_eq!(run.run_id, "r9");
        assert_eq!(scanner.offset, tokio::fs::metadata(&log).await.unwrap().len());
        assert!(RunLogScanner::new(&tmp.path().join("missing.err")).scan().await.is_none());
    }
}
