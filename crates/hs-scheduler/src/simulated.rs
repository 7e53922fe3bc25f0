//! Simulated (in-process) scheduler for dry runs and tests.
//!
//! Jobs replay a scripted sequence of states, one per query, with the final
//! state repeating. On submission the scheduler reads the script's
//! `--job-name`, `--output` and `--error` directives and writes the scripted
//! log contents where a real cluster would, so the full launch / monitor path
//! can run without Slurm.

use async_trait::async_trait;
use hs_types::SchedulerError;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

use crate::scheduler::{JobId, Scheduler, SchedulerResult, SchedulerState};

static JOB_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#SBATCH\s+--job-name=(\S+)").expect("valid regex"));
static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#SBATCH\s+--output=(\S+)").expect("valid regex"));
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#SBATCH\s+--error=(\S+)").expect("valid regex"));

const FIRST_JOB_ID: u64 = 1000;

/// Scripted behaviour of one simulated job.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedJob {
    states: Vec<SchedulerState>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl SimulatedJob {
    /// A job that reports `states` in order, repeating the last one.
    pub fn new(states: Vec<SchedulerState>) -> Self {
        let states = if states.is_empty() {
            vec![SchedulerState::Pending]
        } else {
            states
        };
        Self {
            states,
            stdout: Some(String::new()),
            stderr: Some(String::new()),
        }
    }

    pub fn completing() -> Self {
        Self::new(vec![
            SchedulerState::Pending,
            SchedulerState::Running,
            SchedulerState::Completed,
        ])
    }

    pub fn failing() -> Self {
        Self::new(vec![SchedulerState::Running, SchedulerState::Failed])
    }

    /// Never leaves the running state.
    pub fn hanging() -> Self {
        Self::new(vec![SchedulerState::Running])
    }

    pub fn with_stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = Some(text.into());
        self
    }

    pub fn with_stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = Some(text.into());
        self
    }

    /// Append a tracking-service run URL line to stderr, the way the
    /// training script's logger announces its run.
    pub fn with_run_url(mut self, url: &str) -> Self {
        let stderr = self.stderr.get_or_insert_with(String::new);
        stderr.push_str(&format!("wandb: View run at {url}\n"));
        self
    }

    /// Do not write any log files.
    pub fn without_logs(mut self) -> Self {
        self.stdout = None;
        self.stderr = None;
        self
    }

    pub fn states(&self) -> &[SchedulerState] {
        &self.states
    }
}

impl Default for SimulatedJob {
    fn default() -> Self {
        Self::completing()
    }
}

#[derive(Debug)]
struct JobProgress {
    states: Vec<SchedulerState>,
    cursor: usize,
    cancelled: bool,
}

impl JobProgress {
    fn next_state(&mut self) -> SchedulerState {
        if self.cancelled {
            return SchedulerState::Cancelled;
        }
        let state = self.states[self.cursor];
        if self.cursor + 1 < self.states.len() {
            self.cursor += 1;
        }
        state
    }
}

#[derive(Debug)]
struct Inner {
    queued: VecDeque<SimulatedJob>,
    default_job: SimulatedJob,
    jobs: HashMap<JobId, JobProgress>,
    submitted: Vec<PathBuf>,
    queries: Vec<JobId>,
    cancelled: Vec<JobId>,
    next_id: u64,
}

/// In-process [`Scheduler`] with scripted job behaviour.
#[derive(Debug)]
pub struct SimulatedScheduler {
    inner: Mutex<Inner>,
    reject_submissions: bool,
    fail_cancels: bool,
}

impl SimulatedScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queued: VecDeque::new(),
                default_job: SimulatedJob::default(),
                jobs: HashMap::new(),
                submitted: Vec::new(),
                queries: Vec::new(),
                cancelled: Vec::new(),
                next_id: FIRST_JOB_ID,
            }),
            reject_submissions: false,
            fail_cancels: false,
        }
    }

    /// Queue the behaviour of the next submitted job. Jobs are consumed in
    /// submission order; once the queue is empty the default job is used.
    pub fn with_job(self, job: SimulatedJob) -> Self {
        self.inner.lock().queued.push_back(job);
        self
    }

    pub fn with_default_job(self, job: SimulatedJob) -> Self {
        self.inner.lock().default_job = job;
        self
    }

    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    pub fn failing_cancels(mut self) -> Self {
        self.fail_cancels = true;
        self
    }

    /// Scripts submitted so far, in order.
    pub fn submitted(&self) -> Vec<PathBuf> {
        self.inner.lock().submitted.clone()
    }

    /// Job ids passed to `cancel`, in order (including failed attempts).
    pub fn cancelled(&self) -> Vec<JobId> {
        self.inner.lock().cancelled.clone()
    }

    /// Number of state queries made for `job_id`.
    pub fn query_count(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .queries
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }
}

impl Default for SimulatedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn directive(re: &Regex, script: &str) -> Option<String> {
    re.captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn expand_log_pattern(pattern: &str, job_name: &str, job_id: &str) -> PathBuf {
    PathBuf::from(pattern.replace("%x", job_name).replace("%j", job_id))
}

async fn write_log(path: &Path, contents: &str) -> SchedulerResult<()> {
    let io_err = |e: std::io::Error| SchedulerError::Submission {
        message: format!("failed to write {}: {e}", path.display()),
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, contents).await.map_err(io_err)
}

#[async_trait]
impl Scheduler for SimulatedScheduler {
    async fn submit(&self, script_path: &Path) -> SchedulerResult<JobId> {
        if self.reject_submissions {
            return Err(SchedulerError::Submission {
                message: "simulated scheduler rejects submissions".to_string(),
            });
        }

        let script = tokio::fs::read_to_string(script_path)
            .await
            .map_err(|e| SchedulerError::Submission {
                message: format!("cannot read {}: {e}", script_path.display()),
            })?;

        let (job_id, job) = {
            let mut inner = self.inner.lock();
            let job = inner
                .queued
                .pop_front()
                .unwrap_or_else(|| inner.default_job.clone());
            let job_id = inner.next_id.to_string();
            inner.next_id += 1;
            inner.submitted.push(script_path.to_path_buf());
            inner.jobs.insert(
                job_id.clone(),
                JobProgress {
                    states: job.states.clone(),
                    cursor: 0,
                    cancelled: false,
                },
            );
            (job_id, job)
        };

        let job_name = directive(&JOB_NAME_RE, &script).unwrap_or_else(|| "job".to_string());
        if let (Some(pattern), Some(contents)) = (directive(&OUTPUT_RE, &script), &job.stdout) {
            write_log(&expand_log_pattern(&pattern, &job_name, &job_id), contents).await?;
        }
        if let (Some(pattern), Some(contents)) = (directive(&ERROR_RE, &script), &job.stderr) {
            write_log(&expand_log_pattern(&pattern, &job_name, &job_id), contents).await?;
        }

        info!(job_id = %job_id, job_name = %job_name, "simulated job submitted");
        Ok(job_id)
    }

    async fn query_state(&self, job_id: &str) -> SchedulerResult<SchedulerState> {
        let mut inner = self.inner.lock();
        inner.queries.push(job_id.to_string());
        inner
            .jobs
            .get_mut(job_id)
            .map(JobProgress::next_state)
            .ok_or_else(|| SchedulerError::Query {
                job_id: job_id.to_string(),
                message: "unknown job".to_string(),
            })
    }

    async fn cancel(&self, job_id: &str) -> SchedulerResult<()> {
        let mut inner = self.inner.lock();
        inner.cancelled.push(job_id.to_string());
        if self.fail_cancels {
            return Err(SchedulerError::Cancel {
                job_id: job_id.to_string(),
                message: "simulated cancel failure".to_string(),
            });
        }
        match inner.jobs.get_mut(job_id) {
            Some(progress) => {
                progress.cancelled = true;
                info!(job_id = %job_id, "simulated job cancelled");
                Ok(())
            }
            None => Err(SchedulerError::Cancel {
                job_id: job_id.to_string(),
                message: "unknown job".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
