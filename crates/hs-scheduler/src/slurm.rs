//! Slurm adapter built on the `sbatch`, `sacct` and `scancel` commands.

use async_trait::async_trait;
use hs_types::SchedulerError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::scheduler::{JobId, Scheduler, SchedulerResult, SchedulerState};

static SUBMITTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job (\d+)").expect("valid regex"));

/// Commands used to talk to Slurm. Each value is split on whitespace into a
/// program and leading arguments, so wrappers such as `ssh login-node sbatch`
/// and site-specific paths both work. Arguments containing spaces are not
/// supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlurmConfig {
    pub sbatch: String,
    pub sacct: String,
    pub scancel: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            sacct: "sacct".to_string(),
            scancel: "scancel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlurmScheduler {
    config: SlurmConfig,
}

impl SlurmScheduler {
    pub fn new(config: SlurmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlurmConfig {
        &self.config
    }
}

/// Extract the job id from `sbatch` output.
pub fn parse_submission(output: &str) -> SchedulerResult<JobId> {
    SUBMITTED_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SchedulerError::Submission {
            message: format!("sbatch did not report a job id: {}", output.trim()),
        })
}

/// Map the first `sacct --format=State` token to a scheduler state. No
/// output means the job is not in accounting yet.
pub fn parse_sacct_state(output: &str) -> SchedulerState {
    let Some(token) = output.split_whitespace().next() else {
        return SchedulerState::Pending;
    };
    match token.trim_end_matches('+') {
        "COMPLETED" => SchedulerState::Completed,
        "CANCELLED" => SchedulerState::Cancelled,
        "FAILED" | "TIMEOUT" | "OUT_OF_MEMORY" | "NODE_FAIL" | "PREEMPTED" | "BOOT_FAIL"
        | "DEADLINE" => SchedulerState::Failed,
        "RUNNING" | "COMPLETING" | "SUSPENDED" | "STOPPED" | "RESIZING" | "REQUEUED"
        | "SIGNALING" | "STAGE_OUT" => SchedulerState::Running,
        _ => SchedulerState::Pending,
    }
}

/// Split a configured command into its program and leading arguments.
fn split_command(command: &str) -> std::io::Result<(&str, Vec<&str>)> {
    let mut words = command.split_whitespace();
    let program = words.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;
    Ok((program, words.collect()))
}

async fn run(command: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
    let (program, prefix) = split_command(command)?;
    Command::new(program).args(prefix).args(args).output().await
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    async fn submit(&self, script_path: &Path) -> SchedulerResult<JobId> {
        let script = script_path.to_string_lossy();
        let output = run(&self.config.sbatch, &[&*script])
            .await
            .map_err(|e| SchedulerError::Submission {
                message: format!("failed to run {}: {e}", self.config.sbatch),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let job_id = parse_submission(&combined)?;

        info!(job_id = %job_id, script = %script, "submitted batch job");
        Ok(job_id)
    }

    async fn query_state(&self, job_id: &str) -> SchedulerResult<SchedulerState> {
        let output = run(
            &self.config.sacct,
            &["--jobs", job_id, "--format=State", "--noheader"],
        )
        .await
        .map_err(|e| SchedulerError::Query {
            job_id: job_id.to_string(),
            message: format!("failed to run {}: {e}", self.config.sacct),
        })?;

        if !output.status.success() {
            return Err(SchedulerError::Query {
                job_id: job_id.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let state = parse_sacct_state(&String::from_utf8_lossy(&output.stdout));
        debug!(job_id = %job_id, state = %state, "queried job state");
        Ok(state)
    }

    async fn cancel(&self, job_id: &str) -> SchedulerResult<()> {
        let output = run(&self.config.scancel, &[job_id])
            .await
            .map_err(|e| SchedulerError::Cancel {
                job_id: job_id.to_string(),
                message: format!("failed to run {}: {e}", self.config.scancel),
            })?;

        if !output.status.success() {
            return Err(SchedulerError::Cancel {
                job_id: job_id.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(job_id = %job_id, "cancelled batch job");
        Ok(())
    }

    fn name(&self) -> &str {
        "slurm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sbatch_output() {
        assert_eq!(
            parse_submission("Submitted batch job 123456\n").unwrap(),
            "123456"
        );
        assert!(matches!(
            parse_submission("sbatch: error: Batch job submission failed: Invalid account"),
            Err(SchedulerError::Submission { .. })
        ));
    }

    #[test]
    fn parses_sacct_states() {
        assert_eq!(parse_sacct_state(""), SchedulerState::Pending);
        assert_eq!(parse_sacct_state("   PENDING \n"), SchedulerState::Pending);
        assert_eq!(
            parse_sacct_state("   RUNNING \n   RUNNING \n"),
            SchedulerState::Running
        );
        assert_eq!(
            parse_sacct_state(" COMPLETED \n COMPLETED \n"),
            SchedulerState::Completed
        );
        assert_eq!(
            parse_sacct_state(" CANCELLED by 1000 \n"),
            SchedulerState::Cancelled
        );
        assert_eq!(parse_sacct_state(" CANCELLED+ \n"), SchedulerState::Cancelled);
        assert_eq!(parse_sacct_state(" OUT_OF_MEMORY \n"), SchedulerState::Failed);
        assert_eq!(parse_sacct_state(" TIMEOUT \n"), SchedulerState::Failed);
    }

    #[tokio::test]
    async fn missing_sbatch_binary_is_a_submission_error() {
        let scheduler = SlurmScheduler::new(SlurmConfig {
            sbatch: "/nonexistent/sbatch".to_string(),
            ..SlurmConfig::default()
        });
        let result = scheduler.submit(Path::new("job.sh")).await;
        assert!(matches!(result, Err(SchedulerError::Submission { .. })));
    }

    #[test]
    fn splits_wrapped_commands() {
        let (program, args) = split_command("ssh login-node  sbatch").unwrap();
        assert_eq!(program, "ssh");
        assert_eq!(args, vec!["login-node", "sbatch"]);

        let (program, args) = split_command("/opt/slurm/bin/sacct").unwrap();
        assert_eq!(program, "/opt/slurm/bin/sacct");
        assert!(args.is_empty());

        assert!(split_command("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multi_word_command_runs_with_its_arguments() {
        let scheduler = SlurmScheduler::new(SlurmConfig {
            sbatch: "echo Submitted batch job 4242".to_string(),
            ..SlurmConfig::default()
        });
        let job_id = scheduler.submit(Path::new("job.sh")).await.unwrap();
        assert_eq!(job_id, "4242");
    }
}
