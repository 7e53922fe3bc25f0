//! Batch script rendering and job submission.

use hs_types::HsResult;
use regex::{Captures, NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::info;

use crate::scheduler::{JobId, Scheduler};

/// Directory (inside the trial directory) that receives scheduler logs.
pub const DEFAULT_LOGS_DIR: &str = "logs";

static JOB_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#SBATCH\s+--job-name=).*$").expect("valid regex"));
static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#SBATCH\s+--output=).*$").expect("valid regex"));
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#SBATCH\s+--error=).*$").expect("valid regex"));
static CONFIG_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^config_path.*$").expect("valid regex"));
static TEMP_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^temp_path.*$").expect("valid regex"));

/// Per-trial values substituted into the job script template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFields {
    pub job_name: String,
    pub trial_dir: PathBuf,
    pub logs_dir: String,
}

impl ScriptFields {
    pub fn new(job_name: impl Into<String>, trial_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            trial_dir: trial_dir.into(),
            logs_dir: DEFAULT_LOGS_DIR.to_string(),
        }
    }

    /// `{trial_dir}/{logs_dir}/{job_name}`
    pub fn log_dir(&self) -> PathBuf {
        self.trial_dir.join(&self.logs_dir).join(&self.job_name)
    }

    /// Where the scheduler writes stdout for `job_id` (`%x-%j.out`).
    pub fn stdout_log(&self, job_id: &str) -> PathBuf {
        self.log_dir().join(format!("{}-{job_id}.out", self.job_name))
    }

    /// Where the scheduler writes stderr for `job_id` (`%x-%j.err`).
    pub fn stderr_log(&self, job_id: &str) -> PathBuf {
        self.log_dir().join(format!("{}-{job_id}.err", self.job_name))
    }

    fn trial_dir_display(&self) -> String {
        let dir = self.trial_dir.strip_prefix(".").unwrap_or(&self.trial_dir);
        dir.display().to_string()
    }
}

/// Rewrite the job-name, output and error directives and the `config_path`
/// / `temp_path` variables of a job script. Each matching line is replaced
/// wholesale; everything else is left untouched.
pub fn render_script(template: &str, fields: &ScriptFields) -> String {
    let log_dir = fields.log_dir();
    let output = format!("{}/%x-%j.out", log_dir.display());
    let error = format!("{}/%x-%j.err", log_dir.display());

    let rendered = replace_directive(&JOB_NAME_RE, template, &fields.job_name);
    let rendered = replace_directive(&OUTPUT_RE, &rendered, &output);
    let rendered = replace_directive(&ERROR_RE, &rendered, &error);

    let config_line = format!("config_path=\"{}\"", fields.trial_dir_display());
    let temp_line = format!("temp_path=\"{}.yaml\"", fields.job_name);
    let rendered = CONFIG_PATH_RE.replace_all(&rendered, NoExpand(&config_line));
    TEMP_PATH_RE
        .replace_all(&rendered, NoExpand(&temp_line))
        .into_owned()
}

fn replace_directive(re: &Regex, text: &str, value: &str) -> String {
    re.replace_all(text, |caps: &Captures| format!("{}{value}", &caps[1]))
        .into_owned()
}

/// A submitted trial job and the log files the scheduler will write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub script_path: PathBuf,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// Renders a trial's job script from the study template and submits it.
pub struct JobLauncher {
    scheduler: Arc<dyn Scheduler>,
    template_path: PathBuf,
    logs_dir: String,
}

impl JobLauncher {
    pub fn new(scheduler: Arc<dyn Scheduler>, template_path: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            template_path: template_path.into(),
            logs_dir: DEFAULT_LOGS_DIR.to_string(),
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<String>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Write `{trial_dir}/{trial_name}.sh`, create its log directory and
    /// submit it.
    pub async fn launch(&self, trial_dir: &Path, trial_name: &str) -> HsResult<JobHandle> {
        let template = tokio::fs::read_to_string(&self.template_path).await?;
        let fields = ScriptFields {
            logs_dir: self.logs_dir.clone(),
            ..ScriptFields::new(trial_name, trial_dir)
        };

        let script_path = trial_dir.join(format!("{trial_name}.sh"));
        tokio::fs::write(&script_path, render_script(&template, &fields)).await?;
        tokio::fs::create_dir_all(fields.log_dir()).await?;

        let job_id = self.scheduler.submit(&script_path).await?;
        info!(
            trial = %trial_name,
            job_id = %job_id,
            scheduler = self.scheduler.name(),
            "launched trial job"
        );

        Ok(JobHandle {
            stdout_log: fields.stdout_log(&job_id),
            stderr_log: fields.stderr_log(&job_id),
            job_id,
            script_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedJob, SimulatedScheduler};

    const TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name=placeholder
#SBATCH --output=old/%x.out
#SBATCH --error=old/%x.err
#SBATCH --time=10:00:00
config_path=\"somewhere\"
temp_path=\"config.yaml\"
cd $config_path
python train.py --config $temp_path
";

    #[test]
    fn renders_all_substituted_fields() {
        let fields = ScriptFields::new("Mace_0_lr_0.1", "./opt_Mace/Mace_0_lr_0.1");
        let script = render_script(TEMPLATE, &fields);

        assert!(script.contains("#SBATCH --job-name=Mace_0_lr_0.1\n"));
        assert!(script.contains(
            "#SBATCH --output=./opt_Mace/Mace_0_lr_0.1/logs/Mace_0_lr_0.1/%x-%j.out\n"
        ));
        assert!(script.contains(
            "#SBATCH --error=./opt_Mace/Mace_0_lr_0.1/logs/Mace_0_lr_0.1/%x-%j.err\n"
        ));
        assert!(script.contains("config_path=\"opt_Mace/Mace_0_lr_0.1\"\n"));
        assert!(script.contains("temp_path=\"Mace_0_lr_0.1.yaml\"\n"));
        assert!(script.contains("#SBATCH --time=10:00:00\n"));
        assert!(script.contains("cd $config_path\n"));
    }

    #[test]
    fn dollar_signs_in_values_are_literal() {
        let fields = ScriptFields::new("job$1", "/scratch/$USER");
        let script = render_script(TEMPLATE, &fields);
        assert!(script.contains("#SBATCH --job-name=job$1\n"));
        assert!(script.contains("config_path=\"/scratch/$USER\"\n"));
    }

    #[test]
    fn log_paths_follow_job_name_and_id() {
        let fields = ScriptFields::new("trial", "/runs/trial");
        assert_eq!(
            fields.stdout_log("42"),
            PathBuf::from("/runs/trial/logs/trial/trial-42.out")
        );
        assert_eq!(
            fields.stderr_log("42"),
            PathBuf::from("/runs/trial/logs/trial/trial-42.err")
        );
    }

    #[tokio::test]
    async fn launch_writes_script_and_submits() {
        let tmp = tempfile::tempdir().unwrap();
        let template_path = tmp.path().join("job.sh");
        tokio::fs::write(&template_path, TEMPLATE).await.unwrap();
        let trial_dir = tmp.path().join("Mace_0_lr_0.1");
        tokio::fs::create_dir_all(&trial_dir).await.unwrap();

        let scheduler = Arc::new(SimulatedScheduler::new().with_job(SimulatedJob::completing()));
        let launcher = JobLauncher::new(scheduler.clone(), &template_path);
        let handle = launcher.launch(&trial_dir, "Mace_0_lr_0.1").await.unwrap();

        assert_eq!(handle.job_id, "1000");
        assert!(handle.script_path.exists());
        assert_eq!(scheduler.submitted(), vec![handle.script_path.clone()]);
        assert!(handle.stdout_log.parent().unwrap().is_dir());
        assert!(handle
            .stderr_log
            .ends_with("logs/Mace_0_lr_0.1/Mace_0_lr_0.1-1000.err"));
    }

    #[tokio::test]
    async fn launch_propagates_submission_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let template_path = tmp.path().join("job.sh");
        tokio::fs::write(&template_path, TEMPLATE).await.unwrap();

        let scheduler = Arc::new(SimulatedScheduler::new().rejecting_submissions());
        let launcher = JobLauncher::new(scheduler, &template_path);
        let result = launcher.launch(tmp.path(), "t").await;
        assert!(matches!(
            result,
            Err(hs_types::HsError::Scheduler(
                hs_types::SchedulerError::Submission { .. }
            ))
        ));
    }
}
