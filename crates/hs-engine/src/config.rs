//! Tuning run configuration, loadable from TOML.
//!
//! ```toml
//! study_name = "final_mace_test"
//! n_trials = 100
//! direction = "minimize"
//! strategy = "grid"
//! metric_key = "test0_epoch/weighted_sum"
//!
//! [monitor]
//! poll_interval_secs = 2
//! timeout_secs = 36000
//!
//! [slurm]
//! sbatch = "sbatch"
//! ```

use hs_optimizer::{ObjectiveDirection, StrategyKind, StudyConfig};
use hs_scheduler::{MonitorConfig, SlurmConfig};
use hs_tracking::WandbConfig;
use hs_types::{config_error, HsResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_METRIC_KEY: &str = "test0_epoch/weighted_sum";
pub const DEFAULT_SEED: u64 = 10;
/// Upper bound on `monitor.timeout_secs`: one year.
pub const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// Polling cadence and budget, in whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub log_wait_interval_secs: u64,
    pub timeout_secs: u64,
    /// Apply the timeout while waiting for the job's stdout log.
    pub bound_log_wait: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            log_wait_interval_secs: defaults.log_wait_interval.as_secs(),
            timeout_secs: defaults.timeout.as_secs(),
            bound_log_wait: defaults.bound_log_wait,
        }
    }
}

impl From<&MonitorSettings> for MonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        MonitorConfig::default()
            .with_poll_interval(Duration::from_secs(settings.poll_interval_secs))
            .with_log_wait_interval(Duration::from_secs(settings.log_wait_interval_secs))
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_bound_log_wait(settings.bound_log_wait)
    }
}

/// Everything a `tune` run needs besides the study directory itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub study_name: String,
    pub n_trials: usize,
    pub direction: ObjectiveDirection,
    pub strategy: StrategyKind,
    pub seed: Option<u64>,
    /// History key read from the tracking run once a job completes.
    pub metric_key: String,
    pub monitor: MonitorSettings,
    pub slurm: SlurmConfig,
    pub wandb: WandbConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            study_name: "hypersweep".to_string(),
            n_trials: 100,
            direction: ObjectiveDirection::Minimize,
            strategy: StrategyKind::Grid,
            seed: Some(DEFAULT_SEED),
            metric_key: DEFAULT_METRIC_KEY.to_string(),
            monitor: MonitorSettings::default(),
            slurm: SlurmConfig::default(),
            wandb: WandbConfig::default(),
        }
    }
}

impl TuningConfig {
    pub fn from_toml_str(text: &str) -> HsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| config_error!("invalid tuning config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> HsResult<()> {
        if self.metric_key.is_empty() {
            return Err(config_error!("metric_key must not be empty"));
        }
        if self.monitor.poll_interval_secs == 0 || self.monitor.log_wait_interval_secs == 0 {
            return Err(config_error!("polling intervals must be at least one second"));
        }
        if self.monitor.timeout_secs == 0 || self.monitor.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(config_error!(
                "monitor.timeout_secs must be between 1 and {} (got {})",
                MAX_TIMEOUT_SECS,
                self.monitor.timeout_secs
            ));
        }
        Ok(())
    }

    pub fn with_study_name(mut self, name: impl Into<String>) -> Self {
        self.study_name = name.into();
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_metric_key(mut self, key: impl Into<String>) -> Self {
        self.metric_key = key.into();
        self
    }

    pub fn with_wandb_api_key(mut self, key: impl Into<String>) -> Self {
        self.wandb.api_key = key.into();
        self
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::from(&self.monitor)
    }

    pub fn study_config(&self) -> StudyConfig {
        StudyConfig::new(self.study_name.clone())
            .with_n_trials(self.n_trials)
            .with_direction(self.direction)
            .with_strategy(self.strategy)
            .with_seed(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuning_script() {
        let config = TuningConfig::default();
        assert_eq!(config.metric_key, "test0_epoch/weighted_sum");
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
        assert_eq!(config.n_trials, 100);

        let monitor = config.monitor_config();
        assert_eq!(monitor.poll_interval, Duration::from_secs(2));
        assert_eq!(monitor.log_wait_interval, Duration::from_secs(1));
        assert_eq!(monitor.timeout, Duration::from_secs(36_000));
        assert!(monitor.bound_log_wait);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TuningConfig::from_toml_str(
            r#"
            study_name = "final_mace_test"
            strategy = "random"
            seed = 3

            [monitor]
            timeout_secs = 600

            [slurm]
            sacct = "/opt/slurm/bin/sacct"
            "#,
        )
        .unwrap();

        assert_eq!(config.study_name, "final_mace_test");
        assert_eq!(config.strategy, StrategyKind::Random);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.monitor.timeout_secs, 600);
        assert_eq!(config.monitor.poll_interval_secs, 2);
        assert_eq!(config.slurm.sacct, "/opt/slurm/bin/sacct");
        assert_eq!(config.slurm.sbatch, "sbatch");
        assert!(config.wandb.api_key.is_empty());

        let study = config.study_config();
        assert_eq!(study.name, "final_mace_test");
        assert_eq!(study.strategy, StrategyKind::Random);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(TuningConfig::from_toml_str("n_trials = \"many\"").is_err());
        assert!(TuningConfig::from_toml_str("metric_key = \"\"").is_err());
        let err = TuningConfig::from_toml_str("[monitor]\npoll_interval_secs = 0").unwrap_err();
        assert!(err.to_string().contains("polling intervals"));
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let err = TuningConfig::from_toml_str("[monitor]\ntimeout_secs = 9223372036854775807")
            .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
        assert!(TuningConfig::from_toml_str("[monitor]\ntimeout_secs = 0").is_err());

        let longest = format!("[monitor]\ntimeout_secs = {MAX_TIMEOUT_SECS}");
        assert!(TuningConfig::from_toml_str(&longest).is_ok());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tuning.toml");
        std::fs::write(&path, "n_trials = 4\n").unwrap();
        assert_eq!(TuningConfig::load(&path).unwrap().n_trials, 4);
        assert!(TuningConfig::load(tmp.path().join("missing.toml")).is_err());
    }
}
