use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while extracting a search space or materializing a trial
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Malformed annotation at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Path not found in base config: {path}")]
    Resolution { path: String },

    #[error("Invalid parameter path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Value {value} for '{path}' is not one of its candidates")]
    NotInSpace { path: String, value: String },

    #[error("Unknown model kind: {name}")]
    UnknownModel { name: String },
}

/// Batch scheduler and job lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Job submission failed: {message}")]
    Submission { message: String },

    #[error("State query failed for job {job_id}: {message}")]
    Query { job_id: String, message: String },

    #[error("Cancel request failed for job {job_id}: {message}")]
    Cancel { job_id: String, message: String },

    #[error("Run identifier never appeared in the logs of job {job_id}")]
    RunIdentifierNotFound { job_id: String },

    #[error("Job {job_id} exceeded its {timeout_seconds}s budget and was cancelled")]
    Timeout { job_id: String, timeout_seconds: u64 },

    #[error("Job {job_id} ended in state {state}")]
    JobEnded { job_id: String, state: String },

    #[error("Invalid job state transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },
}

/// Experiment-tracking (metrics store) errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Metric '{key}' not found for run {entity}/{project}/{run_id}")]
    MetricNotFound {
        entity: String,
        project: String,
        run_id: String,
        key: String,
    },

    #[error("Tracking request failed: {message}")]
    Request { message: String },

    #[error("Malformed tracking response: {message}")]
    Response { message: String },
}

/// Result type alias for HyperSweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TrackingError::MetricNotFound {
            entity: "acme".to_string(),
            project: "proj".to_string(),
            run_id: "r42".to_string(),
            key: "val/loss".to_string(),
        };

        assert!(error.to_string().contains("val/loss"));
        assert!(error.to_string().contains("acme/proj/r42"));
    }

    #[test]
    fn test_error_conversion() {
        let scheduler_error = SchedulerError::Submission {
            message: "sbatch: error: invalid partition".to_string(),
        };
        let hs_error: HsError = scheduler_error.into();

        match hs_error {
            HsError::Scheduler(SchedulerError::Submission { .. }) => (),
            _ => panic!("Expected Scheduler error"),
        }
    }

    #[test]
    fn test_config_error_macro() {
        let config = config_error!("Missing required field: {}", "metric_key");
        assert_eq!(
            config.to_string(),
            "Configuration error: Missing required field: metric_key"
        );
    }
}
