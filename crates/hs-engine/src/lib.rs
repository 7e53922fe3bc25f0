//! # hs-engine
//!
//! Binds extraction, scheduling and metrics retrieval into a trial
//! [`hs_optimizer::Objective`], plus the configuration consumed by the
//! `hypersweep` binary.

pub mod config;
pub mod evaluator;

pub use config::{
    MonitorSettings, TuningConfig, DEFAULT_METRIC_KEY, DEFAULT_SEED, MAX_TIMEOUT_SECS,
};
pub use evaluator::{TrialEvaluator, TRIAL_MARKER_FILE};
