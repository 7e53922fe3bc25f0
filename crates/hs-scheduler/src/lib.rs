//! # hs-scheduler
//!
//! Batch scheduler abstraction and the per-trial job lifecycle.
//!
//! [`Scheduler`] is the narrow submit / query / cancel seam. [`SlurmScheduler`]
//! drives a real cluster through `sbatch`, `sacct` and `scancel`;
//! [`SimulatedScheduler`] replays scripted job states in-process for tests and
//! dry runs. [`JobLauncher`] renders and submits a trial's batch script and
//! [`JobMonitor`] drives the resulting [`TrialJob`] to a terminal state.

pub mod launcher;
pub mod monitor;
pub mod scheduler;
pub mod simulated;
pub mod slurm;

pub use launcher::{render_script, JobHandle, JobLauncher, ScriptFields, DEFAULT_LOGS_DIR};
pub use monitor::{JobMonitor, JobState, MonitorConfig, RunIdentifier, TrialJob};
pub use scheduler::{JobId, Scheduler, SchedulerResult, SchedulerState};
pub use simulated::{SimulatedJob, SimulatedScheduler};
pub use slurm::{SlurmConfig, SlurmScheduler};
