//! # hs-tracking
//!
//! Retrieval of scalar results from an experiment-tracking service.
//!
//! [`MetricsStore`] is the single-call seam the trial evaluator depends on.
//! [`WandbClient`] talks to the Weights & Biases GraphQL API;
//! [`InMemoryMetricsStore`] serves pre-recorded values for tests and dry runs.

pub mod store;
pub mod wandb;

pub use store::{InMemoryMetricsStore, MetricsStore, TrackingResult};
pub use wandb::{last_value_in_history, WandbClient, WandbConfig, DEFAULT_WANDB_API_URL};
