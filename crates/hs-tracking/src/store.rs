//! Metrics store abstraction and an in-memory implementation.

use async_trait::async_trait;
use hs_types::TrackingError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

pub type TrackingResult<T> = Result<T, TrackingError>;

/// Source of scalar results recorded by training runs.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Latest value of `key` recorded by the run, or
    /// [`TrackingError::MetricNotFound`] when the run never logged it.
    async fn fetch_scalar(
        &self,
        entity: &str,
        project: &str,
        run_id: &str,
        key: &str,
    ) -> TrackingResult<f64>;

    fn name(&self) -> &str;
}

type RunKey = (String, String, String);

/// Metrics store backed by a map, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    runs: RwLock<HashMap<RunKey, HashMap<String, f64>>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(
        self,
        entity: &str,
        project: &str,
        run_id: &str,
        key: &str,
        value: f64,
    ) -> Self {
        self.record(entity, project, run_id, key, value);
        self
    }

    /// Record (or overwrite) the latest value of `key` for a run.
    pub fn record(&self, entity: &str, project: &str, run_id: &str, key: &str, value: f64) {
        self.runs
            .write()
            .entry((entity.to_string(), project.to_string(), run_id.to_string()))
            .or_default()
            .insert(key.to_string(), value);
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn fetch_scalar(
        &self,
        entity: &str,
        project: &str,
        run_id: &str,
        key: &str,
    ) -> TrackingResult<f64> {
        let runs = self.runs.read();
        let value = runs
            .get(&(entity.to_string(), project.to_string(), run_id.to_string()))
            .and_then(|metrics| metrics.get(key))
            .copied();
        debug!(entity, project, run_id, key, found = value.is_some(), "in-memory metric lookup");
        value.ok_or_else(|| TrackingError::MetricNotFound {
            entity: entity.to_string(),
            project: project.to_string(),
            run_id: run_id.to_string(),
            key: key.to_string(),
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
