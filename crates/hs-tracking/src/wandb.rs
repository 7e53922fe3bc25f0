//! Weights & Biases metrics store.
//!
//! Reads a run's sampled history through the public GraphQL API and returns
//! the last recorded value of the requested key.

use async_trait::async_trait;
use hs_types::TrackingError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::store::{MetricsStore, TrackingResult};

pub const DEFAULT_WANDB_API_URL: &str = "https://api.wandb.ai/graphql";

/// Maximum number of history rows requested per fetch.
const HISTORY_SAMPLES: u64 = 10_000;

const RUN_HISTORY_QUERY: &str = "query RunHistory(
  $project: String!, $entity: String!, $name: String!, $specs: [JSONString!]!
) {
  project(name: $project, entityName: $entity) {
    run(name: $name) {
      sampledHistory(specs: $specs)
    }
  }
}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WandbConfig {
    pub api_url: String,
    /// Never serialized.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for WandbConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_WANDB_API_URL.to_string(),
            api_key: String::new(),
        }
    }
}

impl WandbConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct WandbClient {
    config: WandbConfig,
    client: reqwest::Client,
}

impl WandbClient {
    pub fn new(config: WandbConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &WandbConfig {
        &self.config
    }

    async fn sampled_history(
        &self,
        entity: &str,
        project: &str,
        run_id: &str,
        key: &str,
    ) -> TrackingResult<Vec<Value>> {
        let spec = json!({ "keys": ["_step", key], "samples": HISTORY_SAMPLES }).to_string();
        let body = json!({
            "query": RUN_HISTORY_QUERY,
            "variables": {
                "entity": entity,
                "project": project,
                "name": run_id,
                "specs": [spec],
            }
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .basic_auth("api", Some(&self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| TrackingError::Request {
                message: format!("HTTP request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(TrackingError::Request {
                message: format!("HTTP error: {}", response.status()),
            });
        }

        let json: Value = response.json().await.map_err(|e| TrackingError::Response {
            message: format!("Failed to parse JSON response: {e}"),
        })?;

        history_rows(&json)
    }
}

/// Pull the history rows out of a `RunHistory` response. A missing run
/// yields no rows.
fn history_rows(response: &Value) -> TrackingResult<Vec<Value>> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(TrackingError::Response {
                message: format!("API error: {}", Value::Array(errors.clone())),
            });
        }
    }

    let run = response.pointer("/data/project/run");
    let Some(run) = run.filter(|r| !r.is_null()) else {
        return Ok(Vec::new());
    };

    let specs = run
        .get("sampledHistory")
        .and_then(Value::as_array)
        .ok_or_else(|| TrackingError::Response {
            message: "Missing 'sampledHistory' in response".to_string(),
        })?;

    Ok(specs
        .first()
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Last numeric value of `key` across history rows. Rows may be objects or
/// JSON-encoded strings.
pub fn last_value_in_history(rows: &[Value], key: &str) -> Option<f64> {
    rows.iter().rev().find_map(|row| match row {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|row| row.get(key).and_then(Value::as_f64)),
        _ => row.get(key).and_then(Value::as_f64),
    })
}

#[async_trait]
impl MetricsStore for WandbClient {
    async fn fetch_scalar(
        &self,
        entity: &str,
        project: &str,
        run_id: &str,
        key: &str,
    ) -> TrackingResult<f64> {
        info!(entity, project, run_id, key, "fetching metric from W&B");
        let rows = self.sampled_history(entity, project, run_id, key).await?;

        let value = last_value_in_history(&rows, key).ok_or_else(|| TrackingError::MetricNotFound {
            entity: entity.to_string(),
            project: project.to_string(),
            run_id: run_id.to_string(),
            key: key.to_string(),
        })?;

        info!(run_id, key, value, rows = rows.len(), "retrieved metric from W&B");
        Ok(value)
    }

    fn name(&self) -> &str {
        "wandb"
    }
}
