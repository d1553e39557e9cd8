// src/clustering/density.rs
//
// Pluggable density-based clustering strategy. The shipped implementation
// shells out to an HDBSCAN worker process speaking a small JSON protocol;
// callers fall back to the greedy path whenever the delegate is unavailable
// or errors, so the external dependency is never a hard requirement.

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use crate::models::{Event, EventId};

/// HDBSCAN parameters forwarded to the delegate.
#[derive(Debug, Clone, Copy)]
pub struct DensityParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub cluster_selection_epsilon: f64,
}

/// External density-based clustering capability.
///
/// Returns groups of event ids; events absent from every group are noise.
/// Errors are reported through `anyhow` because they are recovered (logged
/// and replaced by the greedy fallback), never surfaced to callers of the
/// clustering engine.
#[async_trait]
pub trait DensityClusterer: Send + Sync {
    /// Capability probe, checked before each batch.
    fn is_available(&self) -> bool {
        true
    }

    async fn cluster(
        &self,
        events: &[Event],
        params: &DensityParams,
    ) -> anyhow::Result<Vec<Vec<EventId>>>;
}

#[derive(Serialize)]
struct DelegateEvent<'a> {
    id: &'a str,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct DelegateResponse {
    clusters: Vec<DelegateCluster>,
    #[serde(default)]
    clustered_count: usize,
    #[serde(default)]
    noise_count: usize,
}

#[derive(Deserialize)]
struct DelegateCluster {
    #[allow(dead_code)]
    cluster_id: i64,
    event_ids: Vec<String>,
    #[allow(dead_code)]
    size: usize,
}

/// Delegate that runs an HDBSCAN worker as a subprocess.
///
/// Wire format: the request is a JSON array of `{id, embedding}` records
/// written to a temp file passed via `--data`; the response on stdout is
/// `{"clusters": [{"cluster_id", "event_ids", "size"}], "clustered_count",
/// "noise_count"}`.
pub struct SubprocessClusterer {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl SubprocessClusterer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        SubprocessClusterer {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Additional fixed arguments, e.g. the script path when `program` is an
    /// interpreter.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }
}

#[async_trait]
impl DensityClusterer for SubprocessClusterer {
    fn is_available(&self) -> bool {
        // A relative program name is resolved via PATH at spawn time; only
        // absolute paths can be probed up front.
        !self.program.is_absolute() || self.program.exists()
    }

    async fn cluster(
        &self,
        events: &[Event],
        params: &DensityParams,
    ) -> anyhow::Result<Vec<Vec<EventId>>> {
        let payload: Vec<DelegateEvent> = events
            .iter()
            .map(|e| {
                let embedding = e
                    .embedding
                    .as_deref()
                    .with_context(|| format!("event {} has no embedding", e.id))?;
                Ok(DelegateEvent {
                    id: &e.id.0,
                    embedding,
                })
            })
            .collect::<anyhow::Result<_>>()?;
        let request =
            serde_json::to_vec(&payload).context("failed to serialize delegate request")?;

        let data_path = std::env::temp_dir().join(format!("dedupe-batch-{}.json", Uuid::new_v4()));
        tokio::fs::write(&data_path, &request)
            .await
            .with_context(|| format!("failed to write delegate payload to {:?}", data_path))?;

        let result = self.run_worker(&data_path, params).await;

        if let Err(e) = tokio::fs::remove_file(&data_path).await {
            warn!("Failed to remove delegate payload {:?}: {}", data_path, e);
        }
        result
    }
}

impl SubprocessClusterer {
    async fn run_worker(
        &self,
        data_path: &std::path::Path,
        params: &DensityParams,
    ) -> anyhow::Result<Vec<Vec<EventId>>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .arg("--data")
            .arg(data_path)
            .arg("--min-cluster-size")
            .arg(params.min_cluster_size.to_string())
            .arg("--min-samples")
            .arg(params.min_samples.to_string())
            .arg("--cluster-selection-epsilon")
            .arg(params.cluster_selection_epsilon.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn clustering worker {:?}", self.program))?;
        let output = child
            .wait_with_output()
            .await
            .context("clustering worker did not run to completion")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "clustering worker exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let response: DelegateResponse = serde_json::from_slice(&output.stdout)
            .context("failed to parse clustering worker response")?;
        debug!(
            "Delegate labeled {} events into {} clusters ({} noise)",
            response.clustered_count,
            response.clusters.len(),
            response.noise_count
        );

        Ok(response
            .clusters
            .into_iter()
            .map(|c| c.event_ids.into_iter().map(EventId).collect())
            .collect())
    }
}

// Writer half of the protocol is exercised indirectly through the engine
// tests with mock delegates; the parser has its own coverage here.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worker_response() {
        let raw = r#"{
            "clusters": [
                {"cluster_id": 0, "event_ids": ["a", "b"], "size": 2},
                {"cluster_id": 1, "event_ids": ["c", "d", "e"], "size": 3}
            ],
            "clustered_count": 5,
            "noise_count": 2
        }"#;
        let response: DelegateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.clusters.len(), 2);
        assert_eq!(response.clusters[1].event_ids, vec!["c", "d", "e"]);
        assert_eq!(response.noise_count, 2);
    }

    #[test]
    fn serializes_request_events() {
        let mut event = Event::new("h", "s");
        event.embedding = Some(vec![0.25, -0.5]);
        let payload = vec![DelegateEvent {
            id: &event.id.0,
            embedding: event.embedding.as_deref().unwrap(),
        }];
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json[0]["embedding"][1], -0.5);
        assert_eq!(json[0]["id"], event.id.0);
    }
}
