//! Monitoring readbacks: stats, logs, and aggregated health for a deployment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::HosterResult;
use crate::model::Deployment;
use crate::storage::Storage;
use crate::transport::{ContainerStats, DockerClient, LogStream};

/// A point-in-time resource snapshot for one container of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatsSnapshot {
    /// Docker container id.
    pub container_id: String,
    /// Compose service name.
    pub service: String,
    /// The raw sample read from the Docker client.
    pub stats: ContainerStats,
}

/// Aggregate resource snapshot across every live container of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStats {
    /// Deployment the snapshot belongs to.
    pub deployment_id: Uuid,
    /// Per-container samples.
    pub containers: Vec<ContainerStatsSnapshot>,
}

/// One merged, time-ordered log line across every container of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Compose service name the line came from.
    pub container: String,
    /// When Docker reported the line, if it supplied a timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Which output stream the line came from.
    pub stream: LogStream,
    /// Line content.
    pub message: String,
}

/// Per-container health state, as reported by [`crate::transport::ContainerInspection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerHealth {
    /// The healthcheck currently reports healthy.
    Healthy,
    /// The healthcheck currently reports unhealthy.
    Unhealthy,
    /// No healthcheck is configured, or its status could not be determined.
    Unknown,
}

/// Aggregated health across every container of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentHealth {
    /// Every container is healthy (or has no healthcheck and none report unhealthy).
    Healthy,
    /// At least one container reports unhealthy.
    Unhealthy,
    /// No container is unhealthy, but at least one is unknown and at least one is healthy.
    Degraded,
    /// No container reports healthy or unhealthy; health cannot be determined.
    Unknown,
}

/// Aggregates per-container health into one overall [`DeploymentHealth`]: unhealthy if any
/// container is unhealthy; degraded if none are unhealthy but the set is a mix of healthy
/// and unknown; otherwise healthy (all healthy) or unknown (all unknown).
#[must_use]
pub fn aggregate_health(per_container: &[ContainerHealth]) -> DeploymentHealth {
    let any_unhealthy = per_container.iter().any(|h| *h == ContainerHealth::Unhealthy);
    if any_unhealthy {
        return DeploymentHealth::Unhealthy;
    }
    let any_healthy = per_container.iter().any(|h| *h == ContainerHealth::Healthy);
    let any_unknown = per_container.iter().any(|h| *h == ContainerHealth::Unknown);
    match (any_healthy, any_unknown) {
        (true, true) => DeploymentHealth::Degraded,
        (true, false) => DeploymentHealth::Healthy,
        (false, _) => DeploymentHealth::Unknown,
    }
}

async fn client_for(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment: &Deployment,
) -> HosterResult<std::sync::Arc<dyn DockerClient>> {
    let node_id = deployment.node_id.ok_or_else(|| crate::errors::HosterError::NotFound {
        kind: "node",
        id: deployment.id,
    })?;
    let node = storage.get_node(node_id).await?;
    let ssh_key = match node.ssh_key_id {
        Some(id) => Some(storage.get_ssh_key(id).await?),
        None => None,
    };
    pool.get(&node, ssh_key.as_ref())
        .await
        .map_err(crate::errors::HosterError::Transport)
}

/// Takes one resource-usage sample per live container of a deployment.
pub async fn stats(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment_id: Uuid,
) -> HosterResult<DeploymentStats> {
    use futures::StreamExt;

    let deployment = storage.get_deployment(deployment_id).await?;
    let client = client_for(storage, pool, &deployment).await?;

    let mut containers = Vec::with_capacity(deployment.containers.len());
    for container in &deployment.containers {
        let mut stream = client.container_stats(&container.id).await?;
        if let Some(Ok(sample)) = stream.next().await {
            containers.push(ContainerStatsSnapshot {
                container_id: container.id.clone(),
                service: container.service.clone(),
                stats: sample,
            });
        }
    }

    Ok(DeploymentStats {
        deployment_id,
        containers,
    })
}

/// Fetches and merges log lines for every container of a deployment, optionally limited to
/// the last `tail` lines per container and to those emitted after `since`.
pub async fn logs(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment_id: Uuid,
    tail: Option<u32>,
    since: Option<DateTime<Utc>>,
) -> HosterResult<Vec<LogEntry>> {
    use futures::StreamExt;

    let deployment = storage.get_deployment(deployment_id).await?;
    let client = client_for(storage, pool, &deployment).await?;

    let mut entries = Vec::new();
    for container in &deployment.containers {
        let mut stream = client.container_logs(&container.id, tail, since).await?;
        while let Some(line) = stream.next().await {
            let line = line?;
            entries.push(LogEntry {
                container: container.service.clone(),
                timestamp: line.timestamp,
                stream: line.stream,
                message: line.message,
            });
        }
    }

    entries.sort_by_key(|e| e.timestamp);
    Ok(entries)
}

/// Inspects every container of a deployment and aggregates the result into one health status.
pub async fn health(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment_id: Uuid,
) -> HosterResult<DeploymentHealth> {
    let deployment = storage.get_deployment(deployment_id).await?;
    let client = client_for(storage, pool, &deployment).await?;

    let mut states = Vec::with_capacity(deployment.containers.len());
    for container in &deployment.containers {
        let inspection = client.inspect_container(&container.id).await?;
        let state = match inspection.healthy {
            Some(true) => ContainerHealth::Healthy,
            Some(false) => ContainerHealth::Unhealthy,
            None => ContainerHealth::Unknown,
        };
        states.push(state);
    }

    Ok(aggregate_health(&states))
}
