//! Immutable append-only event logs: container lifecycle events and billing meter events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The closed set of container lifecycle event types the orchestrator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerEventType {
    /// An image pull started.
    ImagePulling,
    /// An image pull completed.
    ImagePulled,
    /// A container was created.
    ContainerCreated,
    /// A container was started.
    ContainerStarted,
    /// A container was stopped.
    ContainerStopped,
    /// A container was restarted (out-of-band, e.g. by its own restart policy).
    ContainerRestarted,
    /// A container exited unexpectedly.
    ContainerDied,
    /// A container was killed by the kernel OOM killer.
    ContainerOom,
    /// A container's health check reported unhealthy.
    HealthUnhealthy,
    /// A container's health check recovered.
    HealthHealthy,
}

/// An immutable record of a single container state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// Stable reference id.
    pub id: Uuid,
    /// Owning deployment.
    pub deployment_id: Uuid,
    /// Event type.
    pub event_type: ContainerEventType,
    /// Container name as generated by the naming layer.
    pub container_name: String,
    /// Human-readable message, e.g. an error detail.
    pub message: String,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ContainerEvent {
    /// Builds a new event stamped with the current time.
    #[must_use]
    pub fn new(
        deployment_id: Uuid,
        event_type: ContainerEventType,
        container_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            event_type,
            container_name: container_name.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Dot-notation billable event type, e.g. `deployment.started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterEventType {
    /// A deployment was created.
    DeploymentCreated,
    /// A deployment finished starting.
    DeploymentStarted,
    /// A deployment finished stopping.
    DeploymentStopped,
    /// A deployment was deleted.
    DeploymentDeleted,
}

impl MeterEventType {
    /// Dot-notation string form, e.g. `"deployment.started"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MeterEventType::DeploymentCreated => "deployment.created",
            MeterEventType::DeploymentStarted => "deployment.started",
            MeterEventType::DeploymentStopped => "deployment.stopped",
            MeterEventType::DeploymentDeleted => "deployment.deleted",
        }
    }
}

/// An immutable usage record, appended on billable lifecycle actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterEvent {
    /// Stable reference id.
    pub id: Uuid,
    /// User to be billed.
    pub user_id: Uuid,
    /// Billable event type.
    pub event_type: MeterEventType,
    /// Id of the resource the event concerns (e.g. the deployment id).
    pub resource_id: Uuid,
    /// Resource type discriminator, e.g. `"deployment"`.
    pub resource_type: &'static str,
    /// Quantity; defaults to `1`.
    pub quantity: u64,
    /// Free-form metadata, e.g. `{"template_id": "..."}`.
    pub metadata: HashMap<String, String>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// When a background reporter forwarded this event to the billing collector.
    pub reported_at: Option<DateTime<Utc>>,
}

impl MeterEvent {
    /// Builds a new, unreported deployment meter event.
    #[must_use]
    pub fn deployment(
        user_id: Uuid,
        event_type: MeterEventType,
        deployment_id: Uuid,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_type,
            resource_id: deployment_id,
            resource_type: "deployment",
            quantity: 1,
            metadata,
            timestamp: Utc::now(),
            reported_at: None,
        }
    }
}
