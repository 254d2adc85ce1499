//! Deployment entity and its state-machine transitions (C2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::HosterError;
use crate::model::{Domain, Resources, Status};

/// A realized container, as reported by the node pool's Docker client after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Docker-assigned container id.
    pub id: String,
    /// Compose service name this container realizes.
    pub service: String,
    /// Resolved image reference.
    pub image: String,
    /// Last observed status string, e.g. `"running"`.
    pub status: String,
    /// Published host ports, keyed by `container_port/protocol`.
    pub ports: HashMap<String, u16>,
}

/// A node-scoped, unique loopback port the reverse proxy forwards to a deployment's
/// containers.
pub type ProxyPort = u16;

/// A mutable, stateful instance of a [`super::Template`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Stable reference id.
    pub id: Uuid,
    /// User-visible name: `{slug}-{6 hex}`.
    pub name: String,
    /// Template id this was instantiated from.
    pub template_id: Uuid,
    /// Template version captured at creation time; never re-resolved.
    pub template_version: (u64, u64, u64),
    /// Owning customer.
    pub customer_id: Uuid,
    /// Node this deployment is scheduled on, once scheduled.
    pub node_id: Option<Uuid>,
    /// Current lifecycle status.
    pub status: Status,
    /// Variables supplied at creation time.
    pub variables: HashMap<String, String>,
    /// Generated/custom hostnames.
    pub domains: Vec<Domain>,
    /// Realized containers, populated by the orchestrator's start lifecycle.
    pub containers: Vec<ContainerInfo>,
    /// Resource footprint captured at creation time.
    pub resources: Resources,
    /// Allocated proxy port, once scheduled.
    pub proxy_port: Option<ProxyPort>,
    /// Most recent error message, cleared on a successful `-> starting` transition.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
    /// Timestamp of the most recent successful `-> running` transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful `-> stopped` transition.
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Attempts the `pending -> scheduled -> ...` transition to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`HosterError::InvalidTransition`] if `to` is not reachable from the current
    /// status, or if `to == Status::Starting` and [`Deployment::node_id`] is unset.
    pub fn transition(&mut self, to: Status) -> Result<(), HosterError> {
        if !self.status.can_transition_to(to) {
            return Err(HosterError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if to == Status::Starting && self.node_id.is_none() {
            return Err(HosterError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.updated_at = Utc::now();

        match to {
            Status::Running => self.started_at = Some(self.updated_at),
            Status::Stopped => self.stopped_at = Some(self.updated_at),
            Status::Starting => self.last_error = None,
            _ => {}
        }

        Ok(())
    }

    /// Transitions to `failed`, recording `message`. Only legal from `starting`, `running`,
    /// or `stopping`.
    ///
    /// # Errors
    ///
    /// Returns [`HosterError::InvalidTransition`] if the current status is not one of the
    /// three states failure is reachable from.
    pub fn transition_to_failed(&mut self, message: impl Into<String>) -> Result<(), HosterError> {
        if !matches!(self.status, Status::Starting | Status::Running | Status::Stopping) {
            return Err(HosterError::InvalidTransition {
                from: self.status,
                to: Status::Failed,
            });
        }
        self.last_error = Some(message.into());
        self.status = Status::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Deployment {
        let now = Utc::now();
        Deployment {
            id: Uuid::new_v4(),
            name: "nginx-proxy-a1b2c3".to_string(),
            template_id: Uuid::new_v4(),
            template_version: (1, 0, 0),
            customer_id: Uuid::new_v4(),
            node_id: None,
            status: Status::Pending,
            variables: HashMap::new(),
            domains: vec![],
            containers: vec![],
            resources: Resources::zero(),
            proxy_port: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            stopped_at: None,
        }
    }

    #[test]
    fn starting_requires_node_id() {
        let mut d = fresh();
        d.transition(Status::Scheduled).unwrap();
        let err = d.transition(Status::Starting).unwrap_err();
        assert!(matches!(err, HosterError::InvalidTransition { .. }));
        assert_eq!(d.status, Status::Scheduled);
    }

    #[test]
    fn full_happy_path_stamps_timestamps() {
        let mut d = fresh();
        d.node_id = Some(Uuid::new_v4());
        d.transition(Status::Scheduled).unwrap();
        d.transition(Status::Starting).unwrap();
        d.transition(Status::Running).unwrap();
        assert!(d.started_at.is_some());
        d.transition(Status::Stopping).unwrap();
        d.transition(Status::Stopped).unwrap();
        assert!(d.stopped_at.is_some());
    }

    #[test]
    fn starting_clears_last_error() {
        let mut d = fresh();
        d.node_id = Some(Uuid::new_v4());
        d.transition(Status::Scheduled).unwrap();
        d.transition(Status::Starting).unwrap();
        d.transition_to_failed("boom").unwrap();
        assert_eq!(d.last_error.as_deref(), Some("boom"));
        d.transition(Status::Starting).unwrap();
        assert!(d.last_error.is_none());
    }

    #[test]
    fn transition_to_failed_only_from_active_states() {
        let mut d = fresh();
        assert!(d.transition_to_failed("x").is_err());
    }

    #[test]
    fn rejects_transition_not_in_table() {
        let mut d = fresh();
        assert!(d.transition(Status::Running).is_err());
        assert_eq!(d.status, Status::Pending);
    }
}
