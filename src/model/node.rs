//! Worker node entity: SSH-reachable host with tracked capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Operational status of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Reachable and accepting new deployments.
    Online,
    /// Unreachable; health checks are failing.
    Offline,
    /// Reachable but administratively excluded from scheduling.
    Maintenance,
}

/// CPU architecture a node reports, used to select which helper-agent binary slice to
/// upload on first remote use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeArch {
    /// x86-64 / amd64 Linux.
    Amd64,
    /// aarch64 / arm64 Linux.
    Arm64,
}

/// Advisory resource accounting for a node. `used` is updated transactionally by the
/// scheduler (reserve) and the orchestrator's remove lifecycle (release).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    /// Total CPU cores.
    pub cpu_total: f64,
    /// Reserved CPU cores.
    pub cpu_used: f64,
    /// Total memory, megabytes.
    pub memory_total_mb: u64,
    /// Reserved memory, megabytes.
    pub memory_used_mb: u64,
    /// Total disk, megabytes.
    pub disk_total_mb: u64,
    /// Reserved disk, megabytes.
    pub disk_used_mb: u64,
}

impl Capacity {
    /// Clamped-to-zero available CPU cores.
    #[must_use]
    pub fn cpu_available(&self) -> f64 {
        (self.cpu_total - self.cpu_used).max(0.0)
    }

    /// Clamped-to-zero available memory, megabytes.
    #[must_use]
    pub fn memory_available_mb(&self) -> u64 {
        self.memory_total_mb.saturating_sub(self.memory_used_mb)
    }

    /// Clamped-to-zero available disk, megabytes.
    #[must_use]
    pub fn disk_available_mb(&self) -> u64 {
        self.disk_total_mb.saturating_sub(self.disk_used_mb)
    }

    /// Returns true if the available capacity satisfies `required`.
    #[must_use]
    pub fn can_handle(&self, required: &crate::model::Resources) -> bool {
        self.cpu_available() >= required.cpu_cores
            && self.memory_available_mb() >= required.memory_mb
            && self.disk_available_mb() >= required.disk_mb
    }

    /// Reserves `resources`, incrementing the `used` counters.
    pub fn reserve(&mut self, resources: &crate::model::Resources) {
        self.cpu_used += resources.cpu_cores;
        self.memory_used_mb += resources.memory_mb;
        self.disk_used_mb += resources.disk_mb;
    }

    /// Releases a prior reservation, decrementing the `used` counters (saturating at zero).
    pub fn release(&mut self, resources: &crate::model::Resources) {
        self.cpu_used = (self.cpu_used - resources.cpu_cores).max(0.0);
        self.memory_used_mb = self.memory_used_mb.saturating_sub(resources.memory_mb);
        self.disk_used_mb = self.disk_used_mb.saturating_sub(resources.disk_mb);
    }

    /// Fraction of memory in use, in `[0, 1]`; used by the scheduler's scoring function.
    #[must_use]
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_total_mb == 0 {
            return 1.0;
        }
        self.memory_used_mb as f64 / self.memory_total_mb as f64
    }

    /// Fraction of CPU in use, in `[0, 1]`.
    #[must_use]
    pub fn cpu_utilization(&self) -> f64 {
        if self.cpu_total <= 0.0 {
            return 1.0;
        }
        (self.cpu_used / self.cpu_total).clamp(0.0, 1.0)
    }

    /// Fraction of disk in use, in `[0, 1]`.
    #[must_use]
    pub fn disk_utilization(&self) -> f64 {
        if self.disk_total_mb == 0 {
            return 1.0;
        }
        self.disk_used_mb as f64 / self.disk_total_mb as f64
    }
}

/// SSH connection parameters for a [`Node`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshEndpoint {
    /// Hostname or IP address.
    pub host: String,
    /// SSH port, typically 22.
    pub port: u16,
    /// SSH username.
    pub user: String,
}

/// A worker host on which deployments' containers run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable reference id.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Id of the user who owns this node (and may publish templates onto it).
    pub creator_id: Uuid,
    /// SSH connection parameters.
    pub ssh: SshEndpoint,
    /// Id of the stored SSH key used to authenticate, if any (local nodes may have none).
    pub ssh_key_id: Option<Uuid>,
    /// Path to the Docker socket on the remote host.
    pub docker_socket_path: String,
    /// CPU architecture, used to pick the right helper-agent binary for remote nodes
    /// (ignored for local nodes, which never need one).
    pub arch: NodeArch,
    /// Current operational status.
    pub status: NodeStatus,
    /// Advertised capability tags.
    pub capabilities: HashSet<String>,
    /// Tracked capacity.
    pub capacity: Capacity,
    /// Optional human-readable location (e.g. a datacenter region).
    pub location: Option<String>,
    /// Timestamp of the last successful or attempted health check.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Most recent health-check or transport error.
    pub last_error: Option<String>,
    /// Base domain override; falls back to the global default when `None`.
    pub base_domain: Option<String>,
    /// Whether this node may host deployments from templates it does not own
    /// (reserved for a future multi-tenant extension; unused by the scheduler today).
    pub public: bool,
}

impl Node {
    /// Docker socket path used when a template does not override it.
    pub const DEFAULT_DOCKER_SOCKET: &'static str = "/var/run/docker.sock";

    /// A node is available for scheduling iff it is online.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// Capability set satisfies `required` iff it is a superset.
    #[must_use]
    pub fn satisfies_capabilities(&self, required: &HashSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Effective base domain for auto-generated hostnames on this node.
    #[must_use]
    pub fn effective_base_domain<'a>(&'a self, global_default: &'a str) -> &'a str {
        self.base_domain.as_deref().unwrap_or(global_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resources;

    fn capacity(total_cpu: f64, used_cpu: f64) -> Capacity {
        Capacity {
            cpu_total: total_cpu,
            cpu_used: used_cpu,
            memory_total_mb: 8192,
            memory_used_mb: 2048,
            disk_total_mb: 100_000,
            disk_used_mb: 10_000,
        }
    }

    #[test]
    fn available_clamps_to_zero() {
        let cap = capacity(2.0, 5.0);
        assert_eq!(cap.cpu_available(), 0.0);
    }

    #[test]
    fn can_handle_checks_all_three_dimensions() {
        let cap = capacity(4.0, 1.0);
        let fits = Resources {
            cpu_cores: 2.0,
            memory_mb: 1000,
            disk_mb: 1000,
        };
        let too_big = Resources {
            cpu_cores: 10.0,
            memory_mb: 1000,
            disk_mb: 1000,
        };
        assert!(cap.can_handle(&fits));
        assert!(!cap.can_handle(&too_big));
    }

    #[test]
    fn reserve_then_release_is_idempotent_roundtrip() {
        let mut cap = capacity(4.0, 1.0);
        let r = Resources {
            cpu_cores: 1.0,
            memory_mb: 512,
            disk_mb: 2048,
        };
        cap.reserve(&r);
        assert_eq!(cap.cpu_used, 2.0);
        cap.release(&r);
        assert_eq!(cap.cpu_used, 1.0);
    }

    #[test]
    fn capability_superset_check() {
        let mut caps = HashSet::new();
        caps.insert("standard".to_string());
        caps.insert("gpu".to_string());
        let mut required = HashSet::new();
        required.insert("gpu".to_string());
        assert!(required.is_subset(&caps));
    }
}
