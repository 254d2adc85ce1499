//! Node pool & SSH transport (C5).
//!
//! Presents one [`DockerClient`] abstraction over two backends: the local Docker daemon
//! (Unix socket, no tunnel) and remote daemons reached through a helper agent bootstrapped
//! over SSH. Both backends drive the same `docker` CLI via [`executor::ProcessExecutor`];
//! the only difference is which `DOCKER_HOST` the process sees.

mod executor;
mod local;
mod pool;
pub mod ssh;

pub use executor::{CommandOutput, ExecutionConfig, ProcessExecutor};
pub use local::LocalDockerClient;
pub use pool::{NodePool, PooledClient};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the node pool and its SSH/Docker transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The `docker` binary could not be located or executed.
    #[error("docker binary not found: {0}")]
    DockerNotFound(String),

    /// A `docker` invocation exited non-zero.
    #[error("command '{command}' failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// A command did not complete within its configured timeout.
    #[error("command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// The command line that was run.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A local I/O error occurred spawning or communicating with a child process.
    #[error("io error: {0}")]
    Io(String),

    /// The SSH handshake, authentication, or channel setup failed.
    #[error("ssh error: {0}")]
    Ssh(String),

    /// The helper agent could not be bootstrapped onto the remote host.
    #[error("helper agent bootstrap failed: {0}")]
    AgentBootstrap(String),

    /// A requested node has no live client in the pool and none could be established.
    #[error("no client available for node {node_id}")]
    NoClient {
        /// Node reference id.
        node_id: uuid::Uuid,
    },

    /// Decrypting a stored SSH private key failed.
    #[error("ssh key decryption failed: {0}")]
    KeyDecryption(String),
}

/// A declarative container creation request, lowered from a Compose service plus the
/// naming/label outputs of C3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Name to create the container under.
    pub name: String,
    /// Image reference, already pulled.
    pub image: String,
    /// Command override, empty to use the image default.
    pub command: Vec<String>,
    /// Entrypoint override, empty to use the image default.
    pub entrypoint: Vec<String>,
    /// Environment variables, with template variables already substituted.
    pub env: HashMap<String, String>,
    /// Labels, including reverse-proxy routing labels.
    pub labels: HashMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortPublish>,
    /// Volume and bind mounts.
    pub volumes: Vec<VolumeBind>,
    /// Network to attach to, with the given network alias.
    pub network: Option<NetworkAttachment>,
    /// Restart policy, passed through to `docker run --restart`.
    pub restart_policy: String,
    /// Healthcheck command, if the service declared one.
    pub healthcheck: Option<Vec<String>>,
}

/// A network this container attaches to, and the alias other containers see it under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Network name.
    pub name: String,
    /// Alias this container is reachable under from other containers on the network.
    pub alias: String,
}

/// A single `(host_ip, host_port, container_port, protocol)` publication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortPublish {
    /// Host port; `None` requests a Docker-assigned ephemeral port.
    pub host_port: Option<u16>,
    /// Container-side port.
    pub container_port: u16,
    /// `"tcp"` or `"udp"`.
    pub protocol: crate::compose::Protocol,
}

/// A volume or bind mount attached to a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBind {
    /// Named volume or host path.
    pub source: String,
    /// In-container mount path.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// A point-in-time resource usage sample for one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    /// CPU usage as a fraction of one core, e.g. `1.5` for 150% of a core.
    pub cpu_fraction: f64,
    /// Resident memory usage, bytes.
    pub memory_usage_bytes: u64,
    /// Memory limit, bytes.
    pub memory_limit_bytes: u64,
    /// Cumulative network bytes received.
    pub network_rx_bytes: u64,
    /// Cumulative network bytes transmitted.
    pub network_tx_bytes: u64,
    /// Cumulative block device bytes read.
    pub block_read_bytes: u64,
    /// Cumulative block device bytes written.
    pub block_write_bytes: u64,
    /// Number of processes/threads in the container's pid namespace.
    pub pid_count: u64,
}

/// A single line of container log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Which stream the line came from.
    pub stream: LogStream,
    /// RFC3339 timestamp, if Docker reported one.
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Line content, without the trailing newline.
    pub message: String,
}

/// Which output stream a [`LogLine`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Inspection result for a container, as needed by the orchestrator's monitoring reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInspection {
    /// Docker-assigned container id.
    pub id: String,
    /// Running/exited/etc, as reported by `docker inspect`.
    pub status: String,
    /// Resolved host-port publications, keyed by `container_port/protocol`.
    pub published_ports: HashMap<String, u16>,
    /// Whether the configured healthcheck currently reports healthy.
    pub healthy: Option<bool>,
}

/// The capability set C6 needs from any Docker backend, local or SSH-tunneled.
///
/// Implementations shell out to the `docker` CLI ([`ProcessExecutor`]); the only behavioral
/// difference between [`LocalDockerClient`] and a node reached over SSH is the `DOCKER_HOST`
/// the process sees, which the [`NodePool`] arranges via a local tunnel listener.
#[async_trait]
pub trait DockerClient: Send + Sync {
    /// Pulls `image_ref`, tolerant of it already being present locally.
    async fn pull_image(&self, image_ref: &str) -> Result<(), TransportError>;

    /// Creates a bridge network named `name` with the given labels.
    async fn create_network(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), TransportError>;

    /// Removes network `name`.
    async fn remove_network(&self, name: &str) -> Result<(), TransportError>;

    /// Creates a named local-driver volume.
    async fn create_volume(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), TransportError>;

    /// Removes volume `name`.
    async fn remove_volume(&self, name: &str) -> Result<(), TransportError>;

    /// Creates (but does not start) a container from `spec`, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, TransportError>;

    /// Starts a previously created container.
    async fn start_container(&self, id: &str) -> Result<(), TransportError>;

    /// Stops a container, allowing up to `timeout` for graceful shutdown.
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), TransportError>;

    /// Removes a container. `force` also removes it while still running.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), TransportError>;

    /// Inspects a container's current state.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, TransportError>;

    /// Streams resource usage samples for a running container until the stream is dropped.
    async fn container_stats(
        &self,
        id: &str,
    ) -> Result<BoxStream<'static, Result<ContainerStats, TransportError>>, TransportError>;

    /// Streams log lines for a container, optionally limited to the last `tail` lines and
    /// to those emitted after `since`.
    async fn container_logs(
        &self,
        id: &str,
        tail: Option<u32>,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<BoxStream<'static, Result<LogLine, TransportError>>, TransportError>;

    /// Copies `bytes` into the container at `path`, used for config-file injection.
    async fn copy_to_container(&self, id: &str, path: &str, bytes: &[u8]) -> Result<(), TransportError>;

    /// Verifies the Docker daemon backing this client is reachable.
    async fn ping(&self) -> Result<(), TransportError>;
}
