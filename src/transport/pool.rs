//! Per-node Docker client cache: local nodes get a direct [`LocalDockerClient`]; remote
//! nodes get one bridged through an [`ssh::Tunnel`](super::ssh::Tunnel) whose lifetime the
//! pool owns alongside the client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Node, SshKey};

use super::ssh::{HelperAgentBinaries, Tunnel};
use super::{DockerClient, LocalDockerClient, TransportError};

/// A cached Docker client plus bookkeeping the pool uses for idle eviction.
pub struct PooledClient {
    /// The client itself, dynamically dispatched over local/SSH backends.
    pub client: Arc<dyn DockerClient>,
    /// Tunnel keeping a remote node's bridged socket alive; `None` for local nodes.
    tunnel: Option<Tunnel>,
    last_used: Instant,
}

/// Caches one [`PooledClient`] per node, evicting entries idle past a TTL.
pub struct NodePool {
    clients: Mutex<HashMap<Uuid, PooledClient>>,
    idle_ttl: Duration,
    helper_agent_binaries: HelperAgentBinaries,
}

impl NodePool {
    /// Builds an empty pool evicting clients idle for longer than `idle_ttl`, and spawns a
    /// background task that periodically sweeps for and evicts idle entries even if `get`
    /// is never called for them again. `binaries` supplies the compiled helper-agent
    /// binaries this pool uploads to remote nodes on first contact; embedding the actual
    /// bytes is the caller's responsibility.
    #[must_use]
    pub fn new(idle_ttl: Duration, binaries: HelperAgentBinaries) -> Arc<Self> {
        let pool = Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            idle_ttl,
            helper_agent_binaries: binaries,
        });

        let weak = Arc::downgrade(&pool);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(idle_ttl.max(Duration::from_secs(1)));
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                let Some(pool) = weak.upgrade() else {
                    break;
                };
                pool.sweep_idle().await;
            }
        });

        pool
    }

    /// Evicts every cached client whose `last_used` exceeds `idle_ttl`, closing their
    /// tunnels. Runs both from the background sweep task and can be called directly by
    /// tests.
    async fn sweep_idle(&self) {
        let mut clients = self.clients.lock().await;
        let idle_ttl = self.idle_ttl;
        clients.retain(|node_id, entry| {
            let keep = entry.last_used.elapsed() < idle_ttl;
            if !keep {
                debug!(node_id = %node_id, "sweeping idle pooled docker client");
            }
            keep
        });
    }

    /// Returns a live Docker client for `node`, establishing one if the cache is empty or
    /// its entry has gone idle past the TTL.
    ///
    /// For a node with no SSH key configured and a loopback host, this is a direct
    /// [`LocalDockerClient`]. Otherwise an SSH tunnel is opened (or reused) and the client
    /// is pointed at the bridged socket's local address.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoClient`] wrapping the underlying failure if neither an
    /// existing nor a freshly established client could be obtained.
    pub async fn get(&self, node: &Node, ssh_key: Option<&SshKey>) -> Result<Arc<dyn DockerClient>, TransportError> {
        let mut clients = self.clients.lock().await;

        if let Some(entry) = clients.get_mut(&node.id) {
            if entry.last_used.elapsed() < self.idle_ttl {
                entry.last_used = Instant::now();
                return Ok(Arc::clone(&entry.client));
            }
            debug!(node_id = %node.id, "evicting idle pooled docker client");
            clients.remove(&node.id);
        }

        let entry = self.establish(node, ssh_key).await?;
        let client = Arc::clone(&entry.client);
        clients.insert(node.id, entry);
        Ok(client)
    }

    /// Drops the cached client (and tunnel, if any) for `node_id`, if present.
    pub async fn evict(&self, node_id: Uuid) {
        self.clients.lock().await.remove(&node_id);
    }

    async fn establish(&self, node: &Node, ssh_key: Option<&SshKey>) -> Result<PooledClient, TransportError> {
        if is_local(node) {
            info!(node_id = %node.id, "establishing local docker client");
            let client = LocalDockerClient::with_docker_host(format!("unix://{}", node.docker_socket_path))?;
            return Ok(PooledClient {
                client: Arc::new(client),
                tunnel: None,
                last_used: Instant::now(),
            });
        }

        let key = ssh_key.ok_or_else(|| {
            TransportError::Ssh(format!("node {} has no configured ssh key", node.id))
        })?;

        info!(node_id = %node.id, host = %node.ssh.host, "opening ssh tunnel to remote docker socket");
        let tunnel = Tunnel::open(
            &node.ssh,
            key,
            node.arch,
            &self.helper_agent_binaries,
            &node.docker_socket_path,
        )
        .await
        .map_err(|e| {
            warn!(node_id = %node.id, error = %e, "ssh tunnel establishment failed");
            e
        })?;

        let client = LocalDockerClient::with_docker_host(format!("tcp://{}", tunnel.local_addr()))?;

        Ok(PooledClient {
            client: Arc::new(client),
            tunnel: Some(tunnel),
            last_used: Instant::now(),
        })
    }
}

fn is_local(node: &Node) -> bool {
    matches!(node.ssh.host.as_str(), "localhost" | "127.0.0.1" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capacity, NodeArch, NodeStatus, SshEndpoint};
    use std::collections::HashSet;

    fn local_node() -> Node {
        Node {
            id: Uuid::new_v4(),
            name: "local".to_string(),
            creator_id: Uuid::new_v4(),
            ssh: SshEndpoint {
                host: "localhost".to_string(),
                port: 22,
                user: "hoster".to_string(),
            },
            ssh_key_id: None,
            docker_socket_path: Node::DEFAULT_DOCKER_SOCKET.to_string(),
            arch: NodeArch::Amd64,
            status: NodeStatus::Online,
            capabilities: HashSet::new(),
            capacity: Capacity {
                cpu_total: 1.0,
                cpu_used: 0.0,
                memory_total_mb: 1024,
                memory_used_mb: 0,
                disk_total_mb: 1024,
                disk_used_mb: 0,
            },
            location: None,
            last_health_check: None,
            last_error: None,
            base_domain: None,
            public: false,
        }
    }

    #[test]
    fn loopback_hosts_are_treated_as_local() {
        assert!(is_local(&local_node()));
        let mut remote = local_node();
        remote.ssh.host = "203.0.113.9".to_string();
        assert!(!is_local(&remote));
    }
}
