//! Orchestrator (C6): composes C1-C5 into deployment creation and the three lifecycles,
//! serializing every operation on a given deployment behind a per-deployment lock.

mod config_files;
mod container_spec;
mod lifecycle;
mod monitor;

pub use lifecycle::DEFAULT_STOP_TIMEOUT;
pub use monitor::{ContainerHealth, ContainerStatsSnapshot, DeploymentHealth, DeploymentStats, LogEntry};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::compose;
use crate::config::HosterConfig;
use crate::errors::HosterResult;
use crate::model::{Deployment, Domain, MeterEventType, Status};
use crate::naming;
use crate::ports;
use crate::scheduler::{self, ScheduleRequest};
use crate::storage::{DeploymentFilter, Storage};
use crate::transport::NodePool;
use crate::usage;

/// Fields a caller supplies to instantiate a deployment from a template.
#[derive(Debug, Clone)]
pub struct CreateDeploymentRequest {
    /// Template to instantiate.
    pub template_id: Uuid,
    /// Owning customer.
    pub customer_id: Uuid,
    /// Values for the template's declared variables.
    pub variables: HashMap<String, String>,
    /// Node the caller would like to reuse, if still eligible.
    pub preferred_node_id: Option<Uuid>,
    /// Request a generated `{name}.{base_domain}` hostname in addition to any the template
    /// wants by default. Set to `false` for deployments that will only be reached through
    /// custom domains added later.
    pub generate_domain: bool,
}

/// Ties together the pure core (C1-C4) and the node-pool transport (C5) behind one
/// per-deployment advisory lock, so that concurrent callers never run two lifecycle
/// operations against the same deployment at once.
///
/// The lock is intentionally coarse (one [`tokio::sync::Mutex`] per deployment id, held for
/// the duration of the whole operation) rather than fine-grained: deployment operations are
/// rare and slow (seconds), not a hot path that would benefit from finer striping.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    pool: Arc<NodePool>,
    config: HosterConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    /// Builds an orchestrator over the given storage backend, node pool, and configuration.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, pool: Arc<NodePool>, config: HosterConfig) -> Self {
        Self {
            storage,
            pool,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, deployment_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(deployment_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Validates the template's required variables, schedules a node, allocates a proxy
    /// port, and persists a new `pending`-then-`scheduled` deployment. Does not start any
    /// containers; call [`Orchestrator::start`] with the returned id to do that.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::HosterError::MissingVariable`] if a required variable is
    /// absent, [`crate::errors::HosterError::ComposeInvalid`] if the template's Compose
    /// document does not parse, [`crate::errors::HosterError::NoOnlineNodes`] if no node
    /// passes the scheduler's filters, or [`crate::errors::HosterError::NoFreePort`] if the
    /// chosen node's proxy-port range is exhausted.
    pub async fn create_deployment(&self, request: CreateDeploymentRequest) -> HosterResult<Deployment> {
        let template = self.storage.get_template(request.template_id).await?;
        template.validate_variables(&request.variables)?;
        compose::parse(&template.compose)?;

        let nodes = self.storage.list_nodes().await?;
        let all_deployments = self.storage.list_deployments(&DeploymentFilter::default()).await?;
        let schedule = scheduler::select_node(
            &ScheduleRequest {
                template: &template,
                creator_id: template.creator_id,
                preferred_node_id: request.preferred_node_id,
            },
            &nodes,
            |node_id| all_deployments.iter().filter(|d| d.node_id == Some(node_id) && d.status.is_live()).count(),
        )?;

        let node = self.storage.get_node(schedule.node_id).await?;
        let used_ports = self.storage.list_used_proxy_ports_by_node(node.id).await?;
        let proxy_port = ports::allocate(
            node.id,
            &used_ports,
            self.config.proxy_port_range_lo,
            self.config.proxy_port_range_hi,
        )?;

        let slug = template.slug();
        let name = naming::generate_deployment_name(&slug);
        let domains = if request.generate_domain {
            let base = node.effective_base_domain(&self.config.domain_base_domain);
            vec![Domain::auto(naming::generate_domain(&name, base))]
        } else {
            Vec::new()
        };

        let now = Utc::now();
        let mut deployment = Deployment {
            id: Uuid::new_v4(),
            name,
            template_id: template.id,
            template_version: template.version,
            customer_id: request.customer_id,
            node_id: Some(node.id),
            status: Status::Pending,
            variables: request.variables,
            domains,
            containers: Vec::new(),
            resources: template.resources,
            proxy_port: Some(proxy_port),
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            stopped_at: None,
        };

        deployment.transition(Status::Scheduled)?;
        let deployment = self.storage.create_deployment(deployment).await?;

        usage::record_deployment_event(
            self.storage.as_ref(),
            deployment.customer_id,
            deployment.id,
            MeterEventType::DeploymentCreated,
            HashMap::new(),
        )
        .await;
        info!(deployment_id = %deployment.id, node_id = %node.id, "deployment scheduled");

        Ok(deployment)
    }

    /// Brings a scheduled (or previously stopped/failed) deployment's containers up.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::start`].
    pub async fn start(&self, deployment_id: Uuid) -> HosterResult<Deployment> {
        let lock = self.lock_for(deployment_id).await;
        let _guard = lock.lock().await;
        lifecycle::start(self.storage.as_ref(), &self.pool, &self.config, deployment_id).await
    }

    /// Stops a running deployment's containers without removing them.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::stop`].
    pub async fn stop(&self, deployment_id: Uuid) -> HosterResult<Deployment> {
        self.stop_with_timeout(deployment_id, DEFAULT_STOP_TIMEOUT).await
    }

    /// As [`Orchestrator::stop`], with an explicit graceful-shutdown grace period.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::stop`].
    pub async fn stop_with_timeout(&self, deployment_id: Uuid, timeout: Duration) -> HosterResult<Deployment> {
        let lock = self.lock_for(deployment_id).await;
        let _guard = lock.lock().await;
        lifecycle::stop(self.storage.as_ref(), &self.pool, deployment_id, timeout).await
    }

    /// Tears a deployment down entirely: containers, network, volumes, config files, and
    /// its proxy-port reservation.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::remove`].
    pub async fn remove(&self, deployment_id: Uuid) -> HosterResult<Deployment> {
        let lock = self.lock_for(deployment_id).await;
        let _guard = lock.lock().await;
        let result = lifecycle::remove(self.storage.as_ref(), &self.pool, &self.config, deployment_id).await;
        self.locks.lock().await.remove(&deployment_id);
        result
    }

    /// Samples current resource usage for every live container of a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment, its node, or its Docker client cannot be
    /// resolved, or if a container's stats stream fails.
    pub async fn stats(&self, deployment_id: Uuid) -> HosterResult<DeploymentStats> {
        monitor::stats(self.storage.as_ref(), &self.pool, deployment_id).await
    }

    /// Fetches and merges log output across every container of a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment, its node, or its Docker client cannot be
    /// resolved, or if a container's log stream fails.
    pub async fn logs(
        &self,
        deployment_id: Uuid,
        tail: Option<u32>,
        since: Option<chrono::DateTime<Utc>>,
    ) -> HosterResult<Vec<LogEntry>> {
        monitor::logs(self.storage.as_ref(), &self.pool, deployment_id, tail, since).await
    }

    /// Aggregates per-container health into one overall status for a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment, its node, or its Docker client cannot be
    /// resolved.
    pub async fn health(&self, deployment_id: Uuid) -> HosterResult<DeploymentHealth> {
        monitor::health(self.storage.as_ref(), &self.pool, deployment_id).await
    }
}

#[cfg(all(test, feature = "memory-storage"))]
mod tests {
    use super::*;
    use crate::model::{Capacity, Node, NodeArch, NodeStatus, Resources as ModelResources, Template};
    use crate::storage::MemoryStorage;
    use crate::transport::NodePool;
    use std::collections::HashSet;

    fn sample_template(creator_id: Uuid) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "static site".to_string(),
            version: (1, 0, 0),
            compose: "services:\n  web:\n    image: nginx:latest\n    ports:\n      - \"80:80\"\n".to_string(),
            variables: vec![],
            config_files: vec![],
            resources: ModelResources {
                cpu_cores: 0.5,
                memory_mb: 256,
                disk_mb: 512,
            },
            required_capabilities: HashSet::new(),
            price_cents: 0,
            published: true,
            creator_id,
        }
    }

    fn sample_node(creator_id: Uuid) -> Node {
        Node {
            id: Uuid::new_v4(),
            name: "node-a".to_string(),
            creator_id,
            ssh: crate::model::SshEndpoint {
                host: "127.0.0.1".to_string(),
                port: 22,
                user: "hoster".to_string(),
            },
            ssh_key_id: None,
            docker_socket_path: Node::DEFAULT_DOCKER_SOCKET.to_string(),
            arch: NodeArch::Amd64,
            status: NodeStatus::Online,
            capabilities: HashSet::new(),
            capacity: Capacity {
                cpu_total: 4.0,
                cpu_used: 0.0,
                memory_total_mb: 8192,
                memory_used_mb: 0,
                disk_total_mb: 102_400,
                disk_used_mb: 0,
            },
            location: None,
            last_health_check: None,
            last_error: None,
            base_domain: None,
            public: true,
        }
    }

    #[tokio::test]
    async fn create_deployment_schedules_and_allocates_a_port() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let creator_id = Uuid::new_v4();
        let template = sample_template(creator_id);
        let node = sample_node(creator_id);
        storage.create_template(template.clone()).await.unwrap();
        storage.create_node(node.clone()).await.unwrap();

        let pool = NodePool::new(
            Duration::from_secs(60),
            crate::transport::ssh::HelperAgentBinaries { amd64: &[], arm64: &[] },
        );
        let config = HosterConfig {
            server_port: 8080,
            database_dsn: None,
            data_dir: std::env::temp_dir(),
            domain_base_domain: "apps.example.com".to_string(),
            docker_host: None,
            encryption_key: None,
            app_proxy_address: "127.0.0.1".to_string(),
            proxy_port_range_lo: 30_000,
            proxy_port_range_hi: 30_010,
        };
        let orchestrator = Orchestrator::new(storage.clone(), pool, config);

        let deployment = orchestrator
            .create_deployment(CreateDeploymentRequest {
                template_id: template.id,
                customer_id: Uuid::new_v4(),
                variables: HashMap::new(),
                preferred_node_id: None,
                generate_domain: true,
            })
            .await
            .unwrap();

        assert_eq!(deployment.node_id, Some(node.id));
        assert_eq!(deployment.proxy_port, Some(30_000));
        assert_eq!(deployment.status, Status::Scheduled);
        assert_eq!(deployment.domains.len(), 1);
    }

    #[tokio::test]
    async fn create_deployment_rejects_missing_required_variable() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let creator_id = Uuid::new_v4();
        let mut template = sample_template(creator_id);
        template.variables.push(crate::model::Variable {
            name: "DB_PASSWORD".to_string(),
            kind: crate::model::VariableType::Password,
            required: true,
            options: vec![],
        });
        storage.create_template(template.clone()).await.unwrap();

        let pool = NodePool::new(
            Duration::from_secs(60),
            crate::transport::ssh::HelperAgentBinaries { amd64: &[], arm64: &[] },
        );
        let config = HosterConfig {
            server_port: 8080,
            database_dsn: None,
            data_dir: std::env::temp_dir(),
            domain_base_domain: "apps.example.com".to_string(),
            docker_host: None,
            encryption_key: None,
            app_proxy_address: "127.0.0.1".to_string(),
            proxy_port_range_lo: 30_000,
            proxy_port_range_hi: 30_010,
        };
        let orchestrator = Orchestrator::new(storage, pool, config);

        let err = orchestrator
            .create_deployment(CreateDeploymentRequest {
                template_id: template.id,
                customer_id: Uuid::new_v4(),
                variables: HashMap::new(),
                preferred_node_id: None,
                generate_domain: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, crate::errors::HosterError::MissingVariable { .. }));
    }
}
