//! Storage contract: the durable-persistence boundary every other component is written
//! against, plus an in-memory reference implementation for tests and single-process
//! embedders.
//!
//! Every component in this crate takes `&dyn Storage` (or a generic `S: Storage`) rather
//! than owning a concrete backend, the same way [`crate::transport::DockerClient`]
//! decouples the orchestrator from any one Docker transport.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::errors::HosterResult;
use crate::model::{
    ContainerEvent, ContainerEventType, Deployment, MeterEvent, Node, SshKey, Template,
};

/// Optional filters for [`Storage::list_deployments`].
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    /// Restrict to deployments instantiated from this template.
    pub template_id: Option<Uuid>,
    /// Restrict to deployments owned by this customer.
    pub customer_id: Option<Uuid>,
}

/// The durable-persistence boundary for every entity in the data model. Reads return
/// owned copies; concurrent writers to the same entity are last-writer-wins at row
/// granularity except for proxy-port allocation and node-capacity accounting, which need a
/// single transaction and which callers must serialize themselves (see
/// [`crate::orchestrator`] and [`crate::scheduler`]).
#[async_trait]
pub trait Storage: Send + Sync {
    // ---- Templates --------------------------------------------------------------
    /// Persists a newly created template.
    async fn create_template(&self, template: Template) -> HosterResult<Template>;
    /// Looks up a template by id.
    async fn get_template(&self, id: Uuid) -> HosterResult<Template>;
    /// Lists every template.
    async fn list_templates(&self) -> HosterResult<Vec<Template>>;
    /// Lists templates owned by `creator_id`.
    async fn list_templates_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<Template>>;
    /// Overwrites a template's stored row. Callers must have already checked
    /// [`crate::model::Template::is_editable`]; this method does not re-validate.
    async fn update_template(&self, template: Template) -> HosterResult<Template>;
    /// Deletes a template. Fails with [`crate::errors::HosterError::TemplateHasLiveDeployments`]
    /// if any non-deleted deployment still references it.
    async fn delete_template(&self, id: Uuid) -> HosterResult<()>;

    // ---- Deployments -------------------------------------------------------------
    /// Persists a newly created deployment.
    async fn create_deployment(&self, deployment: Deployment) -> HosterResult<Deployment>;
    /// Looks up a deployment by id.
    async fn get_deployment(&self, id: Uuid) -> HosterResult<Deployment>;
    /// Lists deployments matching `filter`.
    async fn list_deployments(&self, filter: &DeploymentFilter) -> HosterResult<Vec<Deployment>>;
    /// Overwrites a deployment's entire stored row.
    async fn update_deployment(&self, deployment: Deployment) -> HosterResult<Deployment>;
    /// Deletes a deployment's stored row outright (distinct from the `deleting`/`deleted`
    /// lifecycle states, which are ordinary `update_deployment` calls).
    async fn delete_deployment(&self, id: Uuid) -> HosterResult<()>;
    /// Returns the set of proxy ports currently allocated to live deployments on `node_id`,
    /// used by [`crate::ports::allocate`]'s caller to compute the free set.
    async fn list_used_proxy_ports_by_node(&self, node_id: Uuid) -> HosterResult<HashSet<u16>>;

    // ---- Nodes ---------------------------------------------------------------------
    /// Persists a newly registered node.
    async fn create_node(&self, node: Node) -> HosterResult<Node>;
    /// Looks up a node by id.
    async fn get_node(&self, id: Uuid) -> HosterResult<Node>;
    /// Lists every node.
    async fn list_nodes(&self) -> HosterResult<Vec<Node>>;
    /// Lists nodes owned by `creator_id`.
    async fn list_nodes_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<Node>>;
    /// Overwrites a node's stored row (status, capacity, health fields, ...).
    async fn update_node(&self, node: Node) -> HosterResult<Node>;
    /// Deletes a node. Fails with [`crate::errors::HosterError::NodeHasLiveDeployments`] if
    /// any non-deleted deployment is still scheduled on it.
    async fn delete_node(&self, id: Uuid) -> HosterResult<()>;

    // ---- SSH keys --------------------------------------------------------------------
    /// Persists a newly created, already-encrypted SSH key.
    async fn create_ssh_key(&self, key: SshKey) -> HosterResult<SshKey>;
    /// Looks up an SSH key by id.
    async fn get_ssh_key(&self, id: Uuid) -> HosterResult<SshKey>;
    /// Lists SSH keys owned by `creator_id`.
    async fn list_ssh_keys_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<SshKey>>;
    /// Deletes an SSH key. Callers are responsible for checking no node still references it.
    async fn delete_ssh_key(&self, id: Uuid) -> HosterResult<()>;

    // ---- Container events --------------------------------------------------------------
    /// Appends an immutable container lifecycle event.
    async fn append_container_event(&self, event: ContainerEvent) -> HosterResult<()>;
    /// Lists events for `deployment_id`, optionally filtered by `event_type`, newest first,
    /// capped at `limit`.
    async fn list_container_events(
        &self,
        deployment_id: Uuid,
        event_type: Option<ContainerEventType>,
        limit: usize,
    ) -> HosterResult<Vec<ContainerEvent>>;

    // ---- Meter events --------------------------------------------------------------------
    /// Appends an immutable billing meter event.
    async fn append_meter_event(&self, event: MeterEvent) -> HosterResult<()>;
    /// Lists meter events that have not yet been reported to the external billing
    /// collector (`reported_at.is_none()`).
    async fn list_unreported_meter_events(&self) -> HosterResult<Vec<MeterEvent>>;
    /// Stamps `reported_at` on the named events after a background reporter has forwarded
    /// them.
    async fn mark_meter_events_reported(&self, ids: &[Uuid]) -> HosterResult<()>;
}

#[cfg(feature = "memory-storage")]
pub use memory::MemoryStorage;

#[cfg(feature = "memory-storage")]
mod memory {
    use super::{DeploymentFilter, Storage};
    use crate::errors::{HosterError, HosterResult};
    use crate::model::{ContainerEvent, ContainerEventType, Deployment, MeterEvent, Node, SshKey, Template};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;
    use uuid::Uuid;

    /// A process-local, non-durable [`Storage`] implementation over `tokio::sync::RwLock`-
    /// guarded maps. Suitable for the crate's own test suite and for embedders that want a
    /// zero-dependency starting point; not a substitute for a real database (out of scope).
    #[derive(Default)]
    pub struct MemoryStorage {
        templates: RwLock<HashMap<Uuid, Template>>,
        deployments: RwLock<HashMap<Uuid, Deployment>>,
        nodes: RwLock<HashMap<Uuid, Node>>,
        ssh_keys: RwLock<HashMap<Uuid, SshKey>>,
        container_events: RwLock<Vec<ContainerEvent>>,
        meter_events: RwLock<HashMap<Uuid, MeterEvent>>,
    }

    impl MemoryStorage {
        /// Builds an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn not_found(kind: &'static str, id: Uuid) -> HosterError {
        HosterError::NotFound { kind, id }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn create_template(&self, template: Template) -> HosterResult<Template> {
            let mut templates = self.templates.write().await;
            templates.insert(template.id, template.clone());
            Ok(template)
        }

        async fn get_template(&self, id: Uuid) -> HosterResult<Template> {
            self.templates
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("template", id))
        }

        async fn list_templates(&self) -> HosterResult<Vec<Template>> {
            Ok(self.templates.read().await.values().cloned().collect())
        }

        async fn list_templates_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<Template>> {
            Ok(self
                .templates
                .read()
                .await
                .values()
                .filter(|t| t.creator_id == creator_id)
                .cloned()
                .collect())
        }

        async fn update_template(&self, template: Template) -> HosterResult<Template> {
            let mut templates = self.templates.write().await;
            if !templates.contains_key(&template.id) {
                return Err(not_found("template", template.id));
            }
            templates.insert(template.id, template.clone());
            Ok(template)
        }

        async fn delete_template(&self, id: Uuid) -> HosterResult<()> {
            let live = self
                .deployments
                .read()
                .await
                .values()
                .filter(|d| d.template_id == id && d.status.is_live())
                .count();
            if live > 0 {
                return Err(HosterError::TemplateHasLiveDeployments { id, count: live });
            }
            self.templates
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("template", id))
        }

        async fn create_deployment(&self, deployment: Deployment) -> HosterResult<Deployment> {
            let mut deployments = self.deployments.write().await;
            deployments.insert(deployment.id, deployment.clone());
            Ok(deployment)
        }

        async fn get_deployment(&self, id: Uuid) -> HosterResult<Deployment> {
            self.deployments
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("deployment", id))
        }

        async fn list_deployments(&self, filter: &DeploymentFilter) -> HosterResult<Vec<Deployment>> {
            Ok(self
                .deployments
                .read()
                .await
                .values()
                .filter(|d| filter.template_id.is_none_or(|id| d.template_id == id))
                .filter(|d| filter.customer_id.is_none_or(|id| d.customer_id == id))
                .cloned()
                .collect())
        }

        async fn update_deployment(&self, deployment: Deployment) -> HosterResult<Deployment> {
            let mut deployments = self.deployments.write().await;
            if !deployments.contains_key(&deployment.id) {
                return Err(not_found("deployment", deployment.id));
            }
            deployments.insert(deployment.id, deployment.clone());
            Ok(deployment)
        }

        async fn delete_deployment(&self, id: Uuid) -> HosterResult<()> {
            self.deployments
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("deployment", id))
        }

        async fn list_used_proxy_ports_by_node(&self, node_id: Uuid) -> HosterResult<HashSet<u16>> {
            Ok(self
                .deployments
                .read()
                .await
                .values()
                .filter(|d| d.node_id == Some(node_id) && d.status.is_live())
                .filter_map(|d| d.proxy_port)
                .collect())
        }

        async fn create_node(&self, node: Node) -> HosterResult<Node> {
            let mut nodes = self.nodes.write().await;
            nodes.insert(node.id, node.clone());
            Ok(node)
        }

        async fn get_node(&self, id: Uuid) -> HosterResult<Node> {
            self.nodes
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("node", id))
        }

        async fn list_nodes(&self) -> HosterResult<Vec<Node>> {
            Ok(self.nodes.read().await.values().cloned().collect())
        }

        async fn list_nodes_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<Node>> {
            Ok(self
                .nodes
                .read()
                .await
                .values()
                .filter(|n| n.creator_id == creator_id)
                .cloned()
                .collect())
        }

        async fn update_node(&self, node: Node) -> HosterResult<Node> {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains_key(&node.id) {
                return Err(not_found("node", node.id));
            }
            nodes.insert(node.id, node.clone());
            Ok(node)
        }

        async fn delete_node(&self, id: Uuid) -> HosterResult<()> {
            let live = self
                .deployments
                .read()
                .await
                .values()
                .filter(|d| d.node_id == Some(id) && d.status.is_live())
                .count();
            if live > 0 {
                return Err(HosterError::NodeHasLiveDeployments { id, count: live });
            }
            self.nodes
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("node", id))
        }

        async fn create_ssh_key(&self, key: SshKey) -> HosterResult<SshKey> {
            let mut keys = self.ssh_keys.write().await;
            keys.insert(key.id, key.clone());
            Ok(key)
        }

        async fn get_ssh_key(&self, id: Uuid) -> HosterResult<SshKey> {
            self.ssh_keys
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("ssh_key", id))
        }

        async fn list_ssh_keys_by_creator(&self, creator_id: Uuid) -> HosterResult<Vec<SshKey>> {
            Ok(self
                .ssh_keys
                .read()
                .await
                .values()
                .filter(|k| k.creator_id == creator_id)
                .cloned()
                .collect())
        }

        async fn delete_ssh_key(&self, id: Uuid) -> HosterResult<()> {
            self.ssh_keys
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("ssh_key", id))
        }

        async fn append_container_event(&self, event: ContainerEvent) -> HosterResult<()> {
            self.container_events.write().await.push(event);
            Ok(())
        }

        async fn list_container_events(
            &self,
            deployment_id: Uuid,
            event_type: Option<ContainerEventType>,
            limit: usize,
        ) -> HosterResult<Vec<ContainerEvent>> {
            let events = self.container_events.read().await;
            let mut matched: Vec<ContainerEvent> = events
                .iter()
                .filter(|e| e.deployment_id == deployment_id)
                .filter(|e| event_type.is_none_or(|t| e.event_type == t))
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            matched.truncate(limit);
            Ok(matched)
        }

        async fn append_meter_event(&self, event: MeterEvent) -> HosterResult<()> {
            self.meter_events.write().await.insert(event.id, event);
            Ok(())
        }

        async fn list_unreported_meter_events(&self) -> HosterResult<Vec<MeterEvent>> {
            Ok(self
                .meter_events
                .read()
                .await
                .values()
                .filter(|e| e.reported_at.is_none())
                .cloned()
                .collect())
        }

        async fn mark_meter_events_reported(&self, ids: &[Uuid]) -> HosterResult<()> {
            let mut events = self.meter_events.write().await;
            let now = chrono::Utc::now();
            for id in ids {
                if let Some(event) = events.get_mut(id) {
                    event.reported_at = Some(now);
                }
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::model::{Capacity, NodeArch, NodeStatus, Resources, SshEndpoint, Status};
        use std::collections::HashSet as StdHashSet;

        fn sample_template() -> Template {
            Template {
                id: Uuid::new_v4(),
                name: "Nginx".to_string(),
                version: (1, 0, 0),
                compose: "services:\n  web:\n    image: nginx\n".to_string(),
                variables: vec![],
                config_files: vec![],
                resources: Resources::zero(),
                required_capabilities: StdHashSet::new(),
                price_cents: 0,
                published: false,
                creator_id: Uuid::new_v4(),
            }
        }

        fn sample_node(creator_id: Uuid) -> Node {
            Node {
                id: Uuid::new_v4(),
                name: "node-1".to_string(),
                creator_id,
                ssh: SshEndpoint {
                    host: "localhost".to_string(),
                    port: 22,
                    user: "hoster".to_string(),
                },
                ssh_key_id: None,
                docker_socket_path: Node::DEFAULT_DOCKER_SOCKET.to_string(),
                arch: NodeArch::Amd64,
                status: NodeStatus::Online,
                capabilities: StdHashSet::new(),
                capacity: Capacity {
                    cpu_total: 4.0,
                    cpu_used: 0.0,
                    memory_total_mb: 8192,
                    memory_used_mb: 0,
                    disk_total_mb: 100_000,
                    disk_used_mb: 0,
                },
                location: None,
                last_health_check: None,
                last_error: None,
                base_domain: None,
                public: false,
            }
        }

        #[tokio::test]
        async fn create_then_get_round_trips() {
            let storage = MemoryStorage::new();
            let template = sample_template();
            storage.create_template(template.clone()).await.unwrap();
            let fetched = storage.get_template(template.id).await.unwrap();
            assert_eq!(fetched.id, template.id);
        }

        #[tokio::test]
        async fn get_missing_template_is_not_found() {
            let storage = MemoryStorage::new();
            let err = storage.get_template(Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, HosterError::NotFound { kind: "template", .. }));
        }

        #[tokio::test]
        async fn delete_template_with_live_deployment_fails() {
            let storage = MemoryStorage::new();
            let template = sample_template();
            storage.create_template(template.clone()).await.unwrap();

            let node = sample_node(template.creator_id);
            storage.create_node(node.clone()).await.unwrap();

            let now = chrono::Utc::now();
            let deployment = Deployment {
                id: Uuid::new_v4(),
                name: "nginx-a1b2c3".to_string(),
                template_id: template.id,
                template_version: template.version,
                customer_id: Uuid::new_v4(),
                node_id: Some(node.id),
                status: Status::Running,
                variables: HashMap::new(),
                domains: vec![],
                containers: vec![],
                resources: Resources::zero(),
                proxy_port: Some(30_000),
                last_error: None,
                created_at: now,
                updated_at: now,
                started_at: Some(now),
                stopped_at: None,
            };
            storage.create_deployment(deployment).await.unwrap();

            let err = storage.delete_template(template.id).await.unwrap_err();
            assert!(matches!(err, HosterError::TemplateHasLiveDeployments { .. }));
        }

        #[tokio::test]
        async fn used_proxy_ports_filters_by_node_and_liveness() {
            let storage = MemoryStorage::new();
            let template = sample_template();
            storage.create_template(template.clone()).await.unwrap();
            let node = sample_node(template.creator_id);
            storage.create_node(node.clone()).await.unwrap();

            let now = chrono::Utc::now();
            let mk = |status: Status, port: u16| Deployment {
                id: Uuid::new_v4(),
                name: format!("nginx-{port}"),
                template_id: template.id,
                template_version: template.version,
                customer_id: Uuid::new_v4(),
                node_id: Some(node.id),
                status,
                variables: HashMap::new(),
                domains: vec![],
                containers: vec![],
                resources: Resources::zero(),
                proxy_port: Some(port),
                last_error: None,
                created_at: now,
                updated_at: now,
                started_at: None,
                stopped_at: None,
            };
            storage.create_deployment(mk(Status::Running, 30_000)).await.unwrap();
            storage.create_deployment(mk(Status::Deleted, 30_001)).await.unwrap();

            let used = storage.list_used_proxy_ports_by_node(node.id).await.unwrap();
            assert!(used.contains(&30_000));
            assert!(!used.contains(&30_001));
        }

        #[tokio::test]
        async fn container_events_ordered_newest_first_and_limited() {
            let storage = MemoryStorage::new();
            let deployment_id = Uuid::new_v4();
            for _ in 0..5 {
                storage
                    .append_container_event(ContainerEvent::new(
                        deployment_id,
                        ContainerEventType::ContainerStarted,
                        "hoster_x_web",
                        "started",
                    ))
                    .await
                    .unwrap();
            }
            let events = storage
                .list_container_events(deployment_id, None, 3)
                .await
                .unwrap();
            assert_eq!(events.len(), 3);
        }

        #[tokio::test]
        async fn unreported_meter_events_excludes_reported() {
            let storage = MemoryStorage::new();
            let event = MeterEvent::deployment(
                Uuid::new_v4(),
                crate::model::MeterEventType::DeploymentCreated,
                Uuid::new_v4(),
                HashMap::new(),
            );
            let id = event.id;
            storage.append_meter_event(event).await.unwrap();

            let unreported = storage.list_unreported_meter_events().await.unwrap();
            assert_eq!(unreported.len(), 1);

            storage.mark_meter_events_reported(&[id]).await.unwrap();
            let unreported = storage.list_unreported_meter_events().await.unwrap();
            assert!(unreported.is_empty());
        }
    }
}
