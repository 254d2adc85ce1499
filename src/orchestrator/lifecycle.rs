//! Start, stop, and remove lifecycles (C6).
//!
//! Each lifecycle is one serialized operation per deployment; [`super::Orchestrator`] holds
//! the per-deployment lock the concurrency model calls for and delegates the
//! actual work to the free functions here, which only assume they already hold it.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::compose::{self, ParsedSpec};
use crate::config::HosterConfig;
use crate::errors::{HosterError, HosterResult};
use crate::model::{
    ContainerEvent, ContainerEventType, ContainerInfo, Deployment, MeterEventType, Node, Status,
    Template,
};
use crate::storage::Storage;
use crate::transport::{DockerClient, TransportError};
use crate::usage;

use super::container_spec::{build_container_spec, pick_web_entrypoint, ProxyBinding};
use super::config_files;

/// Default grace period the stop lifecycle gives each container before killing it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

async fn client_for(storage: &dyn Storage, pool: &crate::transport::NodePool, node: &Node) -> HosterResult<std::sync::Arc<dyn DockerClient>> {
    let ssh_key = match node.ssh_key_id {
        Some(id) => Some(storage.get_ssh_key(id).await?),
        None => None,
    };
    pool.get(node, ssh_key.as_ref())
        .await
        .map_err(HosterError::Transport)
}

fn parsed_spec(template: &Template) -> HosterResult<ParsedSpec> {
    Ok(compose::parse(&template.compose)?)
}

async fn log_event(
    storage: &dyn Storage,
    deployment_id: Uuid,
    event_type: ContainerEventType,
    container_name: &str,
    message: impl Into<String>,
) {
    let event = ContainerEvent::new(deployment_id, event_type, container_name, message);
    if let Err(error) = storage.append_container_event(event).await {
        warn!(%error, deployment_id = %deployment_id, "failed to append container event");
    }
}

/// Runs the start lifecycle: parses the template's Compose document, creates the network
/// and named volumes, materializes config files, and brings up every service in dependency
/// order, publishing the entrypoint service on the deployment's allocated proxy port.
///
/// On any failure, containers already created are left in place (for postmortem inspection)
/// and the deployment transitions to `failed` with the triggering error recorded.
pub async fn start(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    config: &HosterConfig,
    deployment_id: Uuid,
) -> HosterResult<Deployment> {
    let mut deployment = storage.get_deployment(deployment_id).await?;
    let template = storage.get_template(deployment.template_id).await?;
    let node_id = deployment.node_id.ok_or(HosterError::InvalidTransition {
        from: deployment.status,
        to: Status::Starting,
    })?;
    let node = storage.get_node(node_id).await?;

    deployment.transition(Status::Starting)?;
    deployment = storage.update_deployment(deployment).await?;

    match run_start(storage, pool, config, &deployment, &template, &node).await {
        Ok(containers) => {
            deployment.containers = containers;
            deployment.transition(Status::Running)?;
            deployment = storage.update_deployment(deployment).await?;
            usage::record_deployment_event(
                storage,
                deployment.customer_id,
                deployment.id,
                MeterEventType::DeploymentStarted,
                HashMap::new(),
            )
            .await;
            info!(deployment_id = %deployment.id, "deployment started");
            Ok(deployment)
        }
        Err(error) => {
            warn!(deployment_id = %deployment.id, %error, "start lifecycle failed");
            deployment.transition_to_failed(error.to_string())?;
            storage.update_deployment(deployment).await?;
            Err(error)
        }
    }
}

async fn run_start(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    config: &HosterConfig,
    deployment: &Deployment,
    template: &Template,
    node: &Node,
) -> HosterResult<Vec<ContainerInfo>> {
    let spec = parsed_spec(template)?;
    let order = compose::topological_order(&spec).map_err(|e| {
        HosterError::ComposeInvalid(crate::compose::ParseError::InvalidYaml {
            field_path: "services.*.depends_on".to_string(),
            message: e.to_string(),
        })
    })?;
    let client = client_for(storage, pool, node).await?;

    let network_name = crate::naming::network_name(deployment.id);
    let mut network_labels = HashMap::new();
    network_labels.insert("hoster.deployment_id".to_string(), deployment.id.to_string());
    client.create_network(&network_name, &network_labels).await?;

    for volume in &spec.volumes {
        if volume.external {
            continue;
        }
        let name = crate::naming::volume_name(deployment.id, &volume.name);
        client.create_volume(&name, &HashMap::new()).await?;
    }

    config_files::materialize(&config.data_dir, deployment.id, &template.config_files).await?;

    let entrypoint_name = pick_web_entrypoint(&spec.services).map(|s| s.name.clone());
    let hostname = deployment.domains.first().map(|d| d.hostname.clone());

    let mut containers = Vec::with_capacity(order.len());
    for service_name in &order {
        let service = spec
            .services
            .iter()
            .find(|s| &s.name == service_name)
            .expect("topological_order only yields known service names");

        let env: HashMap<String, String> = service
            .env
            .iter()
            .map(|(k, v)| (k.clone(), compose::substitute(v, &deployment.variables)))
            .collect();

        let is_entrypoint = entrypoint_name.as_deref() == Some(service.name.as_str());
        let proxy = match (is_entrypoint, &hostname, deployment.proxy_port, service.ports.first()) {
            (true, Some(hostname), Some(host_port), Some(port)) => Some(ProxyBinding {
                hostname,
                container_port: port.target,
                host_port,
            }),
            _ => None,
        };

        let container_name = crate::naming::container_name(deployment.id, &service.name);
        let image = service.image.clone().unwrap_or_default();

        log_event(storage, deployment.id, ContainerEventType::ImagePulling, &container_name, &image).await;
        client.pull_image(&image).await?;
        log_event(storage, deployment.id, ContainerEventType::ImagePulled, &container_name, &image).await;

        let container_spec = build_container_spec(deployment.id, service, env, proxy);
        let container_id = client.create_container(&container_spec).await?;
        log_event(storage, deployment.id, ContainerEventType::ContainerCreated, &container_name, "created").await;

        config_files::copy_into_container(client.as_ref(), &container_id, &template.config_files).await?;

        client.start_container(&container_id).await?;
        log_event(storage, deployment.id, ContainerEventType::ContainerStarted, &container_name, "started").await;

        let inspection = client.inspect_container(&container_id).await?;
        containers.push(ContainerInfo {
            id: container_id,
            service: service.name.clone(),
            image,
            status: inspection.status,
            ports: inspection.published_ports,
        });
    }

    Ok(containers)
}

/// Runs the stop lifecycle: stops every container in reverse dependency order, leaving them
/// in place (not removed) so [`start`] can restart the same containers later. Containers are
/// given up to `timeout` to shut down gracefully before Docker sends `SIGKILL`.
pub async fn stop(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment_id: Uuid,
    timeout: Duration,
) -> HosterResult<Deployment> {
    let mut deployment = storage.get_deployment(deployment_id).await?;
    let node_id = deployment.node_id.ok_or(HosterError::InvalidTransition {
        from: deployment.status,
        to: Status::Stopping,
    })?;
    let node = storage.get_node(node_id).await?;

    deployment.transition(Status::Stopping)?;
    deployment = storage.update_deployment(deployment).await?;

    match run_stop(storage, pool, &deployment, &node, timeout).await {
        Ok(()) => {
            deployment.transition(Status::Stopped)?;
            deployment = storage.update_deployment(deployment).await?;
            usage::record_deployment_event(
                storage,
                deployment.customer_id,
                deployment.id,
                MeterEventType::DeploymentStopped,
                HashMap::new(),
            )
            .await;
            info!(deployment_id = %deployment.id, "deployment stopped");
            Ok(deployment)
        }
        Err(error) => {
            warn!(deployment_id = %deployment.id, %error, "stop lifecycle failed");
            deployment.transition_to_failed(error.to_string())?;
            storage.update_deployment(deployment).await?;
            Err(error)
        }
    }
}

async fn run_stop(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    deployment: &Deployment,
    node: &Node,
    timeout: Duration,
) -> HosterResult<()> {
    let client = client_for(storage, pool, node).await?;
    for container in deployment.containers.iter().rev() {
        client.stop_container(&container.id, timeout).await?;
        log_event(
            storage,
            deployment.id,
            ContainerEventType::ContainerStopped,
            &container.service,
            "stopped",
        )
        .await;
    }
    Ok(())
}

/// Runs the remove lifecycle: stops the deployment if it is not already stopped, force-
/// removes its containers, removes its network and any non-external named volumes, deletes
/// its materialized config files, and releases its proxy port.
pub async fn remove(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    config: &HosterConfig,
    deployment_id: Uuid,
) -> HosterResult<Deployment> {
    let mut deployment = storage.get_deployment(deployment_id).await?;
    let already_stopped = deployment.status == Status::Stopped;

    deployment.transition(Status::Deleting)?;
    deployment = storage.update_deployment(deployment).await?;

    match run_remove(storage, pool, config, &deployment, already_stopped).await {
        Ok(()) => {
            deployment.transition(Status::Deleted)?;
            deployment.proxy_port = None;
            deployment = storage.update_deployment(deployment).await?;
            usage::record_deployment_event(
                storage,
                deployment.customer_id,
                deployment.id,
                MeterEventType::DeploymentDeleted,
                HashMap::new(),
            )
            .await;
            info!(deployment_id = %deployment.id, "deployment removed");
            Ok(deployment)
        }
        Err(error) => {
            warn!(deployment_id = %deployment.id, %error, "remove lifecycle failed");
            deployment.transition_to_failed(error.to_string())?;
            storage.update_deployment(deployment).await?;
            Err(error)
        }
    }
}

async fn run_remove(
    storage: &dyn Storage,
    pool: &crate::transport::NodePool,
    config: &HosterConfig,
    deployment: &Deployment,
    already_stopped: bool,
) -> HosterResult<()> {
    let Some(node_id) = deployment.node_id else {
        // Never scheduled; nothing to tear down on any node.
        return config_files::remove(&config.data_dir, deployment.id).await;
    };
    let node = storage.get_node(node_id).await?;
    let client = client_for(storage, pool, &node).await?;

    for container in &deployment.containers {
        match client.remove_container(&container.id, true).await {
            Ok(()) => {}
            Err(TransportError::CommandFailed { stderr, .. }) if stderr.contains("No such container") => {}
            Err(e) => return Err(e.into()),
        }
        if !already_stopped {
            log_event(
                storage,
                deployment.id,
                ContainerEventType::ContainerStopped,
                &container.service,
                "stopped",
            )
            .await;
        }
    }

    let template = storage.get_template(deployment.template_id).await;
    if let Ok(template) = template {
        if let Ok(spec) = parsed_spec(&template) {
            for volume in &spec.volumes {
                if volume.external {
                    continue;
                }
                let name = crate::naming::volume_name(deployment.id, &volume.name);
                client.remove_volume(&name).await.ok();
            }
        }
    }

    let network_name = crate::naming::network_name(deployment.id);
    client.remove_network(&network_name).await.ok();

    config_files::remove(&config.data_dir, deployment.id).await?;

    Ok(())
}
