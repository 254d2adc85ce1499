//! Lowers a Compose [`Service`] plus deployment context into a [`ContainerSpec`] (C6).
//!
//! Pure with respect to I/O: every function here is a function of its arguments, with all
//! randomness (names, ports) and side effects (pulling, creating) left to [`super::lifecycle`].

use std::collections::HashMap;

use uuid::Uuid;

use crate::compose::{Service, VolumeMountKind};
use crate::naming;
use crate::transport::{ContainerSpec, NetworkAttachment, PortPublish, VolumeBind};

/// Picks the service the reverse proxy routes to: the first service named `web` that
/// publishes a port, else the first service that publishes any port at all, else `None`
/// (an internal-only stack with no HTTP entrypoint).
#[must_use]
pub fn pick_web_entrypoint(services: &[Service]) -> Option<&Service> {
    services
        .iter()
        .find(|s| s.name == "web" && !s.ports.is_empty())
        .or_else(|| services.iter().find(|s| !s.ports.is_empty()))
}

/// Routes the deployment's allocated proxy port to a service's container port, and labels
/// the container so the reverse proxy discovers it.
#[derive(Debug, Clone, Copy)]
pub struct ProxyBinding<'a> {
    /// Hostname the reverse proxy routes to this container.
    pub hostname: &'a str,
    /// In-container port the service listens on.
    pub container_port: u16,
    /// Host port, allocated from a node's proxy-port range, the container publishes on.
    pub host_port: u16,
}

/// Builds the [`ContainerSpec`] for one service of a deployment.
///
/// `env` is the service's declared environment with template variables already substituted.
/// `proxy` is `Some` only for the service [`pick_web_entrypoint`] selected: it adds the fixed
/// reverse-proxy routing labels from C3 and pins that service's entrypoint port to the
/// deployment's allocated host port instead of Docker's default ephemeral assignment.
#[must_use]
pub fn build_container_spec(
    deployment_id: Uuid,
    service: &Service,
    env: HashMap<String, String>,
    proxy: Option<ProxyBinding<'_>>,
) -> ContainerSpec {
    let name = naming::container_name(deployment_id, &service.name);

    let mut labels: HashMap<String, String> = service.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    if let Some(binding) = proxy {
        for (k, v) in naming::proxy_labels(binding.hostname, &service.name, binding.container_port) {
            labels.insert(k, v);
        }
    }

    let ports = service
        .ports
        .iter()
        .map(|p| {
            let host_port = match proxy {
                Some(binding) if binding.container_port == p.target => Some(binding.host_port),
                _ => p.published,
            };
            PortPublish {
                host_port,
                container_port: p.target,
                protocol: p.protocol,
            }
        })
        .collect();

    let volumes = service
        .volumes
        .iter()
        .map(|v| VolumeBind {
            source: match &v.source {
                VolumeMountKind::Named(logical) => naming::volume_name(deployment_id, logical),
                VolumeMountKind::Bind(path) => path.clone(),
            },
            target: v.target.clone(),
            read_only: v.read_only,
        })
        .collect();

    // Every service joins the deployment's single private network under its own name as
    // alias, compose's implicit "default" network collapsed to one network per deployment.
    let network = Some(NetworkAttachment {
        name: naming::network_name(deployment_id),
        alias: service.name.clone(),
    });

    ContainerSpec {
        name,
        image: service.image.clone().unwrap_or_default(),
        command: service.command.clone(),
        entrypoint: service.entrypoint.clone(),
        env,
        labels,
        ports,
        volumes,
        network,
        restart_policy: restart_policy_str(service.restart_policy),
        healthcheck: service.healthcheck.as_ref().map(|h| h.test.clone()),
    }
}

fn restart_policy_str(policy: crate::compose::RestartPolicy) -> String {
    use crate::compose::RestartPolicy;
    match policy {
        RestartPolicy::No => "no",
        RestartPolicy::Always => "always",
        RestartPolicy::UnlessStopped => "unless-stopped",
        RestartPolicy::OnFailure => "on-failure",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{PortMapping, Protocol};
    use indexmap::IndexMap;

    fn web_service() -> Service {
        Service {
            name: "web".to_string(),
            image: Some("nginx:alpine".to_string()),
            build: None,
            command: vec![],
            entrypoint: vec![],
            env: IndexMap::new(),
            ports: vec![PortMapping {
                published: None,
                target: 80,
                protocol: Protocol::Tcp,
            }],
            volumes: vec![],
            networks: vec!["default".to_string()],
            depends_on: vec![],
            restart_policy: crate::compose::RestartPolicy::UnlessStopped,
            healthcheck: None,
            labels: IndexMap::new(),
            resources: crate::compose::ServiceResources {
                cpu_limit: None,
                mem_limit_mb: None,
                cpu_reservation: None,
                mem_reservation_mb: None,
            },
        }
    }

    #[test]
    fn picks_web_service_with_published_port() {
        let services = vec![web_service()];
        let picked = pick_web_entrypoint(&services).unwrap();
        assert_eq!(picked.name, "web");
    }

    #[test]
    fn no_entrypoint_when_nothing_publishes_a_port() {
        let mut svc = web_service();
        svc.name = "worker".to_string();
        svc.ports.clear();
        let services = vec![svc];
        assert!(pick_web_entrypoint(&services).is_none());
    }

    #[test]
    fn spec_carries_proxy_labels_only_for_entrypoint() {
        let deployment_id = Uuid::new_v4();
        let svc = web_service();
        let binding = ProxyBinding {
            hostname: "app.hoster.cloud",
            container_port: 80,
            host_port: 30_042,
        };
        let spec = build_container_spec(deployment_id, &svc, HashMap::new(), Some(binding));
        assert_eq!(spec.labels.get(naming::LABEL_PROXY_ENABLE).map(String::as_str), Some("true"));
        assert_eq!(spec.restart_policy, "unless-stopped");
        assert_eq!(spec.ports[0].host_port, Some(30_042));
    }

    #[test]
    fn no_proxy_labels_for_internal_service() {
        let deployment_id = Uuid::new_v4();
        let mut svc = web_service();
        svc.name = "db".to_string();
        let spec = build_container_spec(deployment_id, &svc, HashMap::new(), None);
        assert!(!spec.labels.contains_key(naming::LABEL_PROXY_ENABLE));
    }
}
