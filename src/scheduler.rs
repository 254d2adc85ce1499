//! Scheduler (C4): picks the node a deployment should run on.
//!
//! The selection algorithm itself is pure arithmetic over a caller-supplied node list;
//! obtaining a live Docker client for the chosen node is left to [`crate::transport`].

use uuid::Uuid;

use crate::errors::{HosterError, HosterResult};
use crate::model::{Node, Template};

/// Relative weight of CPU headroom in the scheduler's scoring function.
pub const WEIGHT_CPU: f64 = 0.3;
/// Relative weight of memory headroom in the scheduler's scoring function.
pub const WEIGHT_MEMORY: f64 = 0.4;
/// Relative weight of disk headroom in the scheduler's scoring function.
pub const WEIGHT_DISK: f64 = 0.3;

/// A request to place a deployment from `template` on behalf of `creator_id`.
#[derive(Debug, Clone)]
pub struct ScheduleRequest<'a> {
    /// Template the deployment is being instantiated from.
    pub template: &'a Template,
    /// Id of the user requesting the deployment (must match `template.creator_id`'s
    /// infrastructure for ownership to permit scheduling).
    pub creator_id: Uuid,
    /// Node the caller would like to reuse, if it still satisfies the filters.
    pub preferred_node_id: Option<Uuid>,
}

/// The outcome of a successful scheduling decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleResult {
    /// Id of the selected node.
    pub node_id: Uuid,
    /// Score the node received; `1.0` for a preferred-node shortcut.
    pub score: f64,
}

/// Runs the node-selection algorithm over `candidates`, returning the chosen node.
///
/// Filters, in order: ownership (node's creator equals the template's creator),
/// `status == online`, capability superset, and sufficient capacity. A surviving
/// `preferred_node_id` short-circuits scoring; otherwise every survivor is scored by
/// weighted resource headroom and the highest scorer wins, ties broken by fewest current
/// deployments then lexicographically by node id.
///
/// # Errors
///
/// Returns [`HosterError::NoOnlineNodes`] if no candidate survives every filter.
pub fn select_node(
    request: &ScheduleRequest<'_>,
    candidates: &[Node],
    deployment_counts: impl Fn(Uuid) -> usize,
) -> HosterResult<ScheduleResult> {
    let survivors: Vec<&Node> = candidates
        .iter()
        .filter(|n| n.creator_id == request.template.creator_id)
        .filter(|n| n.is_available())
        .filter(|n| n.satisfies_capabilities(&request.template.required_capabilities))
        .filter(|n| n.capacity.can_handle(&request.template.resources))
        .collect();

    if survivors.is_empty() {
        return Err(HosterError::NoOnlineNodes {
            template_id: request.template.id,
        });
    }

    if let Some(preferred) = request.preferred_node_id {
        if let Some(node) = survivors.iter().find(|n| n.id == preferred) {
            return Ok(ScheduleResult {
                node_id: node.id,
                score: 1.0,
            });
        }
    }

    let scored: Vec<(f64, &Node)> = survivors.iter().map(|n| (score(n), *n)).collect();
    let best_score = scored
        .iter()
        .map(|(s, _)| *s)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut tied: Vec<&Node> = scored
        .into_iter()
        .filter(|(s, _)| (*s - best_score).abs() < f64::EPSILON)
        .map(|(_, n)| n)
        .collect();

    tied.sort_by(|a, b| {
        deployment_counts(a.id)
            .cmp(&deployment_counts(b.id))
            .then_with(|| a.id.cmp(&b.id))
    });

    let winner = tied[0];
    Ok(ScheduleResult {
        node_id: winner.id,
        score: best_score,
    })
}

fn score(node: &Node) -> f64 {
    let cpu_headroom = 1.0 - node.capacity.cpu_utilization();
    let mem_headroom = 1.0 - node.capacity.memory_utilization();
    let disk_headroom = 1.0 - node.capacity.disk_utilization();
    WEIGHT_CPU * cpu_headroom + WEIGHT_MEMORY * mem_headroom + WEIGHT_DISK * disk_headroom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capacity, NodeArch, NodeStatus, Resources, SshEndpoint};
    use std::collections::HashSet;

    fn base_node(creator: Uuid, status: NodeStatus) -> Node {
        Node {
            id: Uuid::new_v4(),
            name: "node".to_string(),
            creator_id: creator,
            ssh: SshEndpoint {
                host: "10.0.0.1".to_string(),
                port: 22,
                user: "hoster".to_string(),
            },
            ssh_key_id: None,
            docker_socket_path: Node::DEFAULT_DOCKER_SOCKET.to_string(),
            arch: NodeArch::Amd64,
            status,
            capabilities: HashSet::new(),
            capacity: Capacity {
                cpu_total: 8.0,
                cpu_used: 0.0,
                memory_total_mb: 16384,
                memory_used_mb: 0,
                disk_total_mb: 500_000,
                disk_used_mb: 0,
            },
            location: None,
            last_health_check: None,
            last_error: None,
            base_domain: None,
            public: false,
        }
    }

    fn template(creator: Uuid) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "App".to_string(),
            version: (1, 0, 0),
            compose: "services:\n  web:\n    image: nginx\n".to_string(),
            variables: vec![],
            config_files: vec![],
            resources: Resources {
                cpu_cores: 1.0,
                memory_mb: 1024,
                disk_mb: 1024,
            },
            required_capabilities: HashSet::new(),
            price_cents: 0,
            published: true,
            creator_id: creator,
        }
    }

    #[test]
    fn no_online_nodes_when_none_match() {
        let creator = Uuid::new_v4();
        let tpl = template(creator);
        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let err = select_node(&req, &[], |_| 0).unwrap_err();
        assert!(matches!(err, HosterError::NoOnlineNodes { .. }));
    }

    #[test]
    fn offline_node_filtered_out() {
        let creator = Uuid::new_v4();
        let tpl = template(creator);
        let node = base_node(creator, NodeStatus::Offline);
        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let err = select_node(&req, &[node], |_| 0).unwrap_err();
        assert!(matches!(err, HosterError::NoOnlineNodes { .. }));
    }

    #[test]
    fn capability_filter_picks_the_node_with_the_required_tag() {
        let creator = Uuid::new_v4();
        let mut tpl = template(creator);
        tpl.required_capabilities.insert("gpu".to_string());

        let mut plain = base_node(creator, NodeStatus::Online);
        plain.capabilities.insert("standard".to_string());

        let mut gpu_node = base_node(creator, NodeStatus::Online);
        gpu_node.capabilities.insert("standard".to_string());
        gpu_node.capabilities.insert("gpu".to_string());

        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let result = select_node(&req, &[plain, gpu_node.clone()], |_| 0).unwrap();
        assert_eq!(result.node_id, gpu_node.id);
    }

    #[test]
    fn higher_headroom_node_wins_scoring() {
        let creator = Uuid::new_v4();
        let tpl = template(creator);

        let mut busy = base_node(creator, NodeStatus::Online);
        busy.capacity.memory_used_mb = 14000;

        let idle = base_node(creator, NodeStatus::Online);

        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let result = select_node(&req, &[busy, idle.clone()], |_| 0).unwrap();
        assert_eq!(result.node_id, idle.id);
    }

    #[test]
    fn preferred_node_short_circuits_scoring() {
        let creator = Uuid::new_v4();
        let tpl = template(creator);

        let mut busy = base_node(creator, NodeStatus::Online);
        busy.capacity.memory_used_mb = 14000;
        let idle = base_node(creator, NodeStatus::Online);

        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: Some(busy.id),
        };
        let result = select_node(&req, &[busy.clone(), idle], |_| 0).unwrap();
        assert_eq!(result.node_id, busy.id);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn insufficient_capacity_filters_node_out() {
        let creator = Uuid::new_v4();
        let mut tpl = template(creator);
        tpl.resources.memory_mb = 32_000;

        let node = base_node(creator, NodeStatus::Online);
        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let err = select_node(&req, &[node], |_| 0).unwrap_err();
        assert!(matches!(err, HosterError::NoOnlineNodes { .. }));
    }

    #[test]
    fn ties_break_by_fewest_deployments_then_id() {
        let creator = Uuid::new_v4();
        let tpl = template(creator);
        let a = base_node(creator, NodeStatus::Online);
        let b = base_node(creator, NodeStatus::Online);
        let req = ScheduleRequest {
            template: &tpl,
            creator_id: creator,
            preferred_node_id: None,
        };
        let counts = |id: Uuid| if id == a.id { 5 } else { 1 };
        let result = select_node(&req, &[a.clone(), b.clone()], counts).unwrap();
        assert_eq!(result.node_id, b.id);
    }
}
