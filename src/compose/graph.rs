//! Dependency-cycle detection and topological ordering over `depends_on` edges.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

use super::parser::{ParseError, ParsedSpec};

/// Error building or ordering a service dependency graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// A service's `depends_on` referenced a name not present in `services:`.
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// The service declaring the dependency.
        service: String,
        /// The unresolved dependency name.
        dependency: String,
    },
}

fn build_graph(spec: &ParsedSpec) -> DiGraphMap<&str, ()> {
    let mut graph = DiGraphMap::new();
    for service in &spec.services {
        graph.add_node(service.name.as_str());
    }
    for service in &spec.services {
        for dep in &service.depends_on {
            graph.add_edge(service.name.as_str(), dep.as_str(), ());
        }
    }
    graph
}

/// Validates that the `depends_on` graph of `spec` contains no cycles, including explicit
/// self-loops (a service depending on itself).
///
/// # Errors
///
/// Returns [`ParseError::CircularDependency`] naming a participant service if a cycle exists.
pub(super) fn check_acyclic(spec: &ParsedSpec) -> Result<(), ParseError> {
    let graph = build_graph(spec);

    for service in &spec.services {
        if service.depends_on.iter().any(|d| d == &service.name) {
            return Err(ParseError::CircularDependency {
                service: service.name.clone(),
            });
        }
    }

    if is_cyclic_directed(&graph) {
        let service = spec
            .services
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        return Err(ParseError::CircularDependency { service });
    }

    Ok(())
}

/// Returns service names ordered so that every service appears before anything that
/// `depends_on` it — i.e. leaves (no dependencies) first, roots last. Services with equal
/// rank (neither depends on the other, directly or transitively) are ordered by name, so
/// the result is fully deterministic for a given spec.
///
/// # Errors
///
/// Returns [`DependencyError::UnknownDependency`] if a `depends_on` entry names a service
/// absent from `spec.services`.
pub fn topological_order(spec: &ParsedSpec) -> Result<Vec<String>, DependencyError> {
    let known: std::collections::HashSet<&str> =
        spec.services.iter().map(|s| s.name.as_str()).collect();
    for service in &spec.services {
        for dep in &service.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(DependencyError::UnknownDependency {
                    service: service.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm over "depends on" edges (reversed from build_graph's direction, so
    // a node with no unresolved dependencies has in-degree zero here), picking the
    // lexicographically smallest ready name at each step instead of relying on
    // `petgraph::algo::toposort`'s unspecified tie-breaking among equal-rank nodes.
    let mut remaining_deps: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for service in &spec.services {
        remaining_deps
            .entry(service.name.as_str())
            .or_default()
            .extend(service.depends_on.iter().map(String::as_str));
        for dep in &service.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(service.name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining_deps
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(spec.services.len());
    while let Some(name) = ready.iter().next().copied() {
        ready.remove(name);
        order.push(name.to_string());
        if let Some(dependent_names) = dependents.get(name) {
            for dependent in dependent_names {
                let deps = remaining_deps.get_mut(dependent).expect("known service");
                deps.remove(name);
                if deps.is_empty() {
                    ready.insert(dependent);
                }
            }
        }
    }

    debug_assert_eq!(
        order.len(),
        spec.services.len(),
        "acyclic graph already validated by check_acyclic"
    );

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::parser::parse;

    #[test]
    fn linear_chain_orders_dependencies_first() {
        let yaml = "services:\n  web:\n    image: nginx\n    depends_on: [app]\n  app:\n    image: app\n    depends_on: [db]\n  db:\n    image: postgres\n";
        let spec = parse(yaml).unwrap();
        let order = topological_order(&spec).unwrap();
        let pos = |name: &str| order.iter().position(|s| s == name).unwrap();
        assert!(pos("db") < pos("app"));
        assert!(pos("app") < pos("web"));
    }

    #[test]
    fn unknown_dependency_reported() {
        let yaml = "services:\n  web:\n    image: nginx\n    depends_on: [ghost]\n";
        let spec = parse(yaml).unwrap();
        let err = topological_order(&spec).unwrap_err();
        assert!(matches!(err, DependencyError::UnknownDependency { .. }));
    }

    #[test]
    fn independent_services_all_present() {
        let yaml = "services:\n  a:\n    image: a\n  b:\n    image: b\n";
        let spec = parse(yaml).unwrap();
        let order = topological_order(&spec).unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn equal_rank_services_order_by_name() {
        let yaml = "services:\n  zeta:\n    image: z\n  alpha:\n    image: a\n  mid:\n    image: m\n    depends_on: [zeta, alpha]\n";
        let spec = parse(yaml).unwrap();
        let order = topological_order(&spec).unwrap();
        assert_eq!(order, vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let yaml = "services:\n  c:\n    image: c\n  a:\n    image: a\n  b:\n    image: b\n  d:\n    image: d\n    depends_on: [a, b, c]\n";
        let spec = parse(yaml).unwrap();
        let first = topological_order(&spec).unwrap();
        for _ in 0..10 {
            assert_eq!(topological_order(&spec).unwrap(), first);
        }
    }
}
