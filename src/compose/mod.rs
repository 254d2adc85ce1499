//! Compose document parser/normalizer (C1).
//!
//! Pure, no I/O: takes raw Compose YAML text and yields either a canonical [`ParsedSpec`]
//! or a [`ParseError`] carrying a field path, message, and error category.

mod graph;
mod parser;
mod resources;
mod variables;

pub use graph::{topological_order, DependencyError};
pub use parser::{
    parse, HealthCheck, NamedNetwork, NamedVolume, ParseError, ParsedSpec, PortMapping, Protocol,
    Resources as ServiceResources, RestartPolicy, Service, VolumeMount, VolumeMountKind,
};
pub use resources::calculate_resources;
pub use variables::{extract_variables, substitute};
