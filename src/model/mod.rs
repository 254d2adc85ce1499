//! Core data model: templates, deployments, nodes, SSH keys, and the immutable event logs.
//!
//! Every type in this module is a plain data holder; the behavior that operates on them
//! (state transitions, naming, scheduling) lives in sibling top-level modules so the model
//! stays trivially serializable and free of side effects.

mod deployment;
mod domain;
mod events;
mod node;
mod resources;
mod ssh_key;
mod status;
mod template;

pub use deployment::{ContainerInfo, Deployment, ProxyPort};
pub use domain::{Domain, DomainType, VerificationMethod, VerificationStatus};
pub use events::{ContainerEvent, ContainerEventType, MeterEvent, MeterEventType};
pub use node::{Capacity, Node, NodeArch, NodeStatus, SshEndpoint};
pub use resources::Resources;
pub use ssh_key::SshKey;
pub use status::Status;
pub use template::{ConfigFile, Template, Variable, VariableType};
