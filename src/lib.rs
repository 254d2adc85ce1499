//! # hoster-core
//!
//! Deployment orchestration core for the Hoster self-hosted deployment marketplace.
//!
//! This crate owns the part of Hoster that turns a published template and a set of
//! customer-supplied variables into running containers on one of the customer's own
//! nodes, and keeps them running: parsing and normalizing the template's Compose
//! document, picking a node, naming and labeling the resulting containers/networks/
//! volumes, driving them over SSH to a remote Docker daemon, and recording the usage
//! events billing depends on. It does not serve HTTP, store bytes on disk beyond the
//! config files a deployment's containers need, or speak to a payment provider — those
//! are the concern of the control-plane service this crate is embedded in.
//!
//! ## Architecture
//!
//! - [`compose`] (C1) - Compose YAML parsing, dependency-order resolution, resource
//!   totals, and `${VAR}` template substitution. Pure; no I/O.
//! - [`model`] - the entities the rest of the crate operates on: [`model::Template`],
//!   [`model::Deployment`] and its state machine, [`model::Node`], [`model::Domain`],
//!   and the container/meter event records.
//! - [`naming`] (C3) - deterministic container/network/volume names, generated
//!   hostnames, and reverse-proxy routing labels.
//! - [`ports`] - proxy-port allocation over a node's in-use port set.
//! - [`scheduler`] (C4) - picks the node a new deployment should run on.
//! - [`transport`] (C5) - the node pool and its SSH-tunneled Docker CLI transport.
//! - [`orchestrator`] (C6) - composes the above into deployment creation and the
//!   start/stop/remove lifecycles, plus the stats/logs/health readbacks.
//! - [`usage`] (C7) - records billing-relevant deployment events.
//! - [`storage`] - the persistence boundary every component above reads and writes
//!   through; an in-memory reference implementation ships behind the `memory-storage`
//! feature.
//! - [`config`] - typed environment configuration.
//! - [`errors`] - the crate-wide error type every component's errors convert into.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hoster_core::config::HosterConfig;
//! use hoster_core::orchestrator::{CreateDeploymentRequest, Orchestrator};
//! use hoster_core::storage::{MemoryStorage, Storage};
//! use hoster_core::transport::NodePool;
//! use hoster_core::transport::ssh::HelperAgentBinaries;
//!
//! # async fn run(template_id: uuid::Uuid, customer_id: uuid::Uuid) -> hoster_core::errors::HosterResult<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
//! let pool = NodePool::new(Duration::from_secs(300), HelperAgentBinaries { amd64: &[], arm64: &[] });
//! let config = HosterConfig::from_env()?;
//! let orchestrator = Orchestrator::new(storage, pool, config);
//!
//! let deployment = orchestrator
//!     .create_deployment(CreateDeploymentRequest {
//!         template_id,
//!         customer_id,
//!         variables: Default::default(),
//!         preferred_node_id: None,
//!         generate_domain: true,
//!     })
//!     .await?;
//! orchestrator.start(deployment.id).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // TODO: backfill on the older transport/compose modules

pub mod compose;
pub mod config;
pub mod errors;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod ports;
pub mod scheduler;
pub mod storage;
pub mod transport;
pub mod usage;

pub use errors::{HosterError, HosterResult};
pub use orchestrator::Orchestrator;

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
