//! Error types for the deployment orchestration core.
//!
//! Every component-level error (`compose::ParseError`, `transport::TransportError`, ...)
//! converts into [`HosterError`] via `#[from]`, so callers crossing a component boundary
//! only ever need to match on one enum. The variant groups mirror broad error kinds
//! (`InputInvalid`, `Conflict`, `Capacity`, `Transport`, `Storage`, `Cancelled`) rather
//! than one variant per failure site.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type HosterResult<T> = Result<T, HosterError>;

/// Top-level error type for all orchestration-core operations.
#[derive(Debug, Error)]
pub enum HosterError {
    // ---- InputInvalid ----------------------------------------------------
    /// A Compose document failed to parse or validate.
    #[error("invalid compose input: {0}")]
    ComposeInvalid(#[from] crate::compose::ParseError),

    /// A deployment variable required by the template was not supplied.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Variable name as declared on the template.
        name: String,
    },

    /// A state transition was requested that the state machine does not allow.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Status the deployment was in.
        from: crate::model::Status,
        /// Status that was requested.
        to: crate::model::Status,
    },

    // ---- Conflict ----------------------------------------------------
    /// The template is already published and cannot be published again.
    #[error("template {id} is already published")]
    AlreadyPublished {
        /// Template reference id.
        id: uuid::Uuid,
    },

    /// A published template's immutable fields may not be edited.
    #[error("template {id} is published and immutable")]
    TemplateImmutable {
        /// Template reference id.
        id: uuid::Uuid,
    },

    /// A template cannot be destroyed while deployments reference it.
    #[error("template {id} has {count} live deployment(s)")]
    TemplateHasLiveDeployments {
        /// Template reference id.
        id: uuid::Uuid,
        /// Number of live (non-deleted) deployments referencing it.
        count: usize,
    },

    /// A node cannot be destroyed while deployments are scheduled on it.
    #[error("node {id} has {count} live deployment(s)")]
    NodeHasLiveDeployments {
        /// Node reference id.
        id: uuid::Uuid,
        /// Number of live deployments scheduled on it.
        count: usize,
    },

    // ---- Capacity ----------------------------------------------------
    /// No node satisfied ownership, capability, and capacity constraints.
    #[error("no online node available for template {template_id}")]
    NoOnlineNodes {
        /// Template that could not be scheduled.
        template_id: uuid::Uuid,
    },

    /// The proxy-port range for a node is fully allocated.
    #[error("no free proxy port in range {lo}-{hi} on node {node_id}")]
    NoFreePort {
        /// Node reference id.
        node_id: uuid::Uuid,
        /// Lower bound of the configured range (inclusive).
        lo: u16,
        /// Upper bound of the configured range (inclusive).
        hi: u16,
    },

    // ---- Transport ----------------------------------------------------
    /// An SSH, tunnel, or Docker transport error occurred.
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    // ---- Storage ----------------------------------------------------
    /// The requested entity does not exist in storage.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of entity, e.g. `"deployment"`.
        kind: &'static str,
        /// Reference id that was looked up.
        id: uuid::Uuid,
    },

    /// A storage read or write failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    // ---- Cancelled ----------------------------------------------------
    /// The operation was cancelled via its context's cancellation signal.
    #[error("operation cancelled: {reason}")]
    Cancelled {
        /// Human-readable reason/context for the cancellation.
        reason: String,
    },

    // ---- Config --------------------------------------------------------
    /// Environment configuration was missing or malformed at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HosterError {
    /// Returns the coarse error-kind name used in user-facing failure payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HosterError::ComposeInvalid(_)
            | HosterError::MissingVariable { .. }
            | HosterError::InvalidTransition { .. } => "input_invalid",
            HosterError::AlreadyPublished { .. }
            | HosterError::TemplateImmutable { .. }
            | HosterError::TemplateHasLiveDeployments { .. }
            | HosterError::NodeHasLiveDeployments { .. } => "conflict",
            HosterError::NoOnlineNodes { .. } | HosterError::NoFreePort { .. } => "capacity",
            HosterError::Transport(_) => "transport",
            HosterError::NotFound { .. } | HosterError::Storage { .. } => "storage",
            HosterError::Cancelled { .. } => "cancelled",
            HosterError::Config(_) => "config",
        }
    }
}
