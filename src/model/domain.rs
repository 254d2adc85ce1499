//! Hostname records attached to a deployment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a [`Domain`] was generated automatically or supplied by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    /// Deterministic hostname under a base domain; needs no verification.
    Auto,
    /// Customer-supplied hostname; requires DNS verification.
    Custom,
}

/// DNS verification method for a custom domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Verified by a CNAME record pointing at the proxy.
    Cname,
}

/// DNS verification status for a custom domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Verification has not completed.
    Pending,
    /// An external DNS check confirmed the record.
    Verified,
    /// An external DNS check failed.
    Failed,
}

/// A hostname routed to a deployment's allocated proxy port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    /// Fully qualified hostname.
    pub hostname: String,
    /// Auto or customer-supplied.
    pub domain_type: DomainType,
    /// Whether TLS termination is enabled for this hostname.
    pub ssl_enabled: bool,
    /// Current verification status.
    pub verification_status: VerificationStatus,
    /// Verification method, always `Cname` for custom domains today.
    pub verification_method: Option<VerificationMethod>,
    /// When verification last succeeded.
    pub verified_at: Option<DateTime<Utc>>,
    /// Most recent verification failure, if any.
    pub last_check_error: Option<String>,
}

impl Domain {
    /// Builds an auto domain: deterministic, needs no verification.
    #[must_use]
    pub fn auto(hostname: String) -> Self {
        Self {
            hostname,
            domain_type: DomainType::Auto,
            ssl_enabled: false,
            verification_status: VerificationStatus::Verified,
            verification_method: None,
            verified_at: None,
            last_check_error: None,
        }
    }

    /// Builds a pending custom domain awaiting CNAME verification.
    #[must_use]
    pub fn custom(hostname: String) -> Self {
        Self {
            hostname,
            domain_type: DomainType::Custom,
            ssl_enabled: false,
            verification_status: VerificationStatus::Pending,
            verification_method: Some(VerificationMethod::Cname),
            verified_at: None,
            last_check_error: None,
        }
    }

    /// Records the outcome of an external DNS check (the core never performs the lookup
    /// itself — this is called back by that external collaborator).
    pub fn record_verification(&mut self, verified: bool, error: Option<String>) {
        if verified {
            self.verification_status = VerificationStatus::Verified;
            self.verified_at = Some(Utc::now());
            self.last_check_error = None;
        } else {
            self.verification_status = VerificationStatus::Failed;
            self.last_check_error = error;
        }
    }
}
