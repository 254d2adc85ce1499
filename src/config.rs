//! Environment configuration for the orchestration core.
//!
//! Every key is read from the process environment with a documented default; the
//! encryption key and proxy port range are validated eagerly so a misconfigured
//! deployment fails at startup rather than on the first SSH-key decryption or scheduling
//! call.

use std::path::PathBuf;

use crate::errors::HosterError;

/// Default proxy-port range lower bound.
pub const DEFAULT_PROXY_PORT_LO: u16 = 30_000;
/// Default proxy-port range upper bound.
pub const DEFAULT_PROXY_PORT_HI: u16 = 40_000;
/// Required length, in bytes, of the SSH-key encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Typed view of the recognized environment configuration.
#[derive(Debug, Clone)]
pub struct HosterConfig {
    /// HTTP listen port for the (out-of-scope) control-plane server.
    pub server_port: u16,
    /// Storage backend connection string, opaque to this crate.
    pub database_dsn: Option<String>,
    /// Filesystem root for materialized config files.
    pub data_dir: PathBuf,
    /// Default base domain used when a node has no `base_domain` override.
    pub domain_base_domain: String,
    /// Local Docker endpoint used by the fallback/local client.
    pub docker_host: Option<String>,
    /// 32-byte key used to encrypt SSH private keys at rest.
    pub encryption_key: Option<[u8; ENCRYPTION_KEY_LEN]>,
    /// Reverse-proxy upstream bind address, handed to nodes on generation.
    pub app_proxy_address: String,
    /// Inclusive lower bound of the proxy-port allocation range.
    pub proxy_port_range_lo: u16,
    /// Inclusive upper bound of the proxy-port allocation range.
    pub proxy_port_range_hi: u16,
}

impl HosterConfig {
    /// Loads configuration from the process environment, applying spec-documented defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HosterError::Config`] if `encryption_key` is set but is not exactly
    /// [`ENCRYPTION_KEY_LEN`] bytes after base64 decoding, or if the proxy port range is
    /// empty or inverted.
    pub fn from_env() -> Result<Self, HosterError> {
        let server_port = env_parse("server_port", 8080)?;
        let database_dsn = std::env::var("database_dsn").ok();
        let data_dir = std::env::var("data_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/hoster"));
        let domain_base_domain =
            std::env::var("domain_base_domain").unwrap_or_else(|_| "hoster.local".to_string());
        let docker_host = std::env::var("docker_host").ok();
        let app_proxy_address =
            std::env::var("app_proxy_address").unwrap_or_else(|_| "127.0.0.1".to_string());
        let proxy_port_range_lo = env_parse("proxy_port_range_lo", DEFAULT_PROXY_PORT_LO)?;
        let proxy_port_range_hi = env_parse("proxy_port_range_hi", DEFAULT_PROXY_PORT_HI)?;

        if proxy_port_range_lo >= proxy_port_range_hi {
            return Err(HosterError::Config(format!(
                "proxy_port_range_lo ({proxy_port_range_lo}) must be < proxy_port_range_hi ({proxy_port_range_hi})"
            )));
        }

        let encryption_key = match std::env::var("encryption_key") {
            Ok(raw) => Some(decode_encryption_key(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            server_port,
            database_dsn,
            data_dir,
            domain_base_domain,
            docker_host,
            encryption_key,
            app_proxy_address,
            proxy_port_range_lo,
            proxy_port_range_hi,
        })
    }

    /// Fails fast if SSH keys are expected to exist in storage but no encryption key was
    /// configured. Called by the embedding binary once it knows whether storage holds keys.
    ///
    /// # Errors
    ///
    /// Returns [`HosterError::Config`] when `any_keys_exist` is true and no encryption key
    /// was loaded from the environment.
    pub fn require_encryption_key_if(&self, any_keys_exist: bool) -> Result<(), HosterError> {
        if any_keys_exist && self.encryption_key.is_none() {
            return Err(HosterError::Config(
                "encryption_key is required because stored SSH keys exist".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, HosterError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| HosterError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn decode_encryption_key(raw: &str) -> Result<[u8; ENCRYPTION_KEY_LEN], HosterError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .unwrap_or_else(|_| raw.as_bytes().to_vec());

    if bytes.len() != ENCRYPTION_KEY_LEN {
        return Err(HosterError::Config(format!(
            "encryption_key must decode to exactly {ENCRYPTION_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut key = [0u8; ENCRYPTION_KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(key)
}
