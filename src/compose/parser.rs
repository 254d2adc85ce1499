//! Parsing and validation of Compose documents into the canonical [`ParsedSpec`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A Compose document parse/validation error, carrying a field path for diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input was empty or whitespace-only.
    #[error("compose document is empty")]
    EmptyInput,

    /// The YAML document could not be deserialized.
    #[error("invalid YAML at {field_path}: {message}")]
    InvalidYaml {
        /// Best-effort field path, `"<document>"` if unknown.
        field_path: String,
        /// Underlying parser message.
        message: String,
    },

    /// The document declared zero services.
    #[error("compose document declares no services")]
    NoServices,

    /// A service declared neither `image` nor `build`.
    #[error("service '{service}' has neither image nor build")]
    ServiceNoImage {
        /// Offending service name.
        service: String,
    },

    /// A port mapping used an out-of-range value.
    #[error("service '{service}' has invalid port: {detail}")]
    InvalidPort {
        /// Offending service name.
        service: String,
        /// Description of the invalid value.
        detail: String,
    },

    /// The document used a feature this core does not support.
    #[error("unsupported feature at {field_path}: {feature}")]
    UnsupportedFeature {
        /// Field path of the offending key.
        field_path: String,
        /// Name of the unsupported feature.
        feature: String,
    },

    /// The service dependency graph contains a cycle.
    #[error("circular dependency involving service '{service}'")]
    CircularDependency {
        /// A service participating in the cycle.
        service: String,
    },
}

impl ParseError {
    /// Coarse error category; all parse errors are `InputInvalid`.
    #[must_use]
    pub fn category(&self) -> &'static str {
        "input_invalid"
    }
}

/// Transport protocol for a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the default when unspecified).
    Tcp,
    /// UDP.
    Udp,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

/// A single `ports:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host-side port to publish on, if specified (unspecified means "any free port").
    pub published: Option<u16>,
    /// Container-side port the service listens on.
    pub target: u16,
    /// TCP or UDP.
    pub protocol: Protocol,
}

/// The kind of a `volumes:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VolumeMountKind {
    /// Mounts a named volume declared in the top-level `volumes:` section.
    Named(String),
    /// Bind-mounts a host path.
    Bind(String),
}

/// A single `volumes:` entry on a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Source: a named volume or a host path.
    pub source: VolumeMountKind,
    /// Mount path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart automatically.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart only on non-zero exit.
    OnFailure,
}

/// A service's `healthcheck:` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Test command, compose-style (`["CMD-SHELL", "curl -f http://localhost/"]`).
    pub test: Vec<String>,
    /// Interval between checks, in seconds.
    pub interval_secs: u64,
    /// Per-check timeout, in seconds.
    pub timeout_secs: u64,
    /// Number of consecutive failures before marking unhealthy.
    pub retries: u32,
    /// Grace period after container start before failures count, in seconds.
    pub start_period_secs: u64,
}

/// Per-service resource hints (`deploy.resources`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Hard CPU limit, in cores.
    pub cpu_limit: Option<f64>,
    /// Hard memory limit, in megabytes.
    pub mem_limit_mb: Option<u64>,
    /// Soft CPU reservation, in cores.
    pub cpu_reservation: Option<f64>,
    /// Soft memory reservation, in megabytes.
    pub mem_reservation_mb: Option<u64>,
}

/// Default CPU cores assumed for a service with no declared limit.
pub const DEFAULT_SERVICE_CPU_CORES: f64 = 0.5;
/// Default memory, in megabytes, assumed for a service with no declared limit.
pub const DEFAULT_SERVICE_MEMORY_MB: u64 = 256;
/// Disk overhead, in megabytes, attributed to each named volume.
pub const VOLUME_DISK_OVERHEAD_MB: u64 = 1024;

/// A build context, for services built from source instead of a published image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory or URL.
    pub context: String,
    /// Dockerfile name, relative to `context`.
    pub dockerfile: String,
}

/// A normalized service definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Service name, as declared in the `services:` mapping key.
    pub name: String,
    /// Published image reference, when not built from source.
    pub image: Option<String>,
    /// Build context, when not using a published image.
    pub build: Option<BuildSpec>,
    /// Command override.
    pub command: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Vec<String>,
    /// Environment variables, raw (un-interpolated) values.
    pub env: IndexMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
    /// Names of top-level networks this service attaches to.
    pub networks: Vec<String>,
    /// Names of services this one depends on (startup-order only).
    pub depends_on: Vec<String>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
    /// Health check, if declared.
    pub healthcheck: Option<HealthCheck>,
    /// Labels.
    pub labels: IndexMap<String, String>,
    /// Resource hints.
    pub resources: Resources,
}

/// A top-level named network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedNetwork {
    /// Network name.
    pub name: String,
    /// Driver, defaults to `"bridge"`.
    pub driver: String,
    /// Whether the network is managed outside this deployment (`external: true`).
    pub external: bool,
    /// Restricts outbound connectivity.
    pub internal: bool,
    /// Allows standalone containers to attach.
    pub attachable: bool,
    /// Labels.
    pub labels: IndexMap<String, String>,
}

/// A top-level named volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVolume {
    /// Volume name.
    pub name: String,
    /// Driver, defaults to `"local"`.
    pub driver: String,
    /// Whether the volume is managed outside this deployment (`external: true`).
    pub external: bool,
    /// Labels.
    pub labels: IndexMap<String, String>,
}

/// The canonical, deterministic intermediate representation of a Compose document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSpec {
    /// Services, in declaration order (re-ordered downstream only by dependency rank).
    pub services: Vec<Service>,
    /// Top-level named networks.
    pub networks: Vec<NamedNetwork>,
    /// Top-level named volumes.
    pub volumes: Vec<NamedVolume>,
}

// ---- raw (pre-lowering) document shape -----------------------------------------------

#[derive(Debug, Deserialize)]
struct RawCompose {
    #[serde(default)]
    services: IndexMap<String, RawService>,
    #[serde(default)]
    networks: IndexMap<String, Option<RawNetwork>>,
    #[serde(default)]
    volumes: IndexMap<String, Option<RawVolume>>,
    secrets: Option<serde_yaml::Value>,
    configs: Option<serde_yaml::Value>,
    extends: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    image: Option<String>,
    build: Option<RawBuild>,
    #[serde(default)]
    command: RawStringOrList,
    #[serde(default)]
    entrypoint: RawStringOrList,
    #[serde(default)]
    environment: RawEnv,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    volumes: Vec<RawVolumeMount>,
    #[serde(default)]
    networks: RawStringOrList,
    #[serde(default)]
    depends_on: RawDependsOn,
    restart: Option<String>,
    healthcheck: Option<RawHealthCheck>,
    #[serde(default)]
    labels: RawEnv,
    deploy: Option<RawDeploy>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBuild {
    Short(String),
    Long {
        context: String,
        #[serde(default = "default_dockerfile")]
        dockerfile: String,
    },
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum RawStringOrList {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl RawStringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawStringOrList::Empty => vec![],
            RawStringOrList::One(s) => vec![s],
            RawStringOrList::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum RawEnv {
    #[default]
    Empty,
    List(Vec<String>),
    Map(IndexMap<String, Option<String>>),
}

impl RawEnv {
    fn into_map(self) -> IndexMap<String, String> {
        match self {
            RawEnv::Empty => IndexMap::new(),
            RawEnv::List(items) => items
                .into_iter()
                .filter_map(|item| {
                    let mut parts = item.splitn(2, '=');
                    let key = parts.next()?.to_string();
                    let value = parts.next().unwrap_or_default().to_string();
                    Some((key, value))
                })
                .collect(),
            RawEnv::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Short(String),
    #[allow(dead_code)]
    Long {
        target: u32,
        published: Option<PublishedPort>,
        #[serde(default)]
        protocol: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PublishedPort {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVolumeMount {
    Short(String),
    Long {
        #[serde(rename = "type")]
        kind: String,
        source: Option<String>,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependsOn {
    Empty,
    List(Vec<String>),
    Map(IndexMap<String, serde_yaml::Value>),
}

impl Default for RawDependsOn {
    fn default() -> Self {
        RawDependsOn::Empty
    }
}

impl RawDependsOn {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawDependsOn::Empty => vec![],
            RawDependsOn::List(v) => v,
            RawDependsOn::Map(m) => m.into_keys().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHealthCheck {
    #[serde(default)]
    test: RawStringOrList,
    interval: Option<String>,
    timeout: Option<String>,
    retries: Option<u32>,
    start_period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDeploy {
    replicas: Option<u32>,
    resources: Option<RawDeployResources>,
}

#[derive(Debug, Deserialize)]
struct RawDeployResources {
    limits: Option<RawResourceBlock>,
    reservations: Option<RawResourceBlock>,
}

#[derive(Debug, Deserialize)]
struct RawResourceBlock {
    cpus: Option<String>,
    memory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNetwork {
    driver: Option<String>,
    #[serde(default)]
    external: bool,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    attachable: bool,
    #[serde(default)]
    labels: RawEnv,
}

#[derive(Debug, Deserialize)]
struct RawVolume {
    driver: Option<String>,
    #[serde(default)]
    external: bool,
    #[serde(default)]
    labels: RawEnv,
}

/// Parses and validates Compose document `text` into a canonical [`ParsedSpec`].
///
/// # Errors
///
/// Returns the first applicable [`ParseError`] variant; see the type's docs for the
/// exact validation rules enforced.
pub fn parse(text: &str) -> Result<ParsedSpec, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let raw: RawCompose = serde_yaml::from_str(text).map_err(|e| ParseError::InvalidYaml {
        field_path: e
            .location()
            .map(|l| format!("line {}, column {}", l.line(), l.column()))
            .unwrap_or_else(|| "<document>".to_string()),
        message: e.to_string(),
    })?;

    if raw.secrets.is_some() {
        return Err(ParseError::UnsupportedFeature {
            field_path: "secrets".to_string(),
            feature: "top-level secrets".to_string(),
        });
    }
    if raw.configs.is_some() {
        return Err(ParseError::UnsupportedFeature {
            field_path: "configs".to_string(),
            feature: "top-level configs".to_string(),
        });
    }
    if raw.extends.is_some() {
        return Err(ParseError::UnsupportedFeature {
            field_path: "extends".to_string(),
            feature: "cross-file extends".to_string(),
        });
    }

    if raw.services.is_empty() {
        return Err(ParseError::NoServices);
    }

    let mut services = Vec::with_capacity(raw.services.len());
    for (name, raw_service) in raw.services {
        services.push(lower_service(&name, raw_service)?);
    }

    let networks = raw
        .networks
        .into_iter()
        .map(|(name, raw_net)| lower_network(name, raw_net))
        .collect();

    let volumes = raw
        .volumes
        .into_iter()
        .map(|(name, raw_vol)| lower_volume(name, raw_vol))
        .collect();

    let spec = ParsedSpec {
        services,
        networks,
        volumes,
    };

    crate::compose::graph::check_acyclic(&spec)?;

    Ok(spec)
}

fn lower_service(name: &str, raw: RawService) -> Result<Service, ParseError> {
    if raw.image.is_none() && raw.build.is_none() {
        return Err(ParseError::ServiceNoImage {
            service: name.to_string(),
        });
    }

    let build = raw.build.map(|b| match b {
        RawBuild::Short(context) => BuildSpec {
            context,
            dockerfile: default_dockerfile(),
        },
        RawBuild::Long { context, dockerfile } => BuildSpec { context, dockerfile },
    });

    let ports = raw
        .ports
        .into_iter()
        .map(|p| lower_port(name, p))
        .collect::<Result<Vec<_>, _>>()?;

    let volumes = raw.volumes.into_iter().map(lower_volume_mount).collect();

    // `deploy.replicas > 1` is silently ignored; only `resources` is carried forward.
    let resources = raw
        .deploy
        .as_ref()
        .and_then(|d| d.resources.as_ref())
        .map(lower_resources)
        .unwrap_or(Resources {
            cpu_limit: None,
            mem_limit_mb: None,
            cpu_reservation: None,
            mem_reservation_mb: None,
        });

    let restart_policy = match raw.restart.as_deref() {
        Some("always") => RestartPolicy::Always,
        Some("unless-stopped") => RestartPolicy::UnlessStopped,
        Some("on-failure") => RestartPolicy::OnFailure,
        _ => RestartPolicy::No,
    };

    let healthcheck = raw.healthcheck.map(lower_healthcheck);

    Ok(Service {
        name: name.to_string(),
        image: raw.image,
        build,
        command: raw.command.into_vec(),
        entrypoint: raw.entrypoint.into_vec(),
        env: raw.environment.into_map(),
        ports,
        volumes,
        networks: raw.networks.into_vec(),
        depends_on: raw.depends_on.into_vec(),
        restart_policy,
        healthcheck,
        labels: raw.labels.into_map(),
        resources,
    })
}

fn lower_port(service: &str, raw: RawPort) -> Result<PortMapping, ParseError> {
    let (published_raw, target_raw, protocol_raw) = match raw {
        RawPort::Short(spec) => {
            let mut protocol = "tcp".to_string();
            let spec = if let Some((addr_port, proto)) = spec.rsplit_once('/') {
                protocol = proto.to_string();
                addr_port.to_string()
            } else {
                spec
            };
            if let Some((published, target)) = spec.rsplit_once(':') {
                (Some(published.to_string()), target.to_string(), protocol)
            } else {
                (None, spec, protocol)
            }
        }
        RawPort::Long {
            target,
            published,
            protocol,
        } => {
            let published = published.map(|p| match p {
                PublishedPort::Number(n) => n.to_string(),
                PublishedPort::Text(t) => t,
            });
            let protocol = if protocol.is_empty() { "tcp".to_string() } else { protocol };
            (published, target.to_string(), protocol)
        }
    };

    let target: u32 = target_raw.rsplit(':').next().unwrap_or(&target_raw).parse().map_err(|_| {
        ParseError::InvalidPort {
            service: service.to_string(),
            detail: format!("target port '{target_raw}' is not numeric"),
        }
    })?;

    if target == 0 || target > 65535 {
        return Err(ParseError::InvalidPort {
            service: service.to_string(),
            detail: format!("target port {target} out of range"),
        });
    }

    let published = match published_raw {
        Some(p) => {
            let n: u32 = p.parse().map_err(|_| ParseError::InvalidPort {
                service: service.to_string(),
                detail: format!("published port '{p}' is not numeric"),
            })?;
            if n > 65535 {
                return Err(ParseError::InvalidPort {
                    service: service.to_string(),
                    detail: format!("published port {n} out of range"),
                });
            }
            Some(n as u16)
        }
        None => None,
    };

    let protocol = if protocol_raw.eq_ignore_ascii_case("udp") {
        Protocol::Udp
    } else {
        Protocol::Tcp
    };

    Ok(PortMapping {
        published,
        target: target as u16,
        protocol,
    })
}

fn lower_volume_mount(raw: RawVolumeMount) -> VolumeMount {
    match raw {
        RawVolumeMount::Short(spec) => {
            let parts: Vec<&str> = spec.split(':').collect();
            let read_only = parts.get(2).is_some_and(|m| m.contains("ro"));
            match parts.as_slice() {
                [source, target, ..] if !source.starts_with('.') && !source.starts_with('/') => {
                    VolumeMount {
                        source: VolumeMountKind::Named((*source).to_string()),
                        target: (*target).to_string(),
                        read_only,
                    }
                }
                [source, target, ..] => VolumeMount {
                    source: VolumeMountKind::Bind((*source).to_string()),
                    target: (*target).to_string(),
                    read_only,
                },
                [target] => VolumeMount {
                    source: VolumeMountKind::Bind(String::new()),
                    target: (*target).to_string(),
                    read_only: false,
                },
                [] => VolumeMount {
                    source: VolumeMountKind::Bind(String::new()),
                    target: String::new(),
                    read_only: false,
                },
            }
        }
        RawVolumeMount::Long {
            kind,
            source,
            target,
            read_only,
        } => {
            let source = source.unwrap_or_default();
            let kind = if kind == "bind" {
                VolumeMountKind::Bind(source)
            } else {
                VolumeMountKind::Named(source)
            };
            VolumeMount {
                source: kind,
                target,
                read_only,
            }
        }
    }
}

fn lower_resources(raw: &RawDeployResources) -> Resources {
    let cpu_limit = raw.limits.as_ref().and_then(|l| l.cpus.as_deref()).and_then(|s| s.parse().ok());
    let mem_limit_mb = raw
        .limits
        .as_ref()
        .and_then(|l| l.memory.as_deref())
        .and_then(parse_memory_mb);
    let cpu_reservation = raw
        .reservations
        .as_ref()
        .and_then(|l| l.cpus.as_deref())
        .and_then(|s| s.parse().ok());
    let mem_reservation_mb = raw
        .reservations
        .as_ref()
        .and_then(|l| l.memory.as_deref())
        .and_then(parse_memory_mb);

    Resources {
        cpu_limit,
        mem_limit_mb,
        cpu_reservation,
        mem_reservation_mb,
    }
}

/// Parses a Compose byte-size string (`"512M"`, `"1G"`, `"1024"`) into megabytes.
fn parse_memory_mb(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, suffix) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(raw.len()));
    let value: f64 = digits.parse().ok()?;
    let multiplier = match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => 1.0 / (1024.0 * 1024.0),
        "K" | "KB" => 1.0 / 1024.0,
        "M" | "MB" => 1.0,
        "G" | "GB" => 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

fn lower_healthcheck(raw: RawHealthCheck) -> HealthCheck {
    HealthCheck {
        test: raw.test.into_vec(),
        interval_secs: raw.interval.as_deref().and_then(parse_duration_secs).unwrap_or(30),
        timeout_secs: raw.timeout.as_deref().and_then(parse_duration_secs).unwrap_or(30),
        retries: raw.retries.unwrap_or(3),
        start_period_secs: raw.start_period.as_deref().and_then(parse_duration_secs).unwrap_or(0),
    }
}

/// Parses a Compose duration string (`"30s"`, `"1m30s"`, `"2h"`) into whole seconds.
fn parse_duration_secs(raw: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut number = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            let n: u64 = number.parse().ok()?;
            number.clear();
            total += match ch {
                'h' => n * 3600,
                'm' => n * 60,
                's' => n,
                _ => return None,
            };
        }
    }
    Some(total)
}

fn lower_network(name: String, raw: Option<RawNetwork>) -> NamedNetwork {
    let raw = raw.unwrap_or(RawNetwork {
        driver: None,
        external: false,
        internal: false,
        attachable: false,
        labels: RawEnv::Empty,
    });
    NamedNetwork {
        name,
        driver: raw.driver.unwrap_or_else(|| "bridge".to_string()),
        external: raw.external,
        internal: raw.internal,
        attachable: raw.attachable,
        labels: raw.labels.into_map(),
    }
}

fn lower_volume(name: String, raw: Option<RawVolume>) -> NamedVolume {
    let raw = raw.unwrap_or(RawVolume {
        driver: None,
        external: false,
        labels: RawEnv::Empty,
    });
    NamedVolume {
        name,
        driver: raw.driver.unwrap_or_else(|| "local".to_string()),
        external: raw.external,
        labels: raw.labels.into_map(),
    }
}
