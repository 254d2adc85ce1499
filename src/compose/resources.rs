//! Resource accounting: sums the footprint a [`ParsedSpec`] will occupy on a node.

use super::parser::{
    ParsedSpec, Service, DEFAULT_SERVICE_CPU_CORES, DEFAULT_SERVICE_MEMORY_MB,
    VOLUME_DISK_OVERHEAD_MB,
};
use crate::model::Resources;

/// Computes the aggregate resource footprint of every service in `spec`.
///
/// Each service without a declared CPU/memory limit is assumed to need
/// [`DEFAULT_SERVICE_CPU_CORES`] cores and [`DEFAULT_SERVICE_MEMORY_MB`] megabytes. Disk is
/// not otherwise modeled, so each declared (non-external) named volume adds
/// [`VOLUME_DISK_OVERHEAD_MB`] of estimated disk usage once, regardless of how many
/// services mount it. The result is always the non-negative, monotone sum of its parts.
#[must_use]
pub fn calculate_resources(spec: &ParsedSpec) -> Resources {
    let compute = spec
        .services
        .iter()
        .map(service_footprint)
        .fold(Resources::zero(), Resources::plus);
    let disk_mb = spec.volumes.iter().filter(|v| !v.external).count() as u64 * VOLUME_DISK_OVERHEAD_MB;

    Resources {
        disk_mb,
        ..compute
    }
}

fn service_footprint(service: &Service) -> Resources {
    let cpu_cores = service.resources.cpu_limit.unwrap_or(DEFAULT_SERVICE_CPU_CORES);
    let memory_mb = service.resources.mem_limit_mb.unwrap_or(DEFAULT_SERVICE_MEMORY_MB);

    Resources {
        cpu_cores,
        memory_mb,
        disk_mb: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::parser::parse;

    #[test]
    fn defaults_applied_when_unset() {
        let yaml = "services:\n  web:\n    image: nginx\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.cpu_cores, DEFAULT_SERVICE_CPU_CORES);
        assert_eq!(resources.memory_mb, DEFAULT_SERVICE_MEMORY_MB);
        assert_eq!(resources.disk_mb, 0);
    }

    #[test]
    fn named_volume_adds_disk_overhead() {
        let yaml = "services:\n  db:\n    image: postgres\n    volumes:\n      - data:/var/lib/postgresql/data\nvolumes:\n  data: {}\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.disk_mb, VOLUME_DISK_OVERHEAD_MB);
    }

    #[test]
    fn volume_shared_by_multiple_services_is_charged_once() {
        let yaml = "services:\n  web:\n    image: nginx\n    volumes:\n      - data:/data\n  sidecar:\n    image: busybox\n    volumes:\n      - data:/data\nvolumes:\n  data: {}\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.disk_mb, VOLUME_DISK_OVERHEAD_MB);
    }

    #[test]
    fn external_volume_adds_no_disk_overhead() {
        let yaml = "services:\n  db:\n    image: postgres\n    volumes:\n      - data:/var/lib/postgresql/data\nvolumes:\n  data:\n    external: true\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.disk_mb, 0);
    }

    #[test]
    fn sum_is_monotone_across_services() {
        let yaml = "services:\n  a:\n    image: a\n  b:\n    image: b\n  c:\n    image: c\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.cpu_cores, DEFAULT_SERVICE_CPU_CORES * 3.0);
        assert_eq!(resources.memory_mb, DEFAULT_SERVICE_MEMORY_MB * 3);
    }

    #[test]
    fn explicit_limits_override_defaults() {
        let yaml = "services:\n  web:\n    image: nginx\n    deploy:\n      resources:\n        limits:\n          cpus: \"2\"\n          memory: \"1G\"\n";
        let spec = parse(yaml).unwrap();
        let resources = calculate_resources(&spec);
        assert_eq!(resources.cpu_cores, 2.0);
        assert_eq!(resources.memory_mb, 1024);
    }
}
