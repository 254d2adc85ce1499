//! Naming & label generator (C3): deterministic container/network/volume names, generated
//! hostnames, and reverse-proxy routing labels.
//!
//! Every function here is pure; the same inputs always produce the same outputs.

use indexmap::IndexMap;
use rand::Rng;
use uuid::Uuid;

/// Number of hex characters appended to a slug to form a deployment name.
const DEPLOYMENT_SUFFIX_LEN: usize = 6;

/// Lowercases `name`, keeps `[a-z0-9-]`, maps spaces to `-`, drops everything else.
///
/// Idempotent: `slugify(slugify(s)) == slugify(s)` for all `s`.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c == '-' || c == ' ' {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

/// Generates a user-visible deployment name: `{slug}-{6 hex chars}` from a cryptographic RNG.
#[must_use]
pub fn generate_deployment_name(slug: &str) -> String {
    let mut rng = rand::rngs::OsRng;
    let suffix: String = (0..DEPLOYMENT_SUFFIX_LEN)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).expect("0..16 is a valid hex digit"))
        .collect();
    format!("{slug}-{suffix}")
}

/// Generates the deterministic auto-domain hostname for `deployment_name` under `base`.
#[must_use]
pub fn generate_domain(deployment_name: &str, base: &str) -> String {
    format!("{}.{base}", slugify(deployment_name))
}

/// Deployment-scoped Docker network name.
#[must_use]
pub fn network_name(deployment_id: Uuid) -> String {
    format!("hoster_{deployment_id}")
}

/// Deployment-scoped Docker volume name for a Compose-declared named volume.
#[must_use]
pub fn volume_name(deployment_id: Uuid, logical_volume: &str) -> String {
    format!("hoster_{deployment_id}_{logical_volume}")
}

/// Deployment-scoped Docker container name for a Compose service.
#[must_use]
pub fn container_name(deployment_id: Uuid, service: &str) -> String {
    format!("hoster_{deployment_id}_{service}")
}

/// Reverse-proxy label key: whether proxying is enabled for this container.
pub const LABEL_PROXY_ENABLE: &str = "hoster.proxy.enable";
/// Reverse-proxy label key: the router rule matching incoming host headers.
pub const LABEL_PROXY_ROUTER_RULE: &str = "hoster.proxy.router.rule";
/// Reverse-proxy label key: the logical backend service name.
pub const LABEL_PROXY_ROUTER_SERVICE: &str = "hoster.proxy.router.service";
/// Reverse-proxy label key: the in-container port the backend listens on.
pub const LABEL_PROXY_SERVICE_PORT: &str = "hoster.proxy.service.port";

/// Builds the fixed reverse-proxy routing label set for a service that exposes an HTTP
/// port at `container_port`, routed under `hostname`.
#[must_use]
pub fn proxy_labels(hostname: &str, service: &str, container_port: u16) -> IndexMap<String, String> {
    let mut labels = IndexMap::new();
    labels.insert(LABEL_PROXY_ENABLE.to_string(), "true".to_string());
    labels.insert(
        LABEL_PROXY_ROUTER_RULE.to_string(),
        format!("Host(`{hostname}`)"),
    );
    labels.insert(LABEL_PROXY_ROUTER_SERVICE.to_string(), service.to_string());
    labels.insert(LABEL_PROXY_SERVICE_PORT.to_string(), container_port.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_maps_spaces() {
        assert_eq!(slugify("My Cool App"), "my-cool-app");
    }

    #[test]
    fn slugify_drops_unsupported_characters() {
        assert_eq!(slugify("Hello, World! 123"), "hello-world-123");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify("Redis Cache #1");
        let twice = slugify(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn deployment_name_has_slug_prefix_and_hex_suffix() {
        let name = generate_deployment_name("redis-cache");
        assert!(name.starts_with("redis-cache-"));
        let suffix = name.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), DEPLOYMENT_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_domain_slugifies_and_appends_base() {
        assert_eq!(generate_domain("My App 1", "hoster.cloud"), "my-app-1.hoster.cloud");
    }

    #[test]
    fn resource_names_are_namespaced_and_deterministic() {
        let id = Uuid::nil();
        assert_eq!(network_name(id), format!("hoster_{id}"));
        assert_eq!(volume_name(id, "data"), format!("hoster_{id}_data"));
        assert_eq!(container_name(id, "web"), format!("hoster_{id}_web"));
    }

    #[test]
    fn proxy_labels_are_fixed_and_complete() {
        let labels = proxy_labels("app.hoster.cloud", "web", 80);
        assert_eq!(labels.get(LABEL_PROXY_ENABLE).map(String::as_str), Some("true"));
        assert_eq!(
            labels.get(LABEL_PROXY_ROUTER_RULE).map(String::as_str),
            Some("Host(`app.hoster.cloud`)")
        );
        assert_eq!(labels.get(LABEL_PROXY_ROUTER_SERVICE).map(String::as_str), Some("web"));
        assert_eq!(labels.get(LABEL_PROXY_SERVICE_PORT).map(String::as_str), Some("80"));
    }

    proptest::proptest! {
        #[test]
        fn slugify_is_idempotent_for_any_input(s in "\\PC*") {
            let once = slugify(&s);
            let twice = slugify(&once);
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn slugify_never_produces_uppercase_or_disallowed_chars(s in "\\PC*") {
            let slug = slugify(&s);
            proptest::prop_assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}
