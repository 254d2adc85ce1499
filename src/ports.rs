//! Proxy-port allocation: a pure function over a node's currently-used port set.

use std::collections::HashSet;

use uuid::Uuid;

use crate::errors::HosterError;

/// Default lower bound (inclusive) of the proxy-port range.
pub const DEFAULT_RANGE_LO: u16 = 30_000;
/// Default upper bound (inclusive) of the proxy-port range.
pub const DEFAULT_RANGE_HI: u16 = 40_000;

/// Returns the smallest port in `[lo, hi]` absent from `used`.
///
/// # Errors
///
/// Returns [`HosterError::NoFreePort`] if every port in the range is already in `used`.
pub fn allocate(node_id: Uuid, used: &HashSet<u16>, lo: u16, hi: u16) -> Result<u16, HosterError> {
    (lo..=hi)
        .find(|port| !used.contains(port))
        .ok_or(HosterError::NoFreePort { node_id, lo, hi })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_smallest_free_port() {
        let mut used = HashSet::new();
        used.insert(30_000);
        used.insert(30_001);
        let port = allocate(Uuid::new_v4(), &used, 30_000, 30_010).unwrap();
        assert_eq!(port, 30_002);
    }

    #[test]
    fn empty_used_set_returns_lower_bound() {
        let port = allocate(Uuid::new_v4(), &HashSet::new(), 30_000, 30_010).unwrap();
        assert_eq!(port, 30_000);
    }

    #[test]
    fn fully_allocated_range_errors() {
        let used: HashSet<u16> = (30_000..=30_010).collect();
        let err = allocate(Uuid::new_v4(), &used, 30_000, 30_010).unwrap_err();
        assert!(matches!(err, HosterError::NoFreePort { .. }));
    }

    #[test]
    fn returned_port_never_in_used_set() {
        let mut used = HashSet::new();
        for p in 30_000..30_005 {
            used.insert(p);
        }
        let port = allocate(Uuid::new_v4(), &used, 30_000, 30_020).unwrap();
        assert!(!used.contains(&port));
        assert!((30_000..=30_020).contains(&port));
    }

    proptest::proptest! {
        #[test]
        fn allocated_port_is_always_in_range_and_free(used in proptest::collection::hash_set(30_000u16..30_050, 0..40)) {
            if let Ok(port) = allocate(Uuid::new_v4(), &used, 30_000, 30_049) {
                proptest::prop_assert!(!used.contains(&port));
                proptest::prop_assert!((30_000..=30_049).contains(&port));
            }
        }
    }
}
