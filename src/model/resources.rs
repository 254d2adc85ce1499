//! Resource-footprint value type, shared by templates, deployments, and node capacity.

use serde::{Deserialize, Serialize};

/// A CPU/memory/disk footprint. Used both as a template's declared requirement and as the
/// resource snapshot captured onto a deployment at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Fractional CPU cores, e.g. `1.5`.
    pub cpu_cores: f64,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Disk in megabytes.
    pub disk_mb: u64,
}

impl Resources {
    /// The zero resource footprint, the identity element of [`Resources::plus`].
    #[must_use]
    pub fn zero() -> Self {
        Self {
            cpu_cores: 0.0,
            memory_mb: 0,
            disk_mb: 0,
        }
    }

    /// Adds another footprint's resources to this one. Monotone and non-negative as long
    /// as both operands are.
    #[must_use]
    pub fn plus(self, other: Resources) -> Self {
        Self {
            cpu_cores: self.cpu_cores + other.cpu_cores,
            memory_mb: self.memory_mb + other.memory_mb,
            disk_mb: self.disk_mb + other.disk_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_is_monotone_and_nonnegative() {
        let a = Resources {
            cpu_cores: 0.5,
            memory_mb: 256,
            disk_mb: 1024,
        };
        let b = Resources {
            cpu_cores: 1.0,
            memory_mb: 512,
            disk_mb: 0,
        };
        let sum = a.plus(b);
        assert!(sum.cpu_cores >= a.cpu_cores && sum.cpu_cores >= b.cpu_cores);
        assert!(sum.memory_mb >= a.memory_mb && sum.memory_mb >= b.memory_mb);
        assert!(sum.disk_mb >= a.disk_mb);
    }

    #[test]
    fn zero_is_identity() {
        let a = Resources {
            cpu_cores: 2.0,
            memory_mb: 1024,
            disk_mb: 2048,
        };
        assert_eq!(a.plus(Resources::zero()), a);
    }

    proptest::proptest! {
        #[test]
        fn plus_is_monotone_for_arbitrary_nonnegative_footprints(
            a_cpu in 0.0f64..1000.0,
            a_mem in 0u64..1_000_000,
            a_disk in 0u64..1_000_000,
            b_cpu in 0.0f64..1000.0,
            b_mem in 0u64..1_000_000,
            b_disk in 0u64..1_000_000,
        ) {
            let a = Resources { cpu_cores: a_cpu, memory_mb: a_mem, disk_mb: a_disk };
            let b = Resources { cpu_cores: b_cpu, memory_mb: b_mem, disk_mb: b_disk };
            let sum = a.plus(b);
            proptest::prop_assert!(sum.cpu_cores >= a.cpu_cores && sum.cpu_cores >= b.cpu_cores);
            proptest::prop_assert!(sum.memory_mb >= a.memory_mb && sum.memory_mb >= b.memory_mb);
            proptest::prop_assert!(sum.disk_mb >= a.disk_mb && sum.disk_mb >= b.disk_mb);
        }
    }
}
