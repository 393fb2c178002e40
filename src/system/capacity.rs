//! Problem-size derivation from available memory
//!
//! Host RAM and accelerator RAM are sized through the same path; callers only
//! differ in which per-device quantity and device count they pass to
//! [`total_memory_bytes`].

use crate::error::{HarnessError, Result};

/// Size of one double-precision element
pub const DOUBLE_BYTES: u64 = 8;

/// Granularity used when rounding problem sizes
pub const DEFAULT_ROUNDING: u64 = 10_000;

/// Fraction of memory targeted by the auto-tuner's sizing pass
pub const DEFAULT_UTILIZATION: f64 = 0.9;

/// Aggregate memory of `device_count` devices on each of `node_count` nodes
pub fn total_memory_bytes(per_device_bytes: f64, device_count: usize, node_count: usize) -> f64 {
    per_device_bytes * device_count as f64 * node_count as f64
}

/// Largest square-matrix dimension that fits `utilization` of the memory.
///
/// The dimension is rounded down to a multiple of `rounding`, so
/// `n * n * element_bytes` never exceeds `total_bytes_available * utilization`.
pub fn matrix_dimension(
    total_bytes_available: f64,
    utilization: f64,
    element_bytes: u64,
    rounding: u64,
) -> Result<u64> {
    if !(utilization > 0.0 && utilization <= 1.0) {
        return Err(HarnessError::config(format!(
            "utilization must be in (0, 1], got {}",
            utilization
        )));
    }
    if element_bytes == 0 || rounding == 0 {
        return Err(HarnessError::config(
            "element size and rounding must be positive",
        ));
    }
    if !total_bytes_available.is_finite() || total_bytes_available <= 0.0 {
        return Err(HarnessError::config(format!(
            "no usable memory ({} bytes)",
            total_bytes_available
        )));
    }

    let usable = total_bytes_available * utilization;
    let raw = (usable / element_bytes as f64).sqrt();

    if raw < rounding as f64 {
        return Err(HarnessError::config(format!(
            "{} usable bytes cannot hold a {}x{} matrix",
            usable as u64, rounding, rounding
        )));
    }

    let mut n = (raw / rounding as f64).floor() as u64 * rounding;

    // Guard against sqrt rounding up across a multiple boundary
    while n > 0 && (n as f64) * (n as f64) * element_bytes as f64 > usable {
        n -= rounding;
    }

    if n == 0 {
        return Err(HarnessError::config("no sane problem size fits in memory"));
    }

    Ok(n)
}

/// Physical memory of the local host in bytes
pub fn host_memory_bytes() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.total_memory()
}

/// Convenience wrapper with double elements and the default rounding
pub fn hpl_matrix_dimension(total_bytes_available: f64, utilization: f64) -> Result<u64> {
    matrix_dimension(total_bytes_available, utilization, DOUBLE_BYTES, DEFAULT_ROUNDING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    #[test]
    fn test_eight_gib() {
        // sqrt(0.9 * 8 GiB / 8) ~= 31086
        let n = matrix_dimension(8.0 * GIB, 0.9, 8, 10_000).unwrap();
        assert_eq!(n, 30_000);
    }

    #[test]
    fn test_four_a100_nodes() {
        // 4 x 40 GiB per node, 2 nodes
        let total = total_memory_bytes(40.0 * GIB, 4, 2);
        assert_eq!(total, 320.0 * GIB);
        let n = hpl_matrix_dimension(total, DEFAULT_UTILIZATION).unwrap();
        assert_eq!(n, 190_000);
    }

    #[test]
    fn test_too_small() {
        assert!(matrix_dimension(1024.0 * 1024.0, 0.9, 8, 10_000).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matrix_dimension(GIB, 0.0, 8, 10_000).is_err());
        assert!(matrix_dimension(GIB, 1.5, 8, 10_000).is_err());
        assert!(matrix_dimension(GIB, 0.9, 0, 10_000).is_err());
        assert!(matrix_dimension(GIB, 0.9, 8, 0).is_err());
        assert!(matrix_dimension(f64::NAN, 0.9, 8, 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_monotonic_and_bounded(
            gib in 1u64..4096,
            u1 in 0.05f64..1.0,
            u2 in 0.05f64..1.0,
        ) {
            let mem = gib as f64 * GIB;
            let (lo, hi) = if u1 <= u2 { (u1, u2) } else { (u2, u1) };

            if let (Ok(a), Ok(b)) = (
                matrix_dimension(mem, lo, 8, 1000),
                matrix_dimension(mem, hi, 8, 1000),
            ) {
                prop_assert!(a <= b);
                prop_assert!((b as f64) * (b as f64) * 8.0 <= mem * hi);
                prop_assert_eq!(b % 1000, 0);
            }
        }
    }
}
