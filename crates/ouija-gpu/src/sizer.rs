//! Batch and work-group sizing heuristics (C2 Sizer).

use ouija_core::ResultRecord;

use crate::context::DeviceInfo;
use crate::vendor::Vendor;

/// Never let a batch's capacity drop below this, regardless of how
/// constrained the device's memory is.
pub const MIN_CAPACITY: usize = 1024;

/// Result of the sizing pass for one run: fixed for its lifetime.
#[derive(Clone, Copy, Debug)]
pub struct Sizing {
    pub work_group_size: usize,
    pub capacity: usize,
}

impl Sizing {
    /// Derive work-group size and safe batch capacity for `device`, given the
    /// user's `-g` override (`0` means "auto by vendor") and batch multiplier
    /// `batch_multiplier` (the `-b` flag).
    pub fn compute(device: &DeviceInfo, requested_work_group_size: usize, batch_multiplier: usize) -> Self {
        let work_group_size = if requested_work_group_size > 0 {
            if requested_work_group_size > device.max_work_group_size {
                log::info!(
                    "requested work-group size {} exceeds device max {}, clamping",
                    requested_work_group_size,
                    device.max_work_group_size
                );
            }
            requested_work_group_size.min(device.max_work_group_size)
        } else {
            device
                .vendor
                .default_work_group_size()
                .min(device.max_work_group_size)
        };

        let base_batch = work_group_size * device.compute_units.max(1) as usize;
        let requested_capacity = base_batch.saturating_mul(batch_multiplier.max(1));

        let safe_cap = safe_batch_cap(device);
        let capacity = shrink_to_fit(requested_capacity, safe_cap);

        Sizing {
            work_group_size,
            capacity,
        }
    }

    /// Global work size for a batch of logical size `n`: rounds up to the
    /// next multiple of the work-group size.
    pub fn global_work_size(&self, n: usize) -> usize {
        if self.work_group_size == 0 {
            return n;
        }
        n.div_ceil(self.work_group_size) * self.work_group_size
    }
}

/// Vendor-dependent memory ceiling for a single batch's result buffer,
/// bounded above by the device's reported max single-allocation size.
fn safe_batch_cap(device: &DeviceInfo) -> u64 {
    let vendor_limit = device.global_mem_size / device.vendor.memory_fraction_divisor();
    vendor_limit.min(device.max_mem_alloc_size)
}

/// Halve `requested_capacity` until `ResultRecord`-sized buffers fit within
/// `safe_cap`, or until it would fall below [`MIN_CAPACITY`] — the floor
/// always wins, even if that means exceeding the safe cap.
fn shrink_to_fit(requested_capacity: usize, safe_cap: u64) -> usize {
    let record_size = std::mem::size_of::<ResultRecord>() as u64;
    let mut capacity = requested_capacity.max(1);
    while record_size * capacity as u64 > safe_cap && capacity > MIN_CAPACITY {
        capacity /= 2;
    }
    capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(vendor: Vendor, compute_units: u32, global_mem_gib: u64, max_alloc_gib: u64) -> DeviceInfo {
        DeviceInfo {
            platform_idx: 0,
            device_idx: 0,
            platform_name: "test".into(),
            device_name: "test".into(),
            vendor_string: "test".into(),
            vendor,
            compute_units,
            max_clock_mhz: 1000,
            max_work_group_size: 1024,
            max_mem_alloc_size: max_alloc_gib * (1 << 30),
            global_mem_size: global_mem_gib * (1 << 30),
        }
    }

    #[test]
    fn s2_single_batch_static_cutoff_sizing() {
        let device = device(Vendor::Unknown, 56, 64, 16);
        let sizing = Sizing::compute(&device, 32, 1);
        assert_eq!(sizing.work_group_size, 32);
        assert_eq!(sizing.capacity, 32 * 56);
        assert_eq!(sizing.global_work_size(128), 128);
    }

    #[test]
    fn vendor_default_work_group_size_used_when_g_is_zero() {
        let device = device(Vendor::Amd, 10, 8, 2);
        let sizing = Sizing::compute(&device, 0, 1);
        assert_eq!(sizing.work_group_size, 64);
    }

    #[test]
    fn user_g_is_clamped_to_device_max() {
        let mut device = device(Vendor::Nvidia, 10, 8, 2);
        device.max_work_group_size = 16;
        let sizing = Sizing::compute(&device, 256, 1);
        assert_eq!(sizing.work_group_size, 16);
    }

    #[test]
    fn s4_amd_sizing_halves_down_to_safe_cap() {
        // 8 GiB global, 2 GiB max-alloc; requested capacity ~100M records.
        let device = device(Vendor::Amd, 2170, 8, 2);
        // base_batch = work_group(64) * compute_units; force requested_capacity
        // to ~100M directly via a large multiplier instead of deriving CU count.
        let sizing = Sizing::compute(&device, 64, 100_000_000 / 64);
        let safe_cap = safe_batch_cap(&device);
        let record_size = std::mem::size_of::<ResultRecord>() as u64;
        assert!(record_size * sizing.capacity as u64 <= safe_cap || sizing.capacity == MIN_CAPACITY);
        assert!(sizing.capacity < 100_000_000 / 64);
    }

    #[test]
    fn capacity_never_drops_below_floor() {
        let device = device(Vendor::Intel, 1, 1, 1);
        let sizing = Sizing::compute(&device, 16, 1);
        assert!(sizing.capacity >= MIN_CAPACITY);
    }

    #[test]
    fn global_work_size_rounds_up_to_group_multiple() {
        let sizing = Sizing {
            work_group_size: 32,
            capacity: 1000,
        };
        assert_eq!(sizing.global_work_size(100), 128);
        assert_eq!(sizing.global_work_size(96), 96);
    }
}
