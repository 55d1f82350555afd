//! Device enumeration and OpenCL context setup (C1 Device Probe).

use ocl::{Context, Device, DeviceType, Platform, Queue};
use thiserror::Error;

use crate::vendor::Vendor;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No OpenCL platforms found")]
    NoPlatforms,
    #[error("No GPU devices found")]
    NoDevices,
    #[error("platform index {0} out of range ({1} platforms)")]
    PlatformIndexOutOfRange(usize, usize),
    #[error("device index {0} out of range ({1} devices on platform)")]
    DeviceIndexOutOfRange(usize, usize),
    #[error("OpenCL error: {0}")]
    Ocl(#[from] ocl::Error),
    #[error("{0}")]
    Other(String),
}

/// Static information about one enumerated device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub platform_idx: usize,
    pub device_idx: usize,
    pub platform_name: String,
    pub device_name: String,
    pub vendor_string: String,
    pub vendor: Vendor,
    pub compute_units: u32,
    pub max_clock_mhz: u32,
    pub max_work_group_size: usize,
    pub max_mem_alloc_size: u64,
    pub global_mem_size: u64,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {} - {} ({} CUs, {} MHz, {} MB global)",
            self.platform_idx,
            self.device_idx,
            self.vendor_string.trim(),
            self.device_name.trim(),
            self.compute_units,
            self.max_clock_mhz,
            self.global_mem_size / (1024 * 1024),
        )
    }
}

/// An acquired OpenCL context bound to one selected device, plus its compute
/// queue. The (optional) transfer queue used by the double-buffered dispatch
/// pipeline is created separately by `GpuContext::transfer_queue`, since not
/// every run needs one (see `--no-double-buffer`).
pub struct GpuContext {
    context: Context,
    device: Device,
    compute_queue: Queue,
    info: DeviceInfo,
}

impl GpuContext {
    /// Acquire a context for `(platform_idx, device_idx)`.
    pub fn with_device(platform_idx: usize, device_idx: usize) -> Result<Self, GpuError> {
        let platforms = Platform::list();
        if platforms.is_empty() {
            return Err(GpuError::NoPlatforms);
        }
        let platform = *platforms
            .get(platform_idx)
            .ok_or(GpuError::PlatformIndexOutOfRange(platform_idx, platforms.len()))?;

        let devices = Device::list(platform, Some(DeviceType::ALL))?;
        let device = devices
            .get(device_idx)
            .copied()
            .ok_or(GpuError::DeviceIndexOutOfRange(device_idx, devices.len()))?;

        let info = describe_device(platform_idx, device_idx, platform, device)?;

        let context = Context::builder().platform(platform).devices(device).build()?;
        let compute_queue = Queue::new(&context, device, None)?;

        Ok(Self {
            context,
            device,
            compute_queue,
            info,
        })
    }

    /// Create the dispatch pipeline's second, transfer-only queue.
    pub fn new_transfer_queue(&self) -> Result<Queue, GpuError> {
        Ok(Queue::new(&self.context, self.device, None)?)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn compute_queue(&self) -> &Queue {
        &self.compute_queue
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Enumerate every platform/device pair, used by `--list_devices`.
    pub fn enumerate_devices() -> Result<Vec<DeviceInfo>, GpuError> {
        let platforms = Platform::list();
        if platforms.is_empty() {
            return Err(GpuError::NoPlatforms);
        }
        let mut out = Vec::new();
        for (platform_idx, platform) in platforms.iter().enumerate() {
            let devices = Device::list(*platform, Some(DeviceType::ALL)).unwrap_or_default();
            for (device_idx, device) in devices.iter().enumerate() {
                if let Ok(info) = describe_device(platform_idx, device_idx, *platform, *device) {
                    out.push(info);
                }
            }
        }
        Ok(out)
    }
}

fn describe_device(
    platform_idx: usize,
    device_idx: usize,
    platform: Platform,
    device: Device,
) -> Result<DeviceInfo, GpuError> {
    let platform_name = platform
        .info(ocl::enums::PlatformInfo::Name)
        .map(|i| i.to_string())
        .unwrap_or_else(|_| "Unknown".into());

    let device_name = device
        .info(ocl::enums::DeviceInfo::Name)
        .map(|i| i.to_string())
        .unwrap_or_else(|_| "Unknown".into());

    let vendor_string = device
        .info(ocl::enums::DeviceInfo::Vendor)
        .map(|i| i.to_string())
        .unwrap_or_else(|_| "Unknown".into());

    let compute_units = match device.info(ocl::enums::DeviceInfo::MaxComputeUnits)? {
        ocl::enums::DeviceInfoResult::MaxComputeUnits(n) => n,
        _ => 0,
    };
    let max_clock_mhz = match device.info(ocl::enums::DeviceInfo::MaxClockFrequency)? {
        ocl::enums::DeviceInfoResult::MaxClockFrequency(n) => n,
        _ => 0,
    };
    let max_work_group_size = match device.info(ocl::enums::DeviceInfo::MaxWorkGroupSize)? {
        ocl::enums::DeviceInfoResult::MaxWorkGroupSize(n) => n,
        _ => 256,
    };
    let max_mem_alloc_size = match device.info(ocl::enums::DeviceInfo::MaxMemAllocSize)? {
        ocl::enums::DeviceInfoResult::MaxMemAllocSize(n) => n,
        _ => 0,
    };
    let global_mem_size = match device.info(ocl::enums::DeviceInfo::GlobalMemSize)? {
        ocl::enums::DeviceInfoResult::GlobalMemSize(n) => n,
        _ => 0,
    };

    Ok(DeviceInfo {
        platform_idx,
        device_idx,
        platform_name,
        device_name,
        vendor: Vendor::classify(&vendor_string),
        vendor_string,
        compute_units,
        max_clock_mhz,
        max_work_group_size,
        max_mem_alloc_size,
        global_mem_size,
    })
}

/// Try to create a context, returning `None` if no device is available.
/// Used by tests to skip gracefully rather than fail when no OpenCL ICD is
/// installed in the environment running `cargo test`. Also catches panics
/// the OpenCL loader raises when no ICD is present at all.
#[cfg(test)]
pub(crate) fn try_ctx(platform_idx: usize, device_idx: usize) -> Option<GpuContext> {
    match std::panic::catch_unwind(|| GpuContext::with_device(platform_idx, device_idx)) {
        Ok(Ok(ctx)) => Some(ctx),
        Ok(Err(e)) => {
            eprintln!("Skipping GPU test (no OpenCL device available): {e}");
            None
        }
        Err(_) => {
            eprintln!("Skipping GPU test (OpenCL runtime panicked - likely no ICD installed)");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::GPU_TEST_LOCK;

    #[test]
    fn test_enumerate_devices() {
        let _guard = GPU_TEST_LOCK.get_or_init(Default::default).lock().unwrap();
        match std::panic::catch_unwind(GpuContext::enumerate_devices) {
            Ok(Ok(devices)) => {
                println!("OpenCL devices found: {}", devices.len());
                for dev in &devices {
                    println!("  {dev}");
                }
            }
            Ok(Err(e)) => eprintln!("Skipping enumerate_devices test: {e}"),
            Err(_) => eprintln!("Skipping enumerate_devices test (OpenCL runtime panicked)"),
        }
    }

    #[test]
    fn test_with_device() {
        let _guard = GPU_TEST_LOCK.get_or_init(Default::default).lock().unwrap();
        let Some(ctx) = try_ctx(0, 0) else { return };
        println!("Created context for: {}", ctx.info());
        assert!(ctx.new_transfer_queue().is_ok());
    }
}
