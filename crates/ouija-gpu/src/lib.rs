pub mod context;
pub mod kernel_cache;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod sizer;
pub mod vendor;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{DeviceInfo, GpuContext, GpuError};
pub use kernel_cache::{load_or_build, CompiledKernel, KERNEL_ENTRY_POINT};
pub use pipeline::{DispatchOutcome, DispatchPipeline, DispatchSummary};
pub use progress::{format_count, format_elapsed, format_eta, ProgressReporter};
pub use scanner::{scan_batch, ScanOutcome};
pub use sizer::{Sizing, MIN_CAPACITY};
pub use vendor::Vendor;
