//! Shared GPU test scaffolding, reused across this crate's `#[cfg(test)]` modules.

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

/// Serializes any test that touches a real OpenCL context, avoiding
/// concurrent-context driver issues under `cargo test`'s default parallel
/// runner.
#[cfg(test)]
pub(crate) static GPU_TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Run `f` on a thread with a larger stack, for OpenCL compiler calls that
/// are known to need more stack than the test harness's default thread.
#[cfg(test)]
pub(crate) fn run_with_big_stack<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .stack_size(16 * 1024 * 1024)
        .spawn(f)
        .expect("spawn big-stack test thread")
        .join()
        .expect("big-stack test thread panicked")
}
