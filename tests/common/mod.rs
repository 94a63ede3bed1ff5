//! Shared test scaffolding (spec §8 end-to-end scenarios).
//!
//! `uthread::Runtime` is a single process-wide singleton, so tests that
//! touch it cannot run concurrently the way cargo's default test harness
//! runs a binary's `#[test]` functions by default. Every test in this
//! suite carries `#[sequential]` from the `sequential_test` crate (the
//! same discipline the teacher applies to its own task-manager tests) to
//! force them onto one thread; `with_runtime` only adds the panic-safety
//! net `#[sequential]` does not provide on its own.

use uthread::{Runtime, RuntimeConfig};

/// Initialize a runtime for the duration of `body`, guaranteed to shut
/// down afterward even if `body` panics (so a failing test doesn't
/// poison every test that runs after it in the same process).
pub fn with_runtime<F>(config: RuntimeConfig, body: F)
where
    F: FnOnce(&Runtime) + std::panic::UnwindSafe,
{
    let rt = Runtime::init(config).expect("runtime init");
    let result = std::panic::catch_unwind(|| body(&rt));
    rt.shutdown();
    if let Err(payload) = result {
        std::panic::resume_unwind(payload);
    }
}
