//! End-to-end check that the fixed-priority policy actually governs
//! dispatch order (spec §8 end-to-end scenario 6): several threads are
//! all made ready before any of them run, and the highest priority one
//! must be the first to record itself.
//!
//! Every thread here runs to completion without yielding, so on this
//! single-OS-thread runtime at most one body is ever executing at once;
//! the shared log is append-only and never touched concurrently, the
//! same reasoning `tests/parallel_counter.rs` relies on for its mutex.

mod common;

use sequential_test::sequential;

use common::with_runtime;
use std::cell::UnsafeCell;
use std::sync::Arc;
use uthread::thread::{self, attr::ThreadAttr};
use uthread::{RuntimeConfig, SchedPolicyKind};

struct Log(UnsafeCell<Vec<u8>>);
unsafe impl Sync for Log {}
unsafe impl Send for Log {}

#[test]
#[sequential]
fn higher_priority_threads_run_before_lower_ones() {
    with_runtime(
        RuntimeConfig::new().policy(SchedPolicyKind::Priority),
        |_rt| {
            let log = Arc::new(Log(UnsafeCell::new(Vec::new())));
            // Spawned out of priority order on purpose, so the result
            // only matches if the scheduler is doing the sorting.
            let priorities: [u8; 5] = [10, 30, 5, 20, 0];

            let mut handles = Vec::new();
            for &priority in &priorities {
                let log = Arc::clone(&log);
                let attr = ThreadAttr::new().set_priority(priority).unwrap();
                handles.push(
                    thread::spawn(attr, move || unsafe {
                        (*log.0.get()).push(priority);
                    })
                    .expect("spawn"),
                );
            }

            for handle in handles {
                handle.join().expect("join");
            }

            let recorded = unsafe { (*log.0.get()).clone() };
            let mut expected = priorities;
            expected.sort_unstable_by(|a, b| b.cmp(a));
            assert_eq!(recorded, expected.to_vec());
        },
    );
}
