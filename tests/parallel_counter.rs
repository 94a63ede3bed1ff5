//! Several threads incrementing one counter behind a mutex (spec §8
//! end-to-end scenario 1).

mod common;

use sequential_test::sequential;

use common::with_runtime;
use std::cell::UnsafeCell;
use std::sync::Arc;
use uthread::sync::{Mutex, MutexKind};
use uthread::thread::{self, attr::ThreadAttr};
use uthread::RuntimeConfig;

const THREADS: usize = 10;
const INCREMENTS: usize = 1000;

/// A plain `u32` behind `unsafe impl Sync`, exactly like the runtime's
/// own sync primitives: every access here is already serialized by the
/// `Mutex` wrapping it, which is the property under test.
struct Counter(UnsafeCell<u32>);
unsafe impl Sync for Counter {}
unsafe impl Send for Counter {}

#[test]
#[sequential]
fn ten_threads_each_incrementing_a_thousand_times_reach_ten_thousand() {
    with_runtime(RuntimeConfig::new(), |_rt| {
        let mutex = Arc::new(Mutex::new(MutexKind::Normal));
        let counter = Arc::new(Counter(UnsafeCell::new(0)));
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            let handle = thread::spawn(ThreadAttr::new(), move || {
                for _ in 0..INCREMENTS {
                    mutex.lock().unwrap();
                    // SAFETY: only ever touched while `mutex` is held.
                    unsafe {
                        *counter.0.get() += 1;
                    }
                    mutex.unlock().unwrap();
                }
            })
            .expect("spawn");
            handles.push(handle);
        }
        for handle in handles {
            handle.join().expect("join");
        }
        // SAFETY: every thread above has joined; no concurrent access remains.
        assert_eq!(unsafe { *counter.0.get() }, (THREADS * INCREMENTS) as u32);
    });
}
