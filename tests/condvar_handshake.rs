//! One thread waits on a condition variable for another to flip a flag
//! and signal it (spec §8 end-to-end scenario 2, and the spurious-wakeup
//! contract from spec §5: the waiter re-checks its predicate in a loop).

mod common;

use sequential_test::sequential;

use common::with_runtime;
use std::cell::UnsafeCell;
use std::sync::Arc;
use uthread::sync::{Condvar, Mutex, MutexKind};
use uthread::thread::{self, attr::ThreadAttr};
use uthread::RuntimeConfig;

struct Shared {
    mutex: Mutex,
    condvar: Condvar,
    ready: UnsafeCell<bool>,
    observed: UnsafeCell<bool>,
}
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

#[test]
#[sequential]
fn waiter_observes_flag_only_after_signal() {
    with_runtime(RuntimeConfig::new(), |_rt| {
        let shared = Arc::new(Shared {
            mutex: Mutex::new(MutexKind::Normal),
            condvar: Condvar::new(),
            ready: UnsafeCell::new(false),
            observed: UnsafeCell::new(false),
        });

        let waiter_shared = Arc::clone(&shared);
        let waiter = thread::spawn(ThreadAttr::new(), move || {
            waiter_shared.mutex.lock().unwrap();
            // SAFETY: guarded by `mutex`, which `Condvar::wait` re-acquires
            // before returning.
            while unsafe { !*waiter_shared.ready.get() } {
                waiter_shared.condvar.wait(&waiter_shared.mutex).unwrap();
            }
            unsafe {
                *waiter_shared.observed.get() = true;
            }
            waiter_shared.mutex.unlock().unwrap();
        })
        .expect("spawn waiter");

        let signaler_shared = Arc::clone(&shared);
        let signaler = thread::spawn(ThreadAttr::new(), move || {
            signaler_shared.mutex.lock().unwrap();
            unsafe {
                *signaler_shared.ready.get() = true;
            }
            signaler_shared.condvar.notify_one();
            signaler_shared.mutex.unlock().unwrap();
        })
        .expect("spawn signaler");

        signaler.join().expect("join signaler");
        waiter.join().expect("join waiter");

        assert!(unsafe { *shared.observed.get() });
    });
}
