//! Many waiters parked on one condition variable, released all at once by
//! a single `notify_all` (spec §8 end-to-end scenario 3).

mod common;

use sequential_test::sequential;

use common::with_runtime;
use std::cell::UnsafeCell;
use std::sync::Arc;
use uthread::sync::{Condvar, Mutex, MutexKind};
use uthread::thread::{self, attr::ThreadAttr};
use uthread::RuntimeConfig;

const WAITERS: usize = 16;

struct Shared {
    mutex: Mutex,
    condvar: Condvar,
    go: UnsafeCell<bool>,
    woken: UnsafeCell<u32>,
}
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

#[test]
#[sequential]
fn notify_all_wakes_every_waiter() {
    with_runtime(RuntimeConfig::new(), |_rt| {
        let shared = Arc::new(Shared {
            mutex: Mutex::new(MutexKind::Normal),
            condvar: Condvar::new(),
            go: UnsafeCell::new(false),
            woken: UnsafeCell::new(0),
        });

        let mut handles = Vec::new();
        for _ in 0..WAITERS {
            let shared = Arc::clone(&shared);
            handles.push(
                thread::spawn(ThreadAttr::new(), move || {
                    shared.mutex.lock().unwrap();
                    while unsafe { !*shared.go.get() } {
                        shared.condvar.wait(&shared.mutex).unwrap();
                    }
                    unsafe {
                        *shared.woken.get() += 1;
                    }
                    shared.mutex.unlock().unwrap();
                })
                .expect("spawn waiter"),
            );
        }

        let releaser_shared = Arc::clone(&shared);
        let releaser = thread::spawn(ThreadAttr::new(), move || {
            releaser_shared.mutex.lock().unwrap();
            unsafe {
                *releaser_shared.go.get() = true;
            }
            releaser_shared.condvar.notify_all();
            releaser_shared.mutex.unlock().unwrap();
        })
        .expect("spawn releaser");

        releaser.join().expect("join releaser");
        for handle in handles {
            handle.join().expect("join waiter");
        }

        assert_eq!(unsafe { *shared.woken.get() }, WAITERS as u32);
    });
}
