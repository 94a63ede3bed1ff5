//! Short-lived threads created and joined in a tight loop (spec §8
//! stress scenario): the thread table must never leak a slot across many
//! spawn/join cycles, and round-robin must make progress on each one
//! without starving later cycles.

mod common;

use sequential_test::sequential;

use common::with_runtime;
use uthread::thread::{self, attr::ThreadAttr};
use uthread::RuntimeConfig;

const CYCLES: usize = 100;

#[test]
#[sequential]
fn one_hundred_short_lived_threads_leave_no_zombie_slots() {
    with_runtime(RuntimeConfig::new(), |rt| {
        for i in 0..CYCLES {
            let handle = thread::spawn(ThreadAttr::new(), move || i * 2).expect("spawn");
            let result = handle.join().expect("join");
            assert_eq!(result, i * 2);
        }
        // The host thread itself occupies slot 0; nothing else should
        // remain live after every cycle joined cleanly.
        assert_eq!(rt.stats().thread_count, 1);
    });
}

#[test]
#[sequential]
fn many_threads_spawned_before_any_join_all_still_complete() {
    with_runtime(RuntimeConfig::new(), |rt| {
        let handles: Vec<_> = (0..CYCLES)
            .map(|i| thread::spawn(ThreadAttr::new(), move || i).expect("spawn"))
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().expect("join"), i);
        }
        assert_eq!(rt.stats().thread_count, 1);
    });
}
