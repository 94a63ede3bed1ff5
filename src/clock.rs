//! Monotonic nanosecond clock (spec §4.1 "Time source", component 1).
//!
//! Mirrors the teacher's `timer::TickType` / `get_time` pair (`timer.rs`,
//! `ports/*/hardware_timer.rs`), but the host port is backed by
//! [`std::time::Instant`] rather than a polled hardware register, since a
//! hosted userspace runtime has no register to poll.

use std::sync::OnceLock;
use std::time::Instant;

/// Nanosecond timestamp type used throughout the runtime: thread
/// start/total-runtime counters, vruntime deltas, sleep/timedwait
/// deadlines.
pub type Nanos = u64;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call to any clock function in this
/// process. Monotonic for the lifetime of the process; never goes
/// backwards, saturates rather than panicking on pathological durations.
pub fn now_ns() -> Nanos {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos().min(u64::MAX as u128) as Nanos
}

/// `lhs - rhs` saturating at zero, the form every elapsed-time computation
/// in the scheduler needs (a sleeping preemption can make `now` observed
/// by two callers disagree on ordering by a few nanoseconds).
pub fn saturating_sub(lhs: Nanos, rhs: Nanos) -> Nanos {
    lhs.saturating_sub(rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_non_decreasing() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn saturating_sub_never_underflows() {
        assert_eq!(saturating_sub(5, 10), 0);
        assert_eq!(saturating_sub(10, 5), 5);
    }
}
