//! Critical sections and the signal-driven preemption timer (spec §4.7,
//! §9 "Signal handler re-entrancy").
//!
//! The teacher masks interrupts around task-manager mutation with a raw
//! `critical_section::CriticalSection` token on embedded targets
//! (`task_manager.rs`); hosted userspace has no interrupt controller, so
//! the analogous primitive here masks `SIGALRM` with `sigprocmask`
//! instead. Nesting is tracked with a plain counter exactly like the
//! teacher's guard, and the outermost `Drop` is where a preemption that
//! fired *during* the section gets served, rather than being lost.
//!
//! `NESTING` is `thread_local!`, but every user thread in this runtime
//! shares the single real OS thread it lives on, so it is really one
//! process-wide counter that different logical threads take turns
//! owning. A `CriticalSection` guard can legitimately stay alive across
//! a `Context::switch` (a blocking primitive holds one from "add myself
//! to a wait queue" through to `scheduler::block_current`'s state
//! transition, so the two can never be torn apart by a tick landing in
//! between) — but a guard's `Drop` only ever runs on the stack that
//! created it, which may not resume for a long time. Left alone, that
//! would leak the outgoing thread's masked state onto whichever thread
//! runs next. `scheduler::reschedule` closes that gap itself: it captures
//! the nesting depth into a local, `depth_before`, before switching away.
//! Because that local lives on the outgoing thread's own stack — which a
//! stackful context switch parks rather than unwinds — it is still there,
//! unchanged, the instant this exact call resumes, however much later and
//! however many other threads ran in between. [`restore_nesting`] then
//! reapplies it, mirroring how a saved interrupt-enable flag travels with
//! a CPU's own register context on real hardware rather than living in a
//! single global; no per-TCB bookkeeping is needed to carry it.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

thread_local! {
    static NESTING: Cell<u32> = const { Cell::new(0) };
}

/// Set by the `SIGALRM` handler when it fires while nested inside a
/// critical section; drained by the outermost `CriticalSection::drop`.
static PENDING_TICK: AtomicBool = AtomicBool::new(false);
static LAST_TICK_NS: AtomicI64 = AtomicI64::new(0);
static PREEMPTION_ENABLED: AtomicBool = AtomicBool::new(false);
static TIMER_INTERVAL_NS: AtomicU64 = AtomicU64::new(0);
/// Scheduler control toggle (spec §6 "enable/disable preemption", §4.3
/// "preemption-enabled flag"), independent of whether the timer itself is
/// armed: the timer can keep ticking for accounting while this flag tells
/// `scheduler::tick` not to act on `should_preempt`.
static PREEMPTION_TICK_ENABLED: AtomicBool = AtomicBool::new(true);

/// RAII guard masking the preemption timer for its lifetime. Nestable:
/// only the outermost `enter`/drop pair actually touches the signal mask,
/// matching spec §4.7's "nested, and masking is reference counted".
pub(crate) struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    pub fn enter() -> CriticalSection {
        NESTING.with(|n| {
            let depth = n.get();
            if depth == 0 {
                mask_alarm();
            }
            n.set(depth + 1);
        });
        CriticalSection { _private: () }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        NESTING.with(|n| {
            let depth = n.get() - 1;
            n.set(depth);
            if depth == 0 {
                unmask_alarm();
                if PENDING_TICK.swap(false, Ordering::AcqRel) {
                    let now = now_ns_i64();
                    let last = LAST_TICK_NS.swap(now, Ordering::AcqRel);
                    let elapsed = (now - last).max(0) as u64;
                    if crate::scheduler::is_initialized() {
                        crate::scheduler::tick(elapsed);
                    }
                }
            }
        });
    }
}

fn now_ns_i64() -> i64 {
    crate::clock::now_ns() as i64
}

/// This thread's own nesting depth, read without touching it. Used by
/// `scheduler::reschedule` to capture what to save into the outgoing
/// thread's TCB before switching away.
pub(crate) fn nesting_depth() -> u32 {
    NESTING.with(Cell::get)
}

/// Unconditionally mask `SIGALRM` for the duration of the raw register
/// swap in `Context::switch`, independent of `NESTING`. Idempotent: a
/// nested `CriticalSection` may already have masked the signal, in which
/// case this is a no-op at the `sigprocmask` level.
pub(crate) fn mask_for_switch() {
    mask_alarm();
}

/// Reapply `depth` as this thread's nesting count, the instant after it
/// resumes from a `Context::switch` (whether that's a freshly-switched-in
/// thread restoring the depth it was created with, or a thread resuming
/// exactly where its own earlier `reschedule` call left off). Unmasks and
/// serves a pending tick when `depth` is `0`, exactly like the outermost
/// `CriticalSection::drop`.
pub(crate) fn restore_nesting(depth: u32) {
    NESTING.with(|n| n.set(depth));
    if depth > 0 {
        mask_alarm();
    } else {
        unmask_alarm();
        if PENDING_TICK.swap(false, Ordering::AcqRel) {
            let now = now_ns_i64();
            let last = LAST_TICK_NS.swap(now, Ordering::AcqRel);
            let elapsed = (now - last).max(0) as u64;
            if crate::scheduler::is_initialized() {
                crate::scheduler::tick(elapsed);
            }
        }
    }
}

fn mask_alarm() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGALRM);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

fn unmask_alarm() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGALRM);
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
}

extern "C" fn on_alarm(_signum: libc::c_int) {
    if NESTING.with(Cell::get) > 0 {
        PENDING_TICK.store(true, Ordering::Release);
        return;
    }
    let now = now_ns_i64();
    let last = LAST_TICK_NS.swap(now, Ordering::AcqRel);
    let elapsed = (now - last).max(0) as u64;
    if crate::scheduler::is_initialized() {
        crate::scheduler::tick(elapsed);
    }
}

/// Install the `SIGALRM` handler and arm a repeating `setitimer` at
/// `interval_ns` (spec §4.7 "Timer source"). No-op under the
/// `cooperative-only` feature, where preemption never runs at all.
pub(crate) fn arm(interval_ns: u64) {
    if cfg!(feature = "cooperative-only") {
        return;
    }
    TIMER_INTERVAL_NS.store(interval_ns, Ordering::Release);
    LAST_TICK_NS.store(now_ns_i64(), Ordering::Release);
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_alarm as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        libc::sigaction(libc::SIGALRM, &action, std::ptr::null_mut());

        let secs = (interval_ns / 1_000_000_000) as libc::time_t;
        let micros = ((interval_ns % 1_000_000_000) / 1_000) as libc::suseconds_t;
        let interval = libc::itimerval {
            it_interval: libc::timeval {
                tv_sec: secs,
                tv_usec: micros,
            },
            it_value: libc::timeval {
                tv_sec: secs,
                tv_usec: micros,
            },
        };
        libc::setitimer(libc::ITIMER_REAL, &interval, std::ptr::null_mut());
    }
    PREEMPTION_ENABLED.store(true, Ordering::Release);
    log::debug!("preemption timer armed at {interval_ns} ns");
}

/// Disarm the timer and restore the default `SIGALRM` disposition. Called
/// by `Runtime::shutdown`.
pub(crate) fn disarm() {
    if !PREEMPTION_ENABLED.swap(false, Ordering::AcqRel) {
        return;
    }
    unsafe {
        let zero = libc::itimerval {
            it_interval: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            it_value: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        libc::setitimer(libc::ITIMER_REAL, &zero, std::ptr::null_mut());
        libc::signal(libc::SIGALRM, libc::SIG_DFL);
    }
    log::debug!("preemption timer disarmed");
}

pub(crate) fn is_armed() -> bool {
    PREEMPTION_ENABLED.load(Ordering::Acquire)
}

/// Runtime-toggleable control consulted by `scheduler::tick` (spec §6
/// "Scheduler control"). Distinct from [`arm`]/[`disarm`]: those start and
/// stop the timer itself at init/shutdown, this only governs whether a
/// tick that would otherwise preempt is allowed to.
pub(crate) fn set_preemption_enabled(enabled: bool) {
    PREEMPTION_TICK_ENABLED.store(enabled, Ordering::Release);
}

pub(crate) fn preemption_enabled() -> bool {
    PREEMPTION_TICK_ENABLED.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_only_masks_once() {
        assert_eq!(NESTING.with(Cell::get), 0);
        let outer = CriticalSection::enter();
        assert_eq!(NESTING.with(Cell::get), 1);
        let inner = CriticalSection::enter();
        assert_eq!(NESTING.with(Cell::get), 2);
        drop(inner);
        assert_eq!(NESTING.with(Cell::get), 1);
        drop(outer);
        assert_eq!(NESTING.with(Cell::get), 0);
    }
}
