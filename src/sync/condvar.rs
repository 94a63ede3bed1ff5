//! Condition variable (spec §4.10): waiters release their mutex, block on
//! a wait queue, and are required to re-check their predicate after
//! waking because wakeups may be spurious (spec §5 "spurious wakeup
//! model" — a waiter can observe `notify_one` meant for someone else if
//! its mutex re-acquisition races another waiter's).

use crate::clock::now_ns;
use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::scheduler;
use crate::sync::mutex::Mutex;
use crate::wait_queue::{self, WaitQueue};
use std::cell::{Cell, UnsafeCell};

pub struct Condvar {
    waiters: UnsafeCell<WaitQueue>,
    /// Bumped on every `notify_one`/`notify_all`, even with zero waiters
    /// (spec §4.10 "signal sequence counter (observational)"; §8 "cond_signal
    /// with zero waiters is a no-op on queue state, sequence counter still
    /// advances").
    seq: Cell<u64>,
}

unsafe impl Sync for Condvar {}
unsafe impl Send for Condvar {}

impl Condvar {
    pub fn new() -> Condvar {
        Condvar {
            waiters: UnsafeCell::new(WaitQueue::new()),
            seq: Cell::new(0),
        }
    }

    fn waiters(&self) -> &mut WaitQueue {
        // SAFETY: only touched with `CriticalSection` held.
        unsafe { &mut *self.waiters.get() }
    }

    /// `uthread_cond_wait`: atomically (with respect to other
    /// scheduler-visible state) release `mutex` and block, then
    /// re-acquire `mutex` before returning. Callers must re-check their
    /// predicate in a loop (spec §5).
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        let current = scheduler::current_id();
        let cs = CriticalSection::enter();
        self.waiters().add(current);
        // `cs` stays held across `unlock` (itself nested, harmless) and
        // `block_current`, so nothing can observe this thread registered
        // as a waiter without also being on its way to `Blocked` — the
        // ordering `wait_queue::add`'s contract requires.
        let unlock_result = mutex.unlock();
        if unlock_result.is_err() {
            self.waiters().remove_specific(current);
            drop(cs);
            return unlock_result;
        }
        scheduler::block_current();
        drop(cs);
        mutex.lock()
    }

    /// `uthread_cond_timedwait` (spec §4.10): like [`Condvar::wait`], but
    /// gives up and returns a timeout once `deadline_ns` passes. Follows
    /// the same busy-yield polling idiom as
    /// `Semaphore::timed_wait`: re-check the deadline each time this
    /// thread is resumed, removing itself from the wait queue rather than
    /// trusting a wakeup actually arrives.
    pub fn timed_wait(&self, mutex: &Mutex, deadline_ns: u64) -> Result<()> {
        let current = scheduler::current_id();
        let cs = CriticalSection::enter();
        self.waiters().add(current);
        let unlock_result = mutex.unlock();
        if unlock_result.is_err() {
            self.waiters().remove_specific(current);
            drop(cs);
            return unlock_result;
        }
        loop {
            scheduler::block_current();
            if now_ns() >= deadline_ns {
                self.waiters().remove_specific(current);
                drop(cs);
                mutex.lock()?;
                return Err(Error::TimedOut("condvar wait exceeded its deadline"));
            }
            if !self.waiters().contains(current) {
                break;
            }
        }
        drop(cs);
        mutex.lock()
    }

    /// `uthread_cond_signal`: wake at most one waiter.
    pub fn notify_one(&self) {
        let _cs = CriticalSection::enter();
        self.seq.set(self.seq.get().wrapping_add(1));
        wait_queue::wake_one(self.waiters());
    }

    /// `uthread_cond_broadcast`: wake every current waiter.
    pub fn notify_all(&self) {
        let _cs = CriticalSection::enter();
        self.seq.set(self.seq.get().wrapping_add(1));
        wait_queue::wake_all(self.waiters());
    }

    pub fn waiter_count(&self) -> usize {
        let _cs = CriticalSection::enter();
        self.waiters().len()
    }

    /// Observational signal sequence counter (spec §4.10 State): counts
    /// calls to `notify_one`/`notify_all`, independent of whether either
    /// had any waiter to wake.
    pub fn sequence(&self) -> u64 {
        self.seq.get()
    }

    /// `uthread_cond_destroy`: fails if any thread is still waiting.
    pub fn destroy(self) -> Result<()> {
        let _cs = CriticalSection::enter();
        if self.waiters().len() != 0 {
            return Err(Error::Busy("condvar has waiters"));
        }
        Ok(())
    }
}

impl Default for Condvar {
    fn default() -> Condvar {
        Condvar::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_condvar_has_no_waiters() {
        let cv = Condvar::new();
        assert_eq!(cv.waiter_count(), 0);
    }
}
