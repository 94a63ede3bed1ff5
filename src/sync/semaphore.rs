//! Counting semaphore (spec §4.11): a count plus one wait queue, the
//! simplest of the four primitives and the one the others' blocking loop
//! shape was modeled after.

use crate::clock::now_ns;
use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::scheduler;
use crate::wait_queue::{self, WaitQueue};
use std::cell::UnsafeCell;

struct Inner {
    count: u32,
    waiters: WaitQueue,
}

pub struct Semaphore {
    inner: UnsafeCell<Inner>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub fn new(initial: u32) -> Semaphore {
        Semaphore {
            inner: UnsafeCell::new(Inner {
                count: initial,
                waiters: WaitQueue::new(),
            }),
        }
    }

    fn inner(&self) -> &mut Inner {
        // SAFETY: only touched with `CriticalSection` held.
        unsafe { &mut *self.inner.get() }
    }

    /// `uthread_sem_wait`: decrement, blocking while the count is zero.
    pub fn wait(&self) -> Result<()> {
        let current = scheduler::current_id();
        loop {
            let cs = CriticalSection::enter();
            let inner = self.inner();
            if inner.count > 0 {
                inner.count -= 1;
                return Ok(());
            }
            inner.waiters.add(current);
            // Held across `block_current` so a tick can never observe this
            // thread on the wait queue before it is actually `Blocked`.
            scheduler::block_current();
            drop(cs);
        }
    }

    /// `uthread_sem_trywait`: [`Error::TryAgain`] instead of blocking.
    pub fn try_wait(&self) -> Result<()> {
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        if inner.count > 0 {
            inner.count -= 1;
            Ok(())
        } else {
            Err(Error::TryAgain("semaphore count is zero"))
        }
    }

    /// `uthread_sem_timedwait`: like [`Self::wait`] but gives up with
    /// [`Error::TimedOut`] once `now_ns()` passes `deadline_ns`. The
    /// caller is responsible for removing itself from the wait queue on
    /// timeout without disturbing anyone else's FIFO position (spec §9
    /// "timed-wait race"); a concurrent `post` that reaches this waiter
    /// just before the removal still counts as a successful wait, the
    /// simpler of the two race resolutions spec §9 allows.
    pub fn timed_wait(&self, deadline_ns: u64) -> Result<()> {
        let current = scheduler::current_id();
        loop {
            let cs = CriticalSection::enter();
            let inner = self.inner();
            if inner.count > 0 {
                inner.count -= 1;
                return Ok(());
            }
            if now_ns() >= deadline_ns {
                inner.waiters.remove_specific(current);
                return Err(Error::TimedOut("semaphore wait exceeded its deadline"));
            }
            if !inner.waiters.contains(current) {
                inner.waiters.add(current);
            }
            drop(cs);
            scheduler::yield_now();
        }
    }

    /// `uthread_sem_post`: increment and wake one waiter, if any.
    pub fn post(&self) {
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        inner.count += 1;
        wait_queue::wake_one(&mut inner.waiters);
    }

    pub fn value(&self) -> u32 {
        let _cs = CriticalSection::enter();
        self.inner().count
    }

    pub fn destroy(self) -> Result<()> {
        let inner = unsafe { &*self.inner.get() };
        if !inner.waiters.is_empty() {
            return Err(Error::Busy("semaphore has waiters"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trywait_on_zero_fails_without_blocking() {
        let s = Semaphore::new(0);
        assert!(matches!(s.try_wait(), Err(Error::TryAgain(_))));
    }

    #[test]
    fn post_then_trywait_succeeds() {
        let s = Semaphore::new(0);
        s.post();
        assert!(s.try_wait().is_ok());
        assert_eq!(s.value(), 0);
    }

    #[test]
    fn initial_value_is_visible() {
        let s = Semaphore::new(3);
        assert_eq!(s.value(), 3);
    }
}
