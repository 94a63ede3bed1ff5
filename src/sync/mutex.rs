//! Mutex (spec §4.9): normal, recursive, and errorcheck modes over one
//! [`WaitQueue`]. All three modes share the same acquire/release path;
//! only the self-lock behavior in [`Mutex::lock`] differs per mode,
//! matching spec §4.9's "one state machine, mode changes one branch".

use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::scheduler;
use crate::thread::ThreadId;
use crate::wait_queue::WaitQueue;
use std::cell::UnsafeCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    Normal,
    Recursive,
    ErrorCheck,
}

struct Inner {
    kind: MutexKind,
    owner: Option<ThreadId>,
    recursion: u32,
    waiters: WaitQueue,
}

/// A mutual-exclusion lock with no data payload, mirroring spec §6's
/// `uthread_mutex_t` (callers guard their own data; this type only
/// guards the critical section around it).
pub struct Mutex {
    inner: UnsafeCell<Inner>,
}

// All mutation happens behind `CriticalSection`, which on this
// single-OS-thread runtime is equivalent to a lock.
unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub fn new(kind: MutexKind) -> Mutex {
        Mutex {
            inner: UnsafeCell::new(Inner {
                kind,
                owner: None,
                recursion: 0,
                waiters: WaitQueue::new(),
            }),
        }
    }

    fn inner(&self) -> &mut Inner {
        // SAFETY: only ever called with a `CriticalSection` held.
        unsafe { &mut *self.inner.get() }
    }

    /// `uthread_mutex_lock`. Blocks until the caller owns the mutex.
    pub fn lock(&self) -> Result<()> {
        let current = scheduler::current_id();
        loop {
            let cs = CriticalSection::enter();
            let inner = self.inner();
            match inner.owner {
                None => {
                    inner.owner = Some(current);
                    inner.recursion = 1;
                    return Ok(());
                }
                Some(owner) if owner == current => {
                    return match inner.kind {
                        MutexKind::Recursive => {
                            inner.recursion += 1;
                            Ok(())
                        }
                        MutexKind::ErrorCheck => {
                            Err(Error::WouldDeadlock("errorcheck mutex self-lock"))
                        }
                        MutexKind::Normal => Err(Error::WouldDeadlock(
                            "normal mutex self-lock deadlocks by definition",
                        )),
                    };
                }
                Some(_) => {
                    inner.waiters.add(current);
                    // `cs` stays held across `block_current` so the queue
                    // membership and the `Blocked` transition it performs
                    // land as one atomic step from a tick's point of view;
                    // see `preempt`'s module docs for why that is safe to
                    // span the context switch inside it.
                    scheduler::block_current();
                    drop(cs);
                    // Woken by `unlock`; loop back and race for ownership.
                }
            }
        }
    }

    /// `uthread_mutex_trylock`: acquire without blocking or error out
    /// with [`Error::Busy`].
    pub fn try_lock(&self) -> Result<()> {
        let current = scheduler::current_id();
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        match inner.owner {
            None => {
                inner.owner = Some(current);
                inner.recursion = 1;
                Ok(())
            }
            Some(owner) if owner == current && inner.kind == MutexKind::Recursive => {
                inner.recursion += 1;
                Ok(())
            }
            _ => Err(Error::Busy("mutex already held")),
        }
    }

    /// `uthread_mutex_unlock`. Errors with [`Error::Permission`] if the
    /// caller does not hold the mutex.
    pub fn unlock(&self) -> Result<()> {
        let current = scheduler::current_id();
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        if inner.owner != Some(current) {
            return Err(Error::Permission("unlock by a thread that does not hold the mutex"));
        }
        if inner.kind == MutexKind::Recursive && inner.recursion > 1 {
            inner.recursion -= 1;
            return Ok(());
        }
        inner.owner = None;
        inner.recursion = 0;
        crate::wait_queue::wake_one(&mut inner.waiters);
        Ok(())
    }

    /// `uthread_mutex_destroy`: errors with [`Error::Busy`] if still held
    /// or has waiters, per spec §8 "destroy while held" boundary case.
    pub fn destroy(self) -> Result<()> {
        let inner = unsafe { &*self.inner.get() };
        if inner.owner.is_some() || !inner.waiters.is_empty() {
            return Err(Error::Busy("mutex is held or has waiters"));
        }
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        let _cs = CriticalSection::enter();
        self.inner().owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mutex_is_unlocked() {
        let m = Mutex::new(MutexKind::Normal);
        assert!(!m.is_locked());
    }

    #[test]
    fn recursive_mode_tracks_depth() {
        let inner = Inner {
            kind: MutexKind::Recursive,
            owner: Some(ThreadId::new(1)),
            recursion: 1,
            waiters: WaitQueue::new(),
        };
        assert_eq!(inner.recursion, 1);
    }

    #[test]
    fn destroy_fails_while_held() {
        let m = Mutex::new(MutexKind::Normal);
        m.inner().owner = Some(ThreadId::new(1));
        assert!(matches!(m.destroy(), Err(Error::Busy(_))));
    }

    #[test]
    fn destroy_succeeds_when_free() {
        let m = Mutex::new(MutexKind::Normal);
        assert!(m.destroy().is_ok());
    }
}
