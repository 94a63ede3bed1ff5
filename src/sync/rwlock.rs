//! Reader-writer lock (spec §4.12), writer-preferring: once a writer is
//! waiting, new readers queue behind it rather than continuing to pile
//! in ahead of a writer that might otherwise starve (spec §4.12
//! "Fairness policy").

use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::scheduler;
use crate::thread::ThreadId;
use crate::wait_queue::{self, WaitQueue};
use std::cell::UnsafeCell;

struct Inner {
    readers: u32,
    writer: Option<ThreadId>,
    write_waiters: WaitQueue,
    read_waiters: WaitQueue,
}

pub struct RwLock {
    inner: UnsafeCell<Inner>,
}

unsafe impl Sync for RwLock {}
unsafe impl Send for RwLock {}

impl RwLock {
    pub fn new() -> RwLock {
        RwLock {
            inner: UnsafeCell::new(Inner {
                readers: 0,
                writer: None,
                write_waiters: WaitQueue::new(),
                read_waiters: WaitQueue::new(),
            }),
        }
    }

    fn inner(&self) -> &mut Inner {
        // SAFETY: only touched with `CriticalSection` held.
        unsafe { &mut *self.inner.get() }
    }

    /// `uthread_rwlock_rdlock`. Queues behind any already-waiting writer
    /// instead of joining the active reader set immediately.
    pub fn read_lock(&self) -> Result<()> {
        let current = scheduler::current_id();
        loop {
            let cs = CriticalSection::enter();
            let inner = self.inner();
            if inner.writer.is_none() && inner.write_waiters.is_empty() {
                inner.readers += 1;
                return Ok(());
            }
            inner.read_waiters.add(current);
            // Held across `block_current`; see `sync::mutex::lock`.
            scheduler::block_current();
            drop(cs);
        }
    }

    /// `uthread_rwlock_wrlock`.
    pub fn write_lock(&self) -> Result<()> {
        let current = scheduler::current_id();
        loop {
            let cs = CriticalSection::enter();
            let inner = self.inner();
            if inner.writer.is_none() && inner.readers == 0 {
                inner.writer = Some(current);
                return Ok(());
            }
            inner.write_waiters.add(current);
            // Held across `block_current`; see `sync::mutex::lock`.
            scheduler::block_current();
            drop(cs);
        }
    }

    pub fn try_read_lock(&self) -> Result<()> {
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        if inner.writer.is_none() && inner.write_waiters.is_empty() {
            inner.readers += 1;
            Ok(())
        } else {
            Err(Error::Busy("rwlock is write-locked or has a waiting writer"))
        }
    }

    pub fn try_write_lock(&self) -> Result<()> {
        let current = scheduler::current_id();
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        if inner.writer.is_none() && inner.readers == 0 {
            inner.writer = Some(current);
            Ok(())
        } else {
            Err(Error::Busy("rwlock is already held"))
        }
    }

    /// `uthread_rwlock_unlock`: works for either mode, detected from the
    /// caller's identity and the current reader count. On a writer's
    /// unlock, a single waiting writer is preferred over draining all
    /// waiting readers (spec §4.12).
    pub fn unlock(&self) -> Result<()> {
        let current = scheduler::current_id();
        let _cs = CriticalSection::enter();
        let inner = self.inner();
        if inner.writer == Some(current) {
            inner.writer = None;
            if let Some(next_writer) = inner.write_waiters.remove_head() {
                scheduler::unblock(next_writer);
            } else {
                wait_queue::wake_all(&mut inner.read_waiters);
            }
            Ok(())
        } else if inner.readers > 0 {
            inner.readers -= 1;
            if inner.readers == 0 {
                if let Some(next_writer) = inner.write_waiters.remove_head() {
                    scheduler::unblock(next_writer);
                }
            }
            Ok(())
        } else {
            Err(Error::Permission("unlock by a thread holding neither mode"))
        }
    }

    pub fn destroy(self) -> Result<()> {
        let inner = unsafe { &*self.inner.get() };
        if inner.writer.is_some()
            || inner.readers > 0
            || !inner.write_waiters.is_empty()
            || !inner.read_waiters.is_empty()
        {
            return Err(Error::Busy("rwlock is held or has waiters"));
        }
        Ok(())
    }
}

impl Default for RwLock {
    fn default() -> RwLock {
        RwLock::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rwlock_is_free() {
        let lock = RwLock::new();
        assert!(lock.destroy().is_ok());
    }

    #[test]
    fn held_writer_blocks_destroy() {
        let lock = RwLock::new();
        lock.inner().writer = Some(ThreadId::new(1));
        assert!(matches!(lock.destroy(), Err(Error::Busy(_))));
    }

    #[test]
    fn active_readers_block_destroy() {
        let lock = RwLock::new();
        lock.inner().readers = 2;
        assert!(matches!(lock.destroy(), Err(Error::Busy(_))));
    }
}
