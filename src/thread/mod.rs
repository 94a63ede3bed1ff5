//! Thread lifecycle operations (spec §4.8, component 8): create, join,
//! detach, exit, yield, sleep. The teacher exposes these as
//! `TaskManagerTrait::add_*_task` free functions rather than an object
//! with methods (`task_manager/mod.rs`); this module keeps that
//! free-function shape for the runtime-facing half
//! (`spawn`/`join`/`sleep`) but wraps creation in a `JoinHandle<T>` the
//! way `std::thread::spawn` does, since a generic return type has no
//! analogue in the teacher's C-style function-pointer entry points.

pub mod attr;
pub(crate) mod tcb;

use crate::clock::now_ns;
use crate::context::{Context, EntryFn};
use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::scheduler;
use crate::stack::Stack;
use attr::ThreadAttr;
use std::any::Any;
use std::marker::PhantomData;

pub use tcb::ThreadId;
pub(crate) use tcb::ThreadState;

/// Spawn a new user thread running `f`, with creation-time attributes
/// `attr`. The thread is placed on the ready structure immediately; it
/// runs the next time the scheduler picks it, per the active policy.
pub fn spawn<F, T>(attr: ThreadAttr, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if !scheduler::is_initialized() {
        return Err(Error::InvalidArgument("runtime not initialized"));
    }
    let stack = Stack::new(attr.stack_size())?;
    let entry: tcb::BoxedEntry = Box::new(move || {
        let result = f();
        exit_current(Box::new(result));
    });
    let mut context = Context::uninit();
    let entry_fn: EntryFn = trampoline;
    context.make(entry_fn, stack.top());

    let id = scheduler::create_thread(&attr, entry, stack, context)?;
    scheduler::enqueue_ready(id);
    log::debug!("spawned thread {id} ({:?})", attr.name());
    Ok(JoinHandle {
        id,
        _marker: PhantomData,
    })
}

/// Every new thread's context resumes here. Takes no arguments: the
/// thread reads its own entry back out of its TCB through the scheduler
/// (spec §4.1 "no trampoline arguments").
extern "C" fn trampoline() -> ! {
    // A freshly created thread never resumes mid-`reschedule`, so nothing
    // else restores its nesting depth for it; a new TCB always starts at
    // depth 0, matching `Tcb::new`.
    crate::preempt::restore_nesting(0);
    let id = scheduler::current_id();
    let entry = scheduler::with_tcb(id, |tcb| tcb.entry.take());
    if let Some(entry) = entry {
        entry();
    }
    exit_current(Box::new(()));
}

fn exit_current(retval: Box<dyn Any + Send>) -> ! {
    let id = scheduler::current_id();
    // Held for the rest of this function, including the final
    // `reschedule` loop: a tick landing between marking `Terminated` and
    // actually switching away would otherwise see this thread as "current"
    // and could re-ready it through the ordinary preemption path.
    let _cs = CriticalSection::enter();
    let joiner = scheduler::with_tcb(id, |tcb| {
        tcb.exited = true;
        tcb.state = ThreadState::Terminated;
        tcb.retval = Some(retval);
        tcb.joiner
    });
    log::debug!("thread {id} exited");
    if let Some(joiner) = joiner {
        scheduler::unblock(joiner);
    }
    // A detached-and-exited slot with no joiner is reclaimed lazily by
    // `create_thread`'s probe rather than here: freeing it would drop
    // this thread's own `Stack` while still running on it. This stack
    // never runs again, so `_cs` is never actually dropped; the depth it
    // holds is still captured correctly by `reschedule`'s own save step
    // on the way out.
    loop {
        scheduler::reschedule();
    }
}

/// `uthread_exit`: terminate the calling thread, making `retval`
/// available to a subsequent `join`. Never returns.
pub fn exit<T: Send + 'static>(retval: T) -> ! {
    exit_current(Box::new(retval))
}

/// `uthread_yield`: give up the remainder of the current timeslice
/// voluntarily (spec §4.3, §6).
pub fn yield_now() {
    scheduler::yield_now();
}

/// `uthread_self`: the calling thread's id.
pub fn current() -> ThreadId {
    scheduler::current_id()
}

/// Cooperative sleep: re-yield until `duration_ns` has elapsed (spec §9
/// Open Question "busy-yield vs. sleep queue" — resolved in favor of the
/// simpler busy-yield: see `DESIGN.md`). `duration_ns == 0` still yields
/// once, matching `uthread_yield`'s guarantee that the calling thread
/// gives up the CPU at least once.
pub fn sleep_ns(duration_ns: u64) {
    let deadline = now_ns().saturating_add(duration_ns);
    loop {
        scheduler::yield_now();
        if now_ns() >= deadline {
            break;
        }
    }
}

fn join_internal(id: ThreadId) -> Result<Box<dyn Any + Send>> {
    if id == scheduler::current_id() {
        return Err(Error::WouldDeadlock("a thread cannot join itself"));
    }
    let me = scheduler::current_id();
    loop {
        let cs = CriticalSection::enter();
        let state = scheduler::try_with_tcb(id, |tcb| {
            if tcb.detached {
                return JoinPoll::Detached;
            }
            if tcb.exited {
                return JoinPoll::Exited;
            }
            tcb.joiner = Some(me);
            JoinPoll::Pending
        });
        match state {
            None => return Err(Error::NoSuchThread("target thread no longer exists")),
            Some(JoinPoll::Detached) => {
                return Err(Error::InvalidArgument("cannot join a detached thread"))
            }
            Some(JoinPoll::Exited) => {
                drop(cs);
                let retval = scheduler::with_tcb(id, |tcb| tcb.retval.take());
                scheduler::reap(id);
                return Ok(retval.unwrap_or_else(|| Box::new(())));
            }
            // `cs` stays held across `block_current`: recording ourselves
            // as the joiner and actually blocking land as one step, so
            // `exit_current`'s `unblock(joiner)` can never run against a
            // joiner that registered but hasn't blocked yet. `waiting_on`
            // is set in the same window, on our own TCB rather than the
            // target's, matching spec §3's "blocked with waiting_on = this
            // TCB" pairing with `target.joiner = self`.
            Some(JoinPoll::Pending) => {
                scheduler::with_tcb(me, |tcb| tcb.waiting_on = Some(id));
                scheduler::block_current();
                scheduler::with_tcb(me, |tcb| tcb.waiting_on = None);
                drop(cs);
            }
        }
    }
}

enum JoinPoll {
    Exited,
    Detached,
    Pending,
}

/// A handle to a spawned thread, carrying its return type the way
/// `std::thread::JoinHandle<T>` does (spec §6 `uthread_join` erases this
/// at the C boundary; this crate keeps it statically typed instead).
pub struct JoinHandle<T> {
    id: ThreadId,
    _marker: PhantomData<T>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// `uthread_join`: block until the target exits, then take its return
    /// value. Errors if the target is detached, already joined by
    /// someone else and reaped, or is the caller itself.
    pub fn join(self) -> Result<T> {
        let boxed = join_internal(self.id)?;
        Ok(*boxed
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("join retval type mismatch for {}", self.id)))
    }

    /// `uthread_detach`: the thread's resources are reclaimed
    /// automatically on exit instead of via `join`. Errors if the thread
    /// has already been detached or already has a joiner attached (spec
    /// §4.8).
    pub fn detach(self) -> Result<()> {
        let outcome = scheduler::try_with_tcb(self.id, |tcb| {
            if tcb.detached {
                return Err(Error::InvalidArgument("thread is already detached"));
            }
            if tcb.joiner.is_some() {
                return Err(Error::InvalidArgument("thread already has a joiner attached"));
            }
            tcb.detached = true;
            Ok(tcb.exited)
        })
        .ok_or(Error::NoSuchThread("target thread no longer exists"))?;
        if outcome? {
            scheduler::reap(self.id);
        }
        Ok(())
    }
}
