//! The Thread Control Block (spec §3) and its identifier.

use crate::clock::Nanos;
use crate::context::Context;
use crate::stack::Stack;
use std::any::Any;

/// A thread identifier. `0` is reserved for the idle thread (spec §3).
/// Doubles as the slot index into the runtime's fixed-size thread table,
/// per the design note on breaking the joiner/owner cycles via table
/// indices rather than owning references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u32);

impl ThreadId {
    pub const IDLE: ThreadId = ThreadId(0);

    pub(crate) fn new(raw: u32) -> ThreadId {
        ThreadId(raw)
    }

    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// A queued-but-not-yet-run entry point, type-erased the same way
/// `std::thread::Builder::spawn` erases its closure: boxed once at
/// creation, called exactly once from the trampoline.
pub(crate) type BoxedEntry = Box<dyn FnOnce() + Send>;

/// One per user thread; see spec §3 for the field-by-field contract.
pub(crate) struct Tcb {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub context: Context,
    /// `None` only for the bootstrap pseudo-TCB representing the host OS
    /// thread before the runtime starts switching contexts at all; every
    /// TCB that is ever scheduled owns a stack.
    pub stack: Option<Stack>,
    pub priority: u8,
    pub nice: i8,
    pub weight: u32,
    pub vruntime: u64,
    pub start_time: Nanos,
    pub total_runtime: Nanos,
    pub timeslice_remaining: Nanos,
    pub detached: bool,
    pub exited: bool,
    pub joiner: Option<ThreadId>,
    pub waiting_on: Option<ThreadId>,
    pub entry: Option<BoxedEntry>,
    pub retval: Option<Box<dyn Any + Send>>,
}

impl Tcb {
    pub fn new(id: ThreadId, name: String, priority: u8, nice: i8, weight: u32) -> Tcb {
        Tcb {
            id,
            name,
            state: ThreadState::Ready,
            context: Context::uninit(),
            stack: None,
            priority,
            nice,
            weight,
            vruntime: 0,
            start_time: 0,
            total_runtime: 0,
            timeslice_remaining: 0,
            detached: false,
            exited: false,
            joiner: None,
            waiting_on: None,
            entry: None,
            retval: None,
        }
    }

    pub fn is_joinable(&self) -> bool {
        !self.detached
    }
}
