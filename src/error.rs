//! Error taxonomy for the runtime's external operation surface (spec §7).
//!
//! Every fallible operation returns [`Result`]. Unrecoverable invariant
//! violations (a null "current thread" where one must exist, a failed
//! context switch) are not represented here — they abort the process with
//! a diagnostic, per the propagation policy in spec §7.

use thiserror::Error;

/// One kind per row of spec §7's error taxonomy.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Null handle where prohibited, unknown policy/type/detach-state,
    /// out-of-range stack/priority/nice/timeslice, or an operation on an
    /// uninitialized/destroyed object that cannot be recovered.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Allocation failure of a TCB, stack, or wait queue.
    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),

    /// `trylock`/`trywait` on a held resource, or `destroy` on a held or
    /// non-empty resource.
    #[error("resource busy: {0}")]
    Busy(&'static str),

    /// `join` on self, or an errorcheck mutex self-lock.
    #[error("deadlock would occur: {0}")]
    WouldDeadlock(&'static str),

    /// `unlock` by a non-holder where the type is errorcheck, or an rwlock
    /// `unlock` when the caller holds neither mode.
    #[error("permission denied: {0}")]
    Permission(&'static str),

    /// A `timedwait`/`timedlock` that exceeded its absolute deadline.
    #[error("timed out: {0}")]
    TimedOut(&'static str),

    /// `trywait` on a zero-value semaphore.
    #[error("try again: {0}")]
    TryAgain(&'static str),

    /// A handle does not name a live thread.
    #[error("no such thread: {0}")]
    NoSuchThread(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
