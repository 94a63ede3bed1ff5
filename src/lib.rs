//! `uthread`: a userspace M:1 cooperative-and-preemptive threading
//! runtime. Many user threads are multiplexed onto a single OS thread
//! through user-space context switching ([`context`]) and, unless the
//! `cooperative-only` feature is enabled, a signal-driven preemption
//! timer ([`preempt`]).
//!
//! Start a runtime with [`Runtime::init`], spawn threads with
//! [`thread::spawn`], and synchronize them with the primitives in
//! [`sync`].

pub mod clock;
mod context;
mod preempt;
mod scheduler;
mod stack;
mod stats;
pub mod sync;
pub mod thread;
mod wait_queue;

mod error;
mod runtime;

pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeConfig};
pub use scheduler::SchedPolicyKind;
pub use stats::Snapshot;
pub use thread::ThreadId;
