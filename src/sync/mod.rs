//! Blocking synchronization primitives (spec §4.9–§4.12, components 9–12),
//! all built on [`crate::wait_queue::WaitQueue`] the way the teacher's
//! embedded primitives would be built on its own wait list if it had one
//! (martos today only exposes cooperative/preemptive scheduling, not
//! blocking sync — these four are new relative to the teacher and are
//! grounded instead in the wait-queue/critical-section shape already
//! established by `crate::wait_queue` and `crate::preempt`).

pub mod condvar;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexKind};
pub use rwlock::RwLock;
pub use semaphore::Semaphore;
