//! Synchronization engines
//!
//! Contains the wait queue, the priority inheritance graph, and the mutex
//! and condition variable engines built on them.

pub mod wait_queue;
pub(crate) mod inherit;
pub mod mutex;
pub mod cond;

pub use wait_queue::WaitQueue;
