//! Task spawning and execution.
//!
//! CPU-bound work such as archive filtering must go through
//! [`spawn_blocking`] so it never stalls the async worker threads.

pub use tokio::task::{spawn, spawn_blocking, yield_now, Id, JoinError, JoinHandle, JoinSet};
