//! Async runtime facade for the beatmap archive core.
//!
//! All core-* and provider-* crates depend on this crate instead of naming
//! tokio directly, so the runtime surface the pipeline relies on stays in one
//! place.
//!
//! # Modules
//!
//! - `task`: Task spawning, blocking offload and join sets
//! - `time`: Sleep, timeouts and cancellable waits
//! - `sync`: Locks, semaphores, channels and cancellation tokens
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep_or_cancel, Duration};
//!
//! async fn example(cancel: CancellationToken) {
//!     if !sleep_or_cancel(Duration::from_secs(60), &cancel).await {
//!         // cancelled while waiting
//!     }
//! }
//! ```

pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
