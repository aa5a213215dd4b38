//! Time-related operations.
//!
//! `Instant` is tokio's, so tests running with a paused clock observe
//! simulated time consistently with `sleep`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(10));
//! }
//! ```

use tokio_util::sync::CancellationToken;

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Instant, Interval, Sleep, Timeout};

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` when the full duration elapsed and `false` when the wait
/// was cut short by cancellation. An already-cancelled token returns
/// immediately.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
