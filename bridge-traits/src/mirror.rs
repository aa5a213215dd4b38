//! Mirror Downloader Abstraction

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A source of packaged beatmapset archives.
///
/// Implementations hold no per-call state and may be shared by many worker
/// tasks at once.
///
/// # Errors
///
/// - [`BridgeError::NotAvailable`](crate::BridgeError::NotAvailable) when the
///   mirror reports the set as missing. Retrying the same mirror will not help.
/// - [`BridgeError::RateLimited`](crate::BridgeError::RateLimited) once the
///   mirror's own rate-limit retries are exhausted.
/// - [`BridgeError::Cancelled`](crate::BridgeError::Cancelled) if the run was
///   cancelled while waiting.
#[async_trait]
pub trait MirrorDownloader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Download the full archive for a beatmapset.
    async fn download_set(&self, set_id: i64) -> Result<Bytes>;
}
