//! Backpressure between the download and upload pools.

use core_async::sync::{CancellationToken, OwnedSemaphorePermit, Semaphore};
use std::sync::Arc;

/// Caps downloaded-but-not-uploaded units at `max_concurrency * upload_multiple`.
///
/// A unit holds an [`InFlight`] permit from the moment the gate admits it
/// until its upload stage ends.
#[derive(Debug, Clone)]
pub struct UploadGate {
    permits: Arc<Semaphore>,
    cap: usize,
}

/// Proof of admission; dropping it frees the slot.
#[derive(Debug)]
pub struct InFlight {
    _permit: OwnedSemaphorePermit,
}

impl UploadGate {
    pub fn new(cap: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(cap)),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Units currently admitted.
    pub fn in_flight(&self) -> usize {
        self.cap - self.permits.available_permits()
    }

    /// Wait for a free slot. Returns `None` if `cancel` fires first.
    pub async fn admit(&self, cancel: &CancellationToken) -> Option<InFlight> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => {
                permit.ok().map(|permit| InFlight { _permit: permit })
            }
        }
    }
}
