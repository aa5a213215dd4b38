//! # Sync Orchestrator
//!
//! Runs one pass of the archive pipeline over a batch of work units.
//!
//! ## Overview
//!
//! `SyncOrchestrator::sync_batch` takes the mirror downloaders and the units
//! to sync and returns a [`PassReport`] whose `retry` batch feeds the next
//! pass. Every unit runs in its own task on a `JoinSet`, so a failure or a
//! panic in one set never touches its siblings.
//!
//! ## Workflow
//!
//! 1. Skip units the catalog flags as undownloadable
//! 2. Wait for a download slot, then spawn the unit's task
//! 3. Download from the next mirror in round-robin order
//! 4. Wait for the [`UploadGate`] to admit the downloaded bytes
//! 5. Take an upload slot and render each required variant
//! 6. Upload the variant unless the remote copy already matches
//! 7. Create a share link and record it on the set
//! 8. After every task drains, merge synced sets into the ledger once
//!
//! ## Cancellation
//!
//! The token is checked before scheduling each download, inside the gate
//! wait and before variant processing. Once it fires no new download is
//! scheduled; tasks already running finish or fail, and unscheduled units
//! go straight to the retry batch.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(config, remote, ledger, event_bus, cancel);
//! let mut units = plan;
//! loop {
//!     let report = orchestrator.sync_batch(&downloaders, units).await?;
//!     if report.retry.is_empty() || report.cancelled {
//!         break;
//!     }
//!     units = report.retry.into_units();
//! }
//! ```

use bridge_traits::{BridgeError, MirrorDownloader, RemoteStore};
use bytes::Bytes;
use core_archive::{filter, ArchiveError};
use core_async::sync::{CancellationToken, OwnedSemaphorePermit, RwLock, Semaphore};
use core_async::task::{spawn_blocking, Id, JoinSet};
use core_library::{BeatmapsetEntry, MetadataLedger};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::gate::UploadGate;
use crate::unit::{FailureKind, PassReport, RetryBatch, UnitState, WorkUnit};
use crate::variants::Variant;
use crate::{Result, SyncError};

/// Everything a unit task needs, shared across the pass.
struct PassContext {
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    gate: UploadGate,
    upload_slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

enum UnitResult {
    Synced { unit: WorkUnit, variants: Vec<String> },
    Failed { unit: WorkUnit, error: SyncError },
}

/// Scheduler for download, filter and upload of beatmapsets.
pub struct SyncOrchestrator {
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    ledger: Arc<RwLock<MetadataLedger>>,
    event_bus: EventBus,
    cancel: CancellationToken,
    gate: UploadGate,
    passes: AtomicU32,
    next_mirror: AtomicUsize,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        ledger: Arc<RwLock<MetadataLedger>>,
        event_bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        let gate = UploadGate::new(config.in_flight_cap());
        Self {
            config,
            remote,
            ledger,
            event_bus,
            cancel,
            gate,
            passes: AtomicU32::new(0),
            next_mirror: AtomicUsize::new(0),
        }
    }

    pub fn ledger(&self) -> Arc<RwLock<MetadataLedger>> {
        Arc::clone(&self.ledger)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The backpressure gate shared by every pass.
    pub fn gate(&self) -> UploadGate {
        self.gate.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass over `units`.
    ///
    /// # Errors
    ///
    /// Only configuration problems are returned as `Err`. Per-unit failures
    /// are reported through [`PassReport::retry`] and
    /// [`PassReport::abandoned`].
    #[instrument(skip(self, downloaders, units), fields(units = units.len()))]
    pub async fn sync_batch(
        &self,
        downloaders: &[Arc<dyn MirrorDownloader>],
        units: Vec<WorkUnit>,
    ) -> Result<PassReport> {
        if downloaders.is_empty() && !units.is_empty() {
            return Err(SyncError::Config(
                "No mirror downloaders configured. Enable at least one mirror.".to_string(),
            ));
        }

        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(SyncEvent::PassStarted {
            pass,
            units: units.len(),
        });
        info!(pass, units = units.len(), "Starting sync pass");

        let ctx = Arc::new(PassContext {
            config: self.config.clone(),
            remote: Arc::clone(&self.remote),
            gate: self.gate.clone(),
            upload_slots: Arc::new(Semaphore::new(self.config.max_concurrency)),
            cancel: self.cancel.clone(),
        });
        let download_slots = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut report = PassReport {
            pass,
            ..PassReport::default()
        };
        let mut retry: BTreeMap<usize, WorkUnit> = BTreeMap::new();
        let mut in_flight: BTreeMap<usize, WorkUnit> = BTreeMap::new();
        let mut task_ids: HashMap<Id, usize> = HashMap::new();
        let mut tasks = JoinSet::new();

        // ====================================================================
        // Scheduling
        // ====================================================================

        for (index, mut unit) in units.into_iter().enumerate() {
            unit.reset();

            if !unit.set.is_downloadable() {
                unit.transition(UnitState::Skipped)?;
                let reason = skip_reason(&unit.set);
                info!(set_id = unit.id(), reason, "Skipping undownloadable beatmapset");
                self.emit(SyncEvent::UnitSkipped {
                    set_id: unit.id(),
                    reason: reason.to_string(),
                });
                report.skipped.push(unit.id());
                continue;
            }

            let permit = if self.cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    permit = Arc::clone(&download_slots).acquire_owned() => permit.ok(),
                }
            };
            let Some(permit) = permit else {
                report.cancelled = true;
                retry.insert(index, unit);
                continue;
            };

            let slot = self.next_mirror.fetch_add(1, Ordering::Relaxed) % downloaders.len();
            let downloader = Arc::clone(&downloaders[slot]);

            in_flight.insert(index, unit.clone());
            let handle = tasks.spawn(run_unit(Arc::clone(&ctx), downloader, unit, permit, index));
            task_ids.insert(handle.id(), index);
        }

        // ====================================================================
        // Draining
        // ====================================================================

        let mut synced_sets: Vec<BeatmapsetEntry> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(join_error) => {
                    let recovered = task_ids
                        .get(&join_error.id())
                        .and_then(|index| in_flight.remove_entry(index));
                    let Some((index, mut unit)) = recovered else {
                        error!(error = %join_error, "Lost track of a failed sync task");
                        continue;
                    };
                    unit.fail();
                    error!(set_id = unit.id(), error = %join_error, "Sync task panicked");
                    let error = SyncError::Internal(format!("sync task failed: {}", join_error));
                    (index, UnitResult::Failed { unit, error })
                }
            };
            in_flight.remove(&index);

            match result {
                UnitResult::Synced { unit, variants } => {
                    debug!(set_id = unit.id(), ?variants, "Beatmapset synced");
                    self.emit(SyncEvent::UnitSynced {
                        set_id: unit.id(),
                        variants,
                    });
                    report.synced.push(unit.id());
                    synced_sets.push(unit.set);
                }
                UnitResult::Failed { unit, error } => {
                    report.failed += 1;
                    if let Some(unit) = self.settle_failure(unit, &error, &mut report) {
                        retry.insert(index, unit);
                    }
                }
            }
        }

        if !synced_sets.is_empty() {
            let mut ledger = self.ledger.write().await;
            for set in synced_sets {
                ledger.merge_set(set);
            }
        }

        report.cancelled |= self.cancel.is_cancelled();
        report.retry = retry.into_values().collect::<RetryBatch>();

        if report.cancelled {
            self.emit(SyncEvent::Cancelled {
                pass,
                remaining: report.retry.len(),
            });
        }
        self.emit(SyncEvent::PassCompleted {
            pass,
            synced: report.synced.len(),
            skipped: report.skipped.len(),
            failed: report.failed,
            abandoned: report.abandoned.len(),
        });
        info!(
            pass,
            synced = report.synced.len(),
            skipped = report.skipped.len(),
            failed = report.failed,
            abandoned = report.abandoned.len(),
            retry = report.retry.len(),
            cancelled = report.cancelled,
            "Sync pass completed"
        );

        Ok(report)
    }

    /// Count a strike if the failure is permanent. Returns the unit when it
    /// should be retried.
    fn settle_failure(
        &self,
        mut unit: WorkUnit,
        error: &SyncError,
        report: &mut PassReport,
    ) -> Option<WorkUnit> {
        let kind = FailureKind::classify(error);
        if kind == FailureKind::Permanent {
            unit.permanent_failures += 1;
            if self.config.is_exhausted(unit.permanent_failures) {
                warn!(
                    set_id = unit.id(),
                    strikes = unit.permanent_failures,
                    error = %error,
                    "Abandoning beatmapset after repeated permanent failures"
                );
                self.emit(SyncEvent::UnitAbandoned {
                    set_id: unit.id(),
                    reason: error.to_string(),
                });
                report.abandoned.push((unit.id(), error.to_string()));
                return None;
            }
        }

        if kind == FailureKind::Cancelled {
            debug!(set_id = unit.id(), "Beatmapset interrupted by cancellation");
        } else {
            warn!(set_id = unit.id(), error = %error, "Beatmapset failed, queued for retry");
        }
        self.emit(SyncEvent::UnitFailed {
            set_id: unit.id(),
            message: error.to_string(),
            permanent: kind == FailureKind::Permanent,
        });
        Some(unit)
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

fn skip_reason(set: &BeatmapsetEntry) -> &'static str {
    if set.cannot_download {
        "download disabled"
    } else {
        "no audio"
    }
}

// ============================================================================
// Unit Task
// ============================================================================

async fn run_unit(
    ctx: Arc<PassContext>,
    downloader: Arc<dyn MirrorDownloader>,
    mut unit: WorkUnit,
    download_permit: OwnedSemaphorePermit,
    index: usize,
) -> (usize, UnitResult) {
    let result = match sync_unit(&ctx, downloader.as_ref(), &mut unit, download_permit).await {
        Ok(variants) => UnitResult::Synced { unit, variants },
        Err(error) => {
            unit.fail();
            UnitResult::Failed { unit, error }
        }
    };
    (index, result)
}

#[instrument(skip_all, fields(set_id = unit.id(), mirror = downloader.name()))]
async fn sync_unit(
    ctx: &PassContext,
    downloader: &dyn MirrorDownloader,
    unit: &mut WorkUnit,
    download_permit: OwnedSemaphorePermit,
) -> Result<Vec<String>> {
    unit.transition(UnitState::Downloading)?;
    let archive = downloader.download_set(unit.id()).await?;
    debug!(bytes = archive.len(), "Downloaded beatmapset");

    unit.transition(UnitState::AwaitingUploadSlot)?;
    let _in_flight = ctx
        .gate
        .admit(&ctx.cancel)
        .await
        .ok_or(SyncError::Cancelled)?;
    drop(download_permit);

    let _upload_slot = Arc::clone(&ctx.upload_slots)
        .acquire_owned()
        .await
        .map_err(|_| SyncError::Cancelled)?;
    if ctx.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    unit.transition(UnitState::Uploading)?;
    let mut staged = unit.set.clone();
    let mut uploaded = Vec::new();
    for variant in ctx.config.variants.required(&unit.set) {
        let data = render(variant, &archive).await?;
        let (link, path) = upload_variant(ctx, &staged, variant, data).await?;
        staged.record_variant(variant.as_str(), &link, &path);
        uploaded.push(variant.as_str().to_string());
    }

    unit.set = staged;
    unit.transition(UnitState::Done)?;
    Ok(uploaded)
}

/// Produce the bytes for `variant`; filtering runs on the blocking pool.
async fn render(variant: Variant, archive: &Bytes) -> Result<Bytes> {
    match variant {
        Variant::Full => Ok(archive.clone()),
        Variant::Derived(policy) => {
            let source = archive.clone();
            let filtered = spawn_blocking(move || filter::process(policy, &source))
                .await
                .map_err(|e| ArchiveError::Write(format!("{} filter task failed: {}", policy, e)))??;
            Ok(Bytes::from(filtered))
        }
    }
}

/// Upload one variant unless the remote copy matches, then share it.
///
/// Returns the share link and the object path.
async fn upload_variant(
    ctx: &PassContext,
    set: &BeatmapsetEntry,
    variant: Variant,
    data: Bytes,
) -> Result<(String, String)> {
    let folder = ctx.config.layout.folder(set, variant.as_str());
    let name = ctx.config.layout.file_name(set);
    let object_path = format!("{}/{}", folder, name);

    let existing = match ctx.remote.get_item(&folder, &name).await {
        Ok(item) => item,
        Err(e) => {
            warn!(path = %object_path, error = %e, "Remote lookup failed, uploading anyway");
            None
        }
    };

    let up_to_date = existing.as_ref().is_some_and(|item| {
        item.fingerprint
            .as_deref()
            .is_some_and(|remote| ctx.remote.fingerprint_matches(remote, &data))
    });

    let item = match existing {
        Some(item) if up_to_date => {
            debug!(path = %object_path, "Remote copy up to date, skipping upload");
            item
        }
        _ => {
            ctx.remote.upload_large(&folder, &name, data).await?;
            ctx.remote
                .get_item(&folder, &name)
                .await?
                .ok_or_else(|| BridgeError::NotFound(object_path.clone()))?
        }
    };

    let link = ctx.remote.make_share_link(&item.id).await?;
    debug!(path = %object_path, variant = %variant, "Variant shared");
    Ok((link, object_path))
}
