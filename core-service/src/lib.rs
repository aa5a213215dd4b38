//! Archive service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (mirrors, remote
//! store, filesystem, ledger store, clock) into the sync pipeline and runs
//! passes until the work settles. Desktop hosts typically enable the
//! `desktop-shims` feature, which builds every dependency from a
//! [`CoreConfig`] and an access token. The `sqlite-ledger` feature lets that
//! bootstrap open an SQLite ledger instead of the JSON file.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{Clock, FileSystemAccess, MirrorDownloader, RemoteStore};
use chrono::{DateTime, Utc};
use core_async::sync::{CancellationToken, RwLock};
use core_async::time::{sleep_or_cancel, Duration};
use core_library::{group_catalog_entries, BeatmapEntry, LedgerStore, MetadataLedger};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, LedgerEvent, SyncEvent};
use core_sync::{CheckpointStore, PassReport, SyncConfig, SyncOrchestrator, WorkUnit};
use tracing::{info, instrument, warn};

/// Aggregated handle to all bridge dependencies the archive core requires.
pub struct ArchiveDependencies {
    pub downloaders: Vec<Arc<dyn MirrorDownloader>>,
    pub remote_store: Arc<dyn RemoteStore>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub clock: Arc<dyn Clock>,
}

impl ArchiveDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        downloaders: Vec<Arc<dyn MirrorDownloader>>,
        remote_store: Arc<dyn RemoteStore>,
        filesystem: Arc<dyn FileSystemAccess>,
        ledger_store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            downloaders,
            remote_store,
            filesystem,
            ledger_store,
            clock,
        }
    }
}

/// Totals for a `run_until_settled` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub passes: u32,
    pub synced: usize,
    pub skipped: usize,
    pub abandoned: Vec<(i64, String)>,
    /// Units still unsynced when the run stopped. Empty unless cancelled.
    pub remaining: Vec<WorkUnit>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            passes: 0,
            synced: 0,
            skipped: 0,
            abandoned: Vec::new(),
            remaining: Vec::new(),
            cancelled: false,
            started_at,
            finished_at: started_at,
        }
    }

    fn absorb(&mut self, pass: &PassReport) {
        self.passes += 1;
        self.synced += pass.synced.len();
        self.skipped += pass.skipped.len();
        self.abandoned.extend(pass.abandoned.iter().cloned());
    }
}

/// Primary façade exposed to host applications.
pub struct ArchiveService {
    config: CoreConfig,
    downloaders: Vec<Arc<dyn MirrorDownloader>>,
    ledger_store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    orchestrator: SyncOrchestrator,
    checkpoints: CheckpointStore,
    event_bus: EventBus,
    cancel: CancellationToken,
}

impl ArchiveService {
    /// Validate `config` and load the ledger. A missing ledger starts empty.
    pub async fn new(
        config: CoreConfig,
        deps: ArchiveDependencies,
        event_bus: EventBus,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = match deps.ledger_store.load().await? {
            Some(ledger) => ledger,
            None => {
                info!("No ledger found, starting empty");
                MetadataLedger::new()
            }
        };
        info!(sets = ledger.beatmap_sets.len(), "Ledger ready");

        let orchestrator = SyncOrchestrator::new(
            SyncConfig::from_core(&config),
            deps.remote_store,
            Arc::new(RwLock::new(ledger)),
            event_bus.clone(),
            cancel.clone(),
        );
        let checkpoints = CheckpointStore::new(deps.filesystem, config.run.checkpoint_dir.clone());

        Ok(Self {
            config,
            downloaders: deps.downloaders,
            ledger_store: deps.ledger_store,
            clock: deps.clock,
            orchestrator,
            checkpoints,
            event_bus,
            cancel,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<RwLock<MetadataLedger>> {
        self.orchestrator.ledger()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Group catalog observations and keep the sets the ledger is behind on.
    pub async fn plan(&self, entries: impl IntoIterator<Item = BeatmapEntry>) -> Vec<WorkUnit> {
        let delta = group_catalog_entries(entries);
        let ledger = self.orchestrator.ledger();
        let ledger = ledger.read().await;
        let observed = delta.sets.len();

        let units: Vec<WorkUnit> = delta
            .sets
            .into_iter()
            .filter(|set| ledger.needs_sync(set))
            .map(WorkUnit::new)
            .collect();
        info!(observed, planned = units.len(), cursor = ?delta.cursor, "Planned sync work");
        units
    }

    /// Split `units` into `run.shards` checkpoint files.
    pub async fn distribute(&self, units: Vec<WorkUnit>) -> Result<usize> {
        Ok(self
            .checkpoints
            .write_shards(units, self.config.run.shards)
            .await?)
    }

    /// Claim shard `shard` and run it until settled.
    ///
    /// Returns `None` if the shard does not exist. On cancellation the shard
    /// is rewritten with the units still left; otherwise it is deleted.
    #[instrument(skip(self))]
    pub async fn resume_shard(&self, shard: usize) -> Result<Option<SyncReport>> {
        let Some(units) = self.checkpoints.claim(shard).await? else {
            return Ok(None);
        };
        self.emit(CoreEvent::Ledger(LedgerEvent::ShardClaimed {
            shard,
            units: units.len(),
        }));

        let units: Vec<WorkUnit> = {
            let ledger = self.orchestrator.ledger();
            let ledger = ledger.read().await;
            units
                .into_iter()
                .filter(|unit| ledger.needs_sync(&unit.set))
                .collect()
        };

        let report = self.run_until_settled(units).await?;
        if report.cancelled {
            self.checkpoints.save(shard, &report.remaining).await?;
            info!(shard, remaining = report.remaining.len(), "Shard interrupted, checkpoint saved");
        } else {
            self.checkpoints.complete(shard).await?;
            self.emit(CoreEvent::Ledger(LedgerEvent::ShardCompleted { shard }));
        }
        Ok(Some(report))
    }

    /// Run passes until the retry batch is empty or the run is cancelled.
    ///
    /// The ledger is saved after every pass.
    ///
    /// # Errors
    ///
    /// Ledger persistence failures and configuration errors abort the run.
    #[instrument(skip(self, units), fields(units = units.len()))]
    pub async fn run_until_settled(&self, units: Vec<WorkUnit>) -> Result<SyncReport> {
        let mut report = SyncReport::new(self.clock.now());
        let backoff = Duration::from_secs(self.config.run.retry_backoff_secs);
        let mut units = units;

        loop {
            let pass = self.orchestrator.sync_batch(&self.downloaders, units).await?;
            report.absorb(&pass);
            self.save_ledger().await?;

            let retry = pass.retry.into_units();
            if retry.is_empty() {
                break;
            }
            if pass.cancelled {
                report.cancelled = true;
                report.remaining = retry;
                break;
            }

            warn!(
                failed = retry.len(),
                backoff_secs = backoff.as_secs(),
                "Retrying failed beatmapsets after backoff"
            );
            if !sleep_or_cancel(backoff, &self.cancel).await {
                self.emit(CoreEvent::Sync(SyncEvent::Cancelled {
                    pass: report.passes,
                    remaining: retry.len(),
                }));
                report.cancelled = true;
                report.remaining = retry;
                break;
            }
            units = retry;
        }

        report.finished_at = self.clock.now();
        info!(
            passes = report.passes,
            synced = report.synced,
            skipped = report.skipped,
            abandoned = report.abandoned.len(),
            remaining = report.remaining.len(),
            cancelled = report.cancelled,
            "Sync run finished"
        );
        Ok(report)
    }

    /// Persist the current ledger through the configured store.
    pub async fn save_ledger(&self) -> Result<()> {
        let ledger = self.orchestrator.ledger();
        let ledger = ledger.read().await;
        self.ledger_store.save(&ledger).await?;
        self.emit(CoreEvent::Ledger(LedgerEvent::Saved {
            sets: ledger.beatmap_sets.len(),
        }));
        Ok(())
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Builds the reqwest HTTP client, the tokio filesystem, the OneDrive remote
/// store and the configured mirrors and ledger store.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::CoreConfig;
///
/// let config = CoreConfig::builder().enable_variant("no_video").build()?;
/// let service = core_service::bootstrap_desktop(config, "graph-token").await?;
/// let report = service.run_until_settled(Vec::new()).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    config: CoreConfig,
    onedrive_token: impl Into<String>,
) -> Result<ArchiveService> {
    use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
    use bridge_traits::{HttpClient, SystemClock};
    use provider_onedrive::OneDriveConnector;

    config.validate()?;

    let cancel = CancellationToken::new();
    let http_client: Arc<dyn HttpClient> = Arc::new(
        ReqwestHttpClient::new().map_err(|err| CoreError::InitializationFailed(err.to_string()))?,
    );
    let filesystem: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let remote_store = Arc::new(
        OneDriveConnector::new(Arc::clone(&http_client), onedrive_token)
            .with_cancellation(cancel.clone())
            .with_clock(Arc::clone(&clock)),
    );
    let ledger_store = open_ledger_store(&config, Arc::clone(&filesystem)).await?;
    let downloaders = provider_mirrors::build_downloaders(
        &config.mirrors,
        http_client,
        None,
        cancel.clone(),
    );

    let deps = ArchiveDependencies::new(
        downloaders,
        remote_store,
        filesystem,
        ledger_store,
        clock,
    );
    ArchiveService::new(config, deps, EventBus::default(), cancel).await
}

#[cfg(feature = "desktop-shims")]
async fn open_ledger_store(
    config: &CoreConfig,
    filesystem: Arc<dyn FileSystemAccess>,
) -> Result<Arc<dyn LedgerStore>> {
    use core_runtime::config::LedgerBackend;

    match config.run.ledger_backend {
        LedgerBackend::Json => Ok(Arc::new(core_library::JsonLedgerStore::new(
            filesystem,
            config.run.ledger_path.clone(),
        ))),
        #[cfg(feature = "sqlite-ledger")]
        LedgerBackend::Sqlite => {
            use core_library::db::{create_pool, DatabaseConfig};

            let pool = create_pool(DatabaseConfig::new(config.run.ledger_path.clone())).await?;
            Ok(Arc::new(core_library::SqliteLedgerStore::new(pool)))
        }
        #[cfg(not(feature = "sqlite-ledger"))]
        LedgerBackend::Sqlite => Err(CoreError::CapabilityMissing {
            capability: "sqlite-ledger".to_string(),
            message: "Rebuild with the `sqlite-ledger` feature or set run.ledger_backend = \"json\"."
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::{BridgeError, RemoteItem};
    use bytes::Bytes;
    use core_async::time::Instant;
    use core_library::{BeatmapStatus, BeatmapsetEntry, GameMode};
    use mockall::mock;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    mock! {
        Ledger {}

        #[async_trait]
        impl LedgerStore for Ledger {
            async fn load(&self) -> core_library::Result<Option<MetadataLedger>>;
            async fn save(&self, ledger: &MetadataLedger) -> core_library::Result<()>;
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
        }
    }

    /// Fails the first `failures` downloads, then serves a tiny archive.
    struct FlakyMirror {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MirrorDownloader for FlakyMirror {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn download_set(&self, _set_id: i64) -> bridge_traits::error::Result<Bytes> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(BridgeError::OperationFailed("503".into()));
            }
            Ok(Bytes::from_static(b"osz"))
        }
    }

    #[derive(Default)]
    struct MemoryRemote {
        objects: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl RemoteStore for MemoryRemote {
        async fn get_item(&self, path: &str, name: &str) -> bridge_traits::error::Result<Option<RemoteItem>> {
            let key = format!("{}/{}", path, name);
            let present = self.objects.lock().map(|o| o.contains(&key)).unwrap_or(false);
            Ok(present.then(|| RemoteItem {
                id: key,
                name: name.to_string(),
                size: 3,
                fingerprint: None,
            }))
        }

        async fn upload_large(&self, path: &str, name: &str, _data: Bytes) -> bridge_traits::error::Result<()> {
            if let Ok(mut objects) = self.objects.lock() {
                objects.insert(format!("{}/{}", path, name));
            }
            Ok(())
        }

        async fn make_share_link(&self, item_id: &str) -> bridge_traits::error::Result<String> {
            Ok(format!("https://share.example/{}", item_id))
        }

        fn fingerprint_matches(&self, _remote: &str, _data: &[u8]) -> bool {
            false
        }
    }

    fn chart(set_id: i64, last_update: i64) -> BeatmapEntry {
        BeatmapEntry::new(set_id * 10, set_id, GameMode::Osu, BeatmapStatus::Ranked, "A", "T", last_update)
    }

    fn unit(set_id: i64) -> WorkUnit {
        WorkUnit::new(BeatmapsetEntry::from_entries(set_id, vec![chart(set_id, 100)]).unwrap())
    }

    fn saving_store(saves: usize) -> MockLedger {
        let mut store = MockLedger::new();
        store.expect_load().returning(|| Ok(None));
        store.expect_save().times(saves).returning(|_| Ok(()));
        store
    }

    async fn service(
        config: CoreConfig,
        mirror: FlakyMirror,
        ledger_store: MockLedger,
        checkpoint_fs: Arc<dyn FileSystemAccess>,
    ) -> ArchiveService {
        let deps = ArchiveDependencies::new(
            vec![Arc::new(mirror)],
            Arc::new(MemoryRemote::default()),
            checkpoint_fs,
            Arc::new(ledger_store),
            Arc::new(FixedClock),
        );
        ArchiveService::new(config, deps, EventBus::new(64), CancellationToken::new())
            .await
            .unwrap()
    }

    fn mirror(failures: usize) -> FlakyMirror {
        FlakyMirror {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_new_loads_existing_ledger() {
        let mut existing = MetadataLedger::new();
        existing.merge_set(BeatmapsetEntry::from_entries(1, vec![chart(1, 100)]).unwrap());
        let mut store = MockLedger::new();
        store.expect_load().return_once(move || Ok(Some(existing)));

        let svc = service(CoreConfig::default(), mirror(0), store, Arc::new(TokioFileSystem::new())).await;
        assert!(svc.ledger().read().await.get_set(1).is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = CoreConfig {
            general: core_runtime::config::GeneralConfig {
                max_concurrency: 0,
                upload_multiple: 1,
            },
            ..CoreConfig::default()
        };
        let deps = ArchiveDependencies::new(
            Vec::new(),
            Arc::new(MemoryRemote::default()),
            Arc::new(TokioFileSystem::new()),
            Arc::new(MockLedger::new()),
            Arc::new(FixedClock),
        );
        let result = ArchiveService::new(config, deps, EventBus::new(8), CancellationToken::new()).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_plan_skips_caught_up_sets() {
        let mut existing = MetadataLedger::new();
        existing.merge_set(BeatmapsetEntry::from_entries(1, vec![chart(1, 100)]).unwrap());
        let mut store = MockLedger::new();
        store.expect_load().return_once(move || Ok(Some(existing)));
        let svc = service(CoreConfig::default(), mirror(0), store, Arc::new(TokioFileSystem::new())).await;

        let units = svc.plan(vec![chart(1, 100), chart(2, 50), chart(3, 70)]).await;
        let ids: Vec<i64> = units.iter().map(WorkUnit::id).collect();
        assert_eq!(ids, vec![2, 3]);

        let units = svc.plan(vec![chart(1, 150)]).await;
        assert_eq!(units.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_backoff_until_settled() {
        let config = CoreConfig::builder().retry_backoff_secs(60).build().unwrap();
        let svc = service(config, mirror(1), saving_store(2), Arc::new(TokioFileSystem::new())).await;

        let started = Instant::now();
        let report = svc.run_until_settled(vec![unit(1)]).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(report.passes, 2);
        assert_eq!(report.synced, 1);
        assert!(report.remaining.is_empty());
        assert!(!report.cancelled);
        assert_eq!(report.started_at, FixedClock.now());
        assert!(svc.ledger().read().await.get_set(1).is_some());
    }

    #[tokio::test]
    async fn test_save_failure_is_fatal() {
        let mut store = MockLedger::new();
        store.expect_load().returning(|| Ok(None));
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(core_library::LibraryError::Migration("disk full".into())));
        let svc = service(CoreConfig::default(), mirror(0), store, Arc::new(TokioFileSystem::new())).await;

        let result = svc.run_until_settled(vec![unit(1)]).await;
        assert!(matches!(result, Err(CoreError::Library(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_keeps_remaining() {
        let svc = service(CoreConfig::default(), mirror(usize::MAX), saving_store(1), Arc::new(TokioFileSystem::new())).await;
        let cancel = svc.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let report = svc.run_until_settled(vec![unit(1), unit(2)]).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.passes, 1);
        let ids: Vec<i64> = report.remaining.iter().map(WorkUnit::id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_distribute_and_resume_shard() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::builder()
            .checkpoint_dir(dir.path())
            .shards(2)
            .build()
            .unwrap();
        let svc = service(config, mirror(0), saving_store(2), Arc::new(TokioFileSystem::new())).await;

        assert_eq!(svc.distribute(vec![unit(1), unit(2), unit(3)]).await.unwrap(), 2);

        let first = svc.resume_shard(1).await.unwrap().unwrap();
        assert_eq!(first.synced, 2);
        assert!(!dir.path().join("shard-1.json").exists());

        let second = svc.resume_shard(2).await.unwrap().unwrap();
        assert_eq!(second.synced, 1);
        assert!(svc.resume_shard(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_shard_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::builder().checkpoint_dir(dir.path()).build().unwrap();
        let svc = service(config, mirror(0), saving_store(1), Arc::new(TokioFileSystem::new())).await;

        svc.distribute(vec![unit(1), unit(2)]).await.unwrap();
        svc.cancellation_token().cancel();

        let report = svc.resume_shard(1).await.unwrap().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.remaining.len(), 2);
        assert!(dir.path().join("shard-1.json").exists());
    }
}
