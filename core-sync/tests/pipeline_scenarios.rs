//! End-to-end passes over in-memory mirrors and an in-memory remote store.
//!
//! These tests exercise:
//! - Variant selection and filtering for a real container
//! - Upload skipping when the remote fingerprint matches
//! - The in-flight cap under slow uploads
//! - Cancellation part-way through scheduling
//! - Permanent-failure strikes and abandonment
//! - Recovery of a unit whose task panicked

use async_trait::async_trait;
use bridge_traits::{error::Result as BridgeResult, BridgeError, MirrorDownloader, RemoteItem, RemoteStore};
use bytes::Bytes;
use core_archive::entry_names;
use core_async::sync::{CancellationToken, Mutex as AsyncMutex, RwLock};
use core_async::time::{sleep, Duration};
use core_library::{BeatmapEntry, BeatmapStatus, BeatmapsetEntry, GameMode, MetadataLedger};
use core_runtime::config::VariantsConfig;
use core_runtime::events::EventBus;
use core_sync::{SyncConfig, SyncOrchestrator, UploadGate, VariantPlan, WorkUnit};
use mockall::mock;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ============================================================================
// Fixtures
// ============================================================================

fn osz(entries: &[(&str, &[u8])]) -> Bytes {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

fn video_set() -> Bytes {
    osz(&[
        ("Artist - Song (Mapper) [Easy].osu", b"[Events]\r\n0,0,\"bg.jpg\",0,0\r\n".as_slice()),
        ("audio.mp3", [1u8; 32].as_slice()),
        ("bg.jpg", [2u8; 16].as_slice()),
        ("intro.mp4", [3u8; 64].as_slice()),
        ("normal-hitclap.wav", [4u8; 8].as_slice()),
    ])
}

fn unit(id: i64, video: bool) -> WorkUnit {
    let mut chart = BeatmapEntry::new(id * 10, id, GameMode::Osu, BeatmapStatus::Ranked, "Artist", "Song", 100);
    chart.has_video = video;
    WorkUnit::new(BeatmapsetEntry::from_entries(id, vec![chart]).unwrap())
}

fn config(max_concurrency: usize, upload_multiple: usize) -> SyncConfig {
    SyncConfig {
        max_concurrency,
        upload_multiple,
        ..SyncConfig::default()
    }
}

fn orchestrator(
    config: SyncConfig,
    store: Arc<dyn RemoteStore>,
    cancel: CancellationToken,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        config,
        store,
        Arc::new(RwLock::new(MetadataLedger::new())),
        EventBus::new(256),
        cancel,
    )
}

fn fingerprint(data: &[u8]) -> String {
    let sum: u64 = data.iter().map(|b| *b as u64).sum();
    format!("{}:{}", data.len(), sum)
}

// ============================================================================
// Mock Implementations
// ============================================================================

/// Mirror serving the same archive for every set.
struct StaticMirror {
    archive: Bytes,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticMirror {
    fn new(archive: Bytes) -> Self {
        Self {
            archive,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MirrorDownloader for StaticMirror {
    fn name(&self) -> &str {
        "static"
    }

    async fn download_set(&self, _set_id: i64) -> BridgeResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        Ok(self.archive.clone())
    }
}

/// Mirror that fails every set and panics on one.
struct PanickyMirror {
    panic_on: i64,
}

#[async_trait]
impl MirrorDownloader for PanickyMirror {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn download_set(&self, set_id: i64) -> BridgeResult<Bytes> {
        if set_id == self.panic_on {
            panic!("mirror bug on set {}", set_id);
        }
        Err(BridgeError::OperationFailed("503".into()))
    }
}

/// Remote store backed by a map, recording every upload.
#[derive(Default)]
struct MemoryStore {
    items: AsyncMutex<HashMap<String, (RemoteItem, Bytes)>>,
    uploads: AsyncMutex<Vec<(String, Bytes)>>,
    upload_delay: Duration,
    gate: AsyncMutex<Option<UploadGate>>,
    max_in_flight: AtomicUsize,
    active_uploads: AtomicUsize,
    max_active_uploads: AtomicUsize,
    cancel_on_upload: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_item(&self, path: &str, name: &str) -> BridgeResult<Option<RemoteItem>> {
        let key = format!("{}/{}", path, name);
        Ok(self.items.lock().await.get(&key).map(|(item, _)| item.clone()))
    }

    async fn upload_large(&self, path: &str, name: &str, data: Bytes) -> BridgeResult<()> {
        let active = self.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_uploads.fetch_max(active, Ordering::SeqCst);
        if let Some(gate) = self.gate.lock().await.as_ref() {
            self.max_in_flight.fetch_max(gate.in_flight(), Ordering::SeqCst);
        }
        if !self.upload_delay.is_zero() {
            sleep(self.upload_delay).await;
        }

        let key = format!("{}/{}", path, name);
        let item = RemoteItem {
            id: key.clone(),
            name: name.to_string(),
            size: data.len() as u64,
            fingerprint: Some(fingerprint(&data)),
        };
        self.items.lock().await.insert(key.clone(), (item, data.clone()));
        let mut uploads = self.uploads.lock().await;
        uploads.push((key, data));

        if let Some((after, token)) = &self.cancel_on_upload {
            if uploads.len() == *after {
                token.cancel();
            }
        }
        self.active_uploads.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn make_share_link(&self, item_id: &str) -> BridgeResult<String> {
        Ok(format!("https://share.example/{}", item_id.replace(' ', "%20")))
    }

    fn fingerprint_matches(&self, remote: &str, data: &[u8]) -> bool {
        remote == fingerprint(data)
    }
}

mock! {
    Store {}

    #[async_trait]
    impl RemoteStore for Store {
        async fn get_item(&self, path: &str, name: &str) -> BridgeResult<Option<RemoteItem>>;
        async fn upload_large(&self, path: &str, name: &str, data: Bytes) -> BridgeResult<()>;
        async fn make_share_link(&self, item_id: &str) -> BridgeResult<String>;
        fn fingerprint_matches(&self, remote: &str, data: &[u8]) -> bool;
    }
}

mock! {
    Mirror {}

    #[async_trait]
    impl MirrorDownloader for Mirror {
        fn name(&self) -> &str;
        async fn download_set(&self, set_id: i64) -> BridgeResult<Bytes>;
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_video_set_uploads_full_and_no_video_only() {
    let store = Arc::new(MemoryStore::default());
    let mut sync_config = config(2, 2);
    sync_config.variants = VariantPlan::new(VariantsConfig {
        no_video: true,
        ..VariantsConfig::default()
    });
    let orch = orchestrator(sync_config, store.clone(), CancellationToken::new());
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![Arc::new(StaticMirror::new(video_set()))];

    let report = orch.sync_batch(&mirrors, vec![unit(100, true)]).await.unwrap();
    assert_eq!(report.synced, vec![100]);

    let uploads = store.uploads.lock().await;
    let mut paths: Vec<&str> = uploads.iter().map(|(key, _)| key.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "beatmaps/std/ranked/full/100 Artist - Song.osz",
            "beatmaps/std/ranked/no_video/100 Artist - Song.osz",
        ]
    );

    let no_video = &uploads
        .iter()
        .find(|(key, _)| key.contains("/no_video/"))
        .unwrap()
        .1;
    let names = entry_names(no_video).unwrap();
    assert!(!names.iter().any(|n| n.ends_with(".mp4")));
    assert!(names.contains(&"bg.jpg".to_string()));

    let ledger = orch.ledger();
    let ledger = ledger.read().await;
    let set = ledger.get_set(100).unwrap();
    assert_eq!(set.link.keys().collect::<Vec<_>>(), vec!["full", "no_video"]);
    assert!(!set.link.contains_key("mini"));
    assert!(ledger.is_consistent());
}

#[tokio::test]
async fn test_matching_fingerprint_skips_upload_but_shares() {
    let mut store = MockStore::new();
    store.expect_get_item().returning(|path, name| {
        Ok(Some(RemoteItem {
            id: format!("existing:{}/{}", path, name),
            name: name.to_string(),
            size: 10,
            fingerprint: Some("same".to_string()),
        }))
    });
    store.expect_fingerprint_matches().returning(|remote, _| remote == "same");
    store.expect_upload_large().never();
    store
        .expect_make_share_link()
        .times(1)
        .returning(|id| Ok(format!("https://share.example/{}", id.len())));

    let orch = orchestrator(config(1, 1), Arc::new(store), CancellationToken::new());
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![Arc::new(StaticMirror::new(video_set()))];

    let report = orch.sync_batch(&mirrors, vec![unit(7, false)]).await.unwrap();

    assert_eq!(report.synced, vec![7]);
    let ledger = orch.ledger();
    assert!(ledger.read().await.get_set(7).unwrap().link["full"].starts_with("https://share.example/"));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_never_exceeds_cap() {
    let store = Arc::new(MemoryStore {
        upload_delay: Duration::from_secs(2),
        ..MemoryStore::default()
    });
    let orch = orchestrator(config(2, 2), store.clone(), CancellationToken::new());
    *store.gate.lock().await = Some(orch.gate());

    let mut mirror = StaticMirror::new(video_set());
    mirror.delay = Duration::from_millis(100);
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![Arc::new(mirror)];
    let units: Vec<WorkUnit> = (1..=20).map(|id| unit(id, false)).collect();

    let report = orch.sync_batch(&mirrors, units).await.unwrap();

    assert_eq!(report.synced.len(), 20);
    assert!(report.retry.is_empty());
    let max_in_flight = store.max_in_flight.load(Ordering::SeqCst);
    assert!(max_in_flight >= 1 && max_in_flight <= 4, "max in flight {}", max_in_flight);
    assert!(store.max_active_uploads.load(Ordering::SeqCst) <= 2);
    assert_eq!(orch.gate().in_flight(), 0);
}

#[tokio::test]
async fn test_cancel_after_two_dispatched_returns_the_rest() {
    let cancel = CancellationToken::new();
    let store = Arc::new(MemoryStore {
        cancel_on_upload: Some((2, cancel.clone())),
        ..MemoryStore::default()
    });
    let orch = orchestrator(config(2, 1), store.clone(), cancel);
    let mirror = Arc::new(StaticMirror::new(video_set()));
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![mirror.clone()];
    let units: Vec<WorkUnit> = (1..=10).map(|id| unit(id, false)).collect();

    let report = orch.sync_batch(&mirrors, units).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(mirror.calls.load(Ordering::SeqCst), 2);
    let mut synced = report.synced.clone();
    synced.sort();
    assert_eq!(synced, vec![1, 2]);
    assert_eq!(report.retry.ids(), (3..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_permanent_failures_abandon_after_limit() {
    let mut mirror = MockMirror::new();
    mirror.expect_name().return_const("gone".to_string());
    mirror
        .expect_download_set()
        .times(2)
        .returning(|id| Err(BridgeError::NotAvailable(format!("set {} removed", id))));
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![Arc::new(mirror)];

    let mut sync_config = config(1, 1);
    sync_config.max_permanent_failures = 2;
    let orch = orchestrator(sync_config, Arc::new(MemoryStore::default()), CancellationToken::new());

    let first = orch.sync_batch(&mirrors, vec![unit(3, false)]).await.unwrap();
    assert!(first.abandoned.is_empty());
    assert_eq!(first.retry.iter().next().unwrap().permanent_failures, 1);

    let second = orch.sync_batch(&mirrors, first.retry.into_units()).await.unwrap();
    assert!(second.retry.is_empty());
    assert_eq!(second.abandoned.len(), 1);
    assert_eq!(second.abandoned[0].0, 3);
    assert_eq!(second.pass, 2);
}

#[tokio::test]
async fn test_malformed_container_is_a_strike() {
    let store = Arc::new(MemoryStore::default());
    let mut sync_config = config(1, 1);
    sync_config.variants = VariantPlan::new(VariantsConfig {
        no_video: true,
        ..VariantsConfig::default()
    });
    let orch = orchestrator(sync_config, store.clone(), CancellationToken::new());
    let mirrors: Vec<Arc<dyn MirrorDownloader>> =
        vec![Arc::new(StaticMirror::new(Bytes::from_static(b"not a zip")))];

    let report = orch.sync_batch(&mirrors, vec![unit(4, true)]).await.unwrap();

    assert_eq!(report.retry.iter().next().unwrap().permanent_failures, 1);
    assert!(orch.ledger().read().await.get_set(4).is_none());
}

#[tokio::test]
async fn test_panicking_task_is_recovered_for_retry() {
    let mirrors: Vec<Arc<dyn MirrorDownloader>> = vec![Arc::new(PanickyMirror { panic_on: 2 })];

    let orch = orchestrator(config(2, 1), Arc::new(MemoryStore::default()), CancellationToken::new());
    let report = orch
        .sync_batch(&mirrors, vec![unit(1, false), unit(2, false), unit(3, false)])
        .await
        .unwrap();

    assert_eq!(report.retry.ids(), vec![1, 2, 3]);
    assert_eq!(report.failed, 3);
}
