//! JSON file ledger store

use async_trait::async_trait;
use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{LibraryError, Result};
use crate::ledger::MetadataLedger;
use crate::repositories::LedgerStore;

/// Ledger stored as a single JSON document.
///
/// Writes go to a `.tmp` sibling first and are renamed over the target, so a
/// crash mid-write leaves the previous ledger intact.
pub struct JsonLedgerStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<Option<MetadataLedger>> {
        if !self.fs.exists(&self.path).await? {
            debug!(path = ?self.path, "No ledger file yet");
            return Ok(None);
        }

        let data = self.fs.read_file(&self.path).await?;
        let ledger: MetadataLedger = serde_json::from_slice(&data)?;
        if !ledger.is_consistent() {
            return Err(LibraryError::InvalidInput {
                field: "ledger".to_string(),
                message: format!("{} violates ledger invariants", self.path.display()),
            });
        }

        info!(
            sets = ledger.beatmap_sets.len(),
            beatmaps = ledger.beatmaps.len(),
            "Loaded JSON ledger"
        );
        Ok(Some(ledger))
    }

    async fn save(&self, ledger: &MetadataLedger) -> Result<()> {
        let data = serde_json::to_vec(ledger)?;
        let tmp = self.temp_path();

        self.fs.write_file(&tmp, Bytes::from(data)).await?;
        self.fs.rename(&tmp, &self.path).await?;

        debug!(path = ?self.path, sets = ledger.beatmap_sets.len(), "Saved JSON ledger");
        Ok(())
    }
}
