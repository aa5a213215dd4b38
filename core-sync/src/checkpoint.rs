//! # Checkpoint Shards
//!
//! A planned work list is split into `shard-{i}.json` files (1-based) so
//! independent workers can each claim one and pick up where they left off
//! after an interruption.
//!
//! A shard is a JSON array of [`WorkUnit`]s. It is rewritten with the
//! remaining units when a run is cancelled and deleted once it completes.

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::unit::WorkUnit;

/// Split `units` into chunks of `ceil(len / shards)`.
///
/// May return fewer than `shards` chunks; an empty input returns none.
pub fn split_into_shards(units: Vec<WorkUnit>, shards: usize) -> Vec<Vec<WorkUnit>> {
    if units.is_empty() {
        return Vec::new();
    }
    let shards = shards.max(1);
    let chunk = units.len().div_ceil(shards);

    let mut out = Vec::with_capacity(shards);
    let mut iter = units.into_iter().peekable();
    while iter.peek().is_some() {
        out.push(iter.by_ref().take(chunk).collect());
    }
    out
}

/// Shard files under one checkpoint directory.
pub struct CheckpointStore {
    fs: Arc<dyn FileSystemAccess>,
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_path(&self, shard: usize) -> PathBuf {
        self.dir.join(format!("shard-{}.json", shard))
    }

    /// Split and write `units`; returns the number of shard files written.
    pub async fn write_shards(&self, units: Vec<WorkUnit>, shards: usize) -> Result<usize> {
        if shards == 0 {
            return Err(SyncError::Config(
                "run.shards must be at least 1".to_string(),
            ));
        }
        self.fs.create_dir_all(&self.dir).await?;

        let chunks = split_into_shards(units, shards);
        for (i, chunk) in chunks.iter().enumerate() {
            self.save(i + 1, chunk).await?;
        }
        info!(dir = %self.dir.display(), shards = chunks.len(), "Wrote checkpoint shards");
        Ok(chunks.len())
    }

    /// Read shard `shard`, or `None` if it does not exist.
    pub async fn claim(&self, shard: usize) -> Result<Option<Vec<WorkUnit>>> {
        let path = self.shard_path(shard);
        if !self.fs.exists(&path).await? {
            debug!(shard, "No checkpoint to claim");
            return Ok(None);
        }

        let data = self.fs.read_file(&path).await?;
        let units: Vec<WorkUnit> = serde_json::from_slice(&data).map_err(|e| {
            SyncError::Checkpoint(format!("{} is not a valid shard: {}", path.display(), e))
        })?;
        info!(shard, units = units.len(), "Claimed checkpoint shard");
        Ok(Some(units))
    }

    /// Replace shard `shard` with `units`.
    pub async fn save(&self, shard: usize, units: &[WorkUnit]) -> Result<()> {
        let json = serde_json::to_vec(units)
            .map_err(|e| SyncError::Checkpoint(format!("failed to encode shard {}: {}", shard, e)))?;
        self.fs
            .write_file(&self.shard_path(shard), Bytes::from(json))
            .await?;
        debug!(shard, units = units.len(), "Saved checkpoint shard");
        Ok(())
    }

    /// Remove a finished shard. Missing files are not an error.
    pub async fn complete(&self, shard: usize) -> Result<()> {
        let path = self.shard_path(shard);
        if self.fs.exists(&path).await? {
            self.fs.delete_file(&path).await?;
        }
        info!(shard, "Checkpoint shard completed");
        Ok(())
    }
}
