//! SQLite ledger store

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{LibraryError, Result};
use crate::ledger::{MetadataLedger, ModeWatermark};
use crate::models::{BeatmapEntry, BeatmapStatus, BeatmapsetEntry, GameMode, VariantMap};
use crate::repositories::LedgerStore;

#[derive(Debug, FromRow)]
struct BeatmapRow {
    beatmap_id: i64,
    beatmapset_id: i64,
    mode: i64,
    status: i64,
    artist: String,
    artist_unicode: String,
    title: String,
    title_unicode: String,
    difficulty_name: String,
    creator: String,
    creator_id: i64,
    has_storyboard: bool,
    has_video: bool,
    cannot_download: bool,
    no_audio: bool,
    last_update: i64,
    submit_date: i64,
    approved_date: i64,
    link: String,
    path: String,
}

#[derive(Debug, FromRow)]
struct BeatmapsetRow {
    beatmapset_id: i64,
    last_update: i64,
    has_storyboard: bool,
    has_video: bool,
    cannot_download: bool,
    no_audio: bool,
    link: String,
    path: String,
}

fn narrow(field: &str, value: i64) -> Result<i8> {
    i8::try_from(value).map_err(|_| LibraryError::InvalidInput {
        field: field.to_string(),
        message: format!("{value} out of range"),
    })
}

impl TryFrom<BeatmapRow> for BeatmapEntry {
    type Error = LibraryError;

    fn try_from(row: BeatmapRow) -> Result<Self> {
        Ok(BeatmapEntry {
            beatmap_id: row.beatmap_id,
            beatmapset_id: row.beatmapset_id,
            mode: GameMode::try_from(narrow("mode", row.mode)?)?,
            status: BeatmapStatus::try_from(narrow("status", row.status)?)?,
            artist: row.artist,
            artist_unicode: row.artist_unicode,
            title: row.title,
            title_unicode: row.title_unicode,
            difficulty_name: row.difficulty_name,
            creator: row.creator,
            creator_id: row.creator_id,
            has_storyboard: row.has_storyboard,
            has_video: row.has_video,
            cannot_download: row.cannot_download,
            no_audio: row.no_audio,
            last_update: row.last_update,
            submit_date: row.submit_date,
            approved_date: row.approved_date,
            link: serde_json::from_str(&row.link)?,
            path: serde_json::from_str(&row.path)?,
        })
    }
}

/// Ledger stored in relational tables.
///
/// `save` replaces every table inside one transaction, so readers never
/// observe a half-written ledger.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self) -> Result<Option<MetadataLedger>> {
        let marks: Vec<(i64, i64)> = query_as("SELECT gamemode, time FROM update_time")
            .fetch_all(&self.pool)
            .await?;
        let set_rows = query_as::<_, BeatmapsetRow>("SELECT * FROM beatmapsets")
            .fetch_all(&self.pool)
            .await?;
        let chart_rows = query_as::<_, BeatmapRow>("SELECT * FROM beatmaps")
            .fetch_all(&self.pool)
            .await?;

        if marks.is_empty() && set_rows.is_empty() && chart_rows.is_empty() {
            debug!("SQLite ledger is empty");
            return Ok(None);
        }

        let mut ledger = MetadataLedger::new();
        for (mode, time) in marks {
            let mode = GameMode::try_from(narrow("gamemode", mode)?)?;
            ledger
                .game_mode
                .insert(mode, ModeWatermark { update_time: time });
        }

        for row in chart_rows {
            let chart = BeatmapEntry::try_from(row)?;
            ledger.beatmaps.insert(chart.beatmap_id, chart);
        }

        let mut charts_by_set: BTreeMap<i64, BTreeMap<i64, BeatmapEntry>> = BTreeMap::new();
        for chart in ledger.beatmaps.values() {
            charts_by_set
                .entry(chart.beatmapset_id)
                .or_default()
                .insert(chart.beatmap_id, chart.clone());
        }

        for row in set_rows {
            let link: VariantMap = serde_json::from_str(&row.link)?;
            let path: VariantMap = serde_json::from_str(&row.path)?;
            let set = BeatmapsetEntry {
                beatmapset_id: row.beatmapset_id,
                beatmaps: charts_by_set.remove(&row.beatmapset_id).unwrap_or_default(),
                last_update: row.last_update,
                link,
                path,
                has_storyboard: row.has_storyboard,
                has_video: row.has_video,
                cannot_download: row.cannot_download,
                no_audio: row.no_audio,
            };
            ledger.beatmap_sets.insert(set.beatmapset_id, set);
        }

        info!(
            sets = ledger.beatmap_sets.len(),
            beatmaps = ledger.beatmaps.len(),
            "Loaded SQLite ledger"
        );
        Ok(Some(ledger))
    }

    async fn save(&self, ledger: &MetadataLedger) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM update_time").execute(&mut *tx).await?;
        query("DELETE FROM beatmaps").execute(&mut *tx).await?;
        query("DELETE FROM beatmapsets").execute(&mut *tx).await?;

        for (mode, mark) in &ledger.game_mode {
            query("INSERT INTO update_time (gamemode, time) VALUES (?, ?)")
                .bind(i8::from(*mode) as i64)
                .bind(mark.update_time)
                .execute(&mut *tx)
                .await?;
        }

        for set in ledger.beatmap_sets.values() {
            query(
                r#"
                INSERT INTO beatmapsets (
                    beatmapset_id, last_update, has_storyboard, has_video,
                    cannot_download, no_audio, link, path
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(set.beatmapset_id)
            .bind(set.last_update)
            .bind(set.has_storyboard)
            .bind(set.has_video)
            .bind(set.cannot_download)
            .bind(set.no_audio)
            .bind(serde_json::to_string(&set.link)?)
            .bind(serde_json::to_string(&set.path)?)
            .execute(&mut *tx)
            .await?;
        }

        for chart in ledger.beatmaps.values() {
            query(
                r#"
                INSERT INTO beatmaps (
                    beatmap_id, beatmapset_id, mode, status, artist, artist_unicode,
                    title, title_unicode, difficulty_name, creator, creator_id,
                    has_storyboard, has_video, cannot_download, no_audio,
                    last_update, submit_date, approved_date, link, path
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chart.beatmap_id)
            .bind(chart.beatmapset_id)
            .bind(i8::from(chart.mode) as i64)
            .bind(i8::from(chart.status) as i64)
            .bind(&chart.artist)
            .bind(&chart.artist_unicode)
            .bind(&chart.title)
            .bind(&chart.title_unicode)
            .bind(&chart.difficulty_name)
            .bind(&chart.creator)
            .bind(chart.creator_id)
            .bind(chart.has_storyboard)
            .bind(chart.has_video)
            .bind(chart.cannot_download)
            .bind(chart.no_audio)
            .bind(chart.last_update)
            .bind(chart.submit_date)
            .bind(chart.approved_date)
            .bind(serde_json::to_string(&chart.link)?)
            .bind(serde_json::to_string(&chart.path)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(sets = ledger.beatmap_sets.len(), "Saved SQLite ledger");
        Ok(())
    }
}
