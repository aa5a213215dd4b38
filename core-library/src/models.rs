//! # Ledger Domain Models
//!
//! Catalog entities as they are recorded in the archive ledger.
//!
//! A [`BeatmapsetEntry`] owns its [`BeatmapEntry`] values. Each set is
//! downloaded and uploaded as one unit, so the variant maps (`link`, `path`) on
//! a set are copied onto every one of its entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LibraryError, Result};

/// Variant name → share URL, or variant name → remote path.
pub type VariantMap = BTreeMap<String, String>;

// ============================================================================
// Enumerations
// ============================================================================

/// Ruleset a chart is played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum GameMode {
    Osu = 0,
    Taiko = 1,
    Catch = 2,
    Mania = 3,
}

impl GameMode {
    pub const ALL: [GameMode; 4] = [
        GameMode::Osu,
        GameMode::Taiko,
        GameMode::Catch,
        GameMode::Mania,
    ];
}

impl From<GameMode> for i8 {
    fn from(mode: GameMode) -> Self {
        mode as i8
    }
}

impl TryFrom<i8> for GameMode {
    type Error = LibraryError;

    fn try_from(value: i8) -> Result<Self> {
        match value {
            0 => Ok(GameMode::Osu),
            1 => Ok(GameMode::Taiko),
            2 => Ok(GameMode::Catch),
            3 => Ok(GameMode::Mania),
            other => Err(LibraryError::InvalidInput {
                field: "mode".to_string(),
                message: format!("unknown game mode {}", other),
            }),
        }
    }
}

/// Lifecycle status of a chart on the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum BeatmapStatus {
    Graveyard = -2,
    Wip = -1,
    Pending = 0,
    Ranked = 1,
    Approved = 2,
    Qualified = 3,
    Loved = 4,
}

impl From<BeatmapStatus> for i8 {
    fn from(status: BeatmapStatus) -> Self {
        status as i8
    }
}

impl TryFrom<i8> for BeatmapStatus {
    type Error = LibraryError;

    fn try_from(value: i8) -> Result<Self> {
        match value {
            -2 => Ok(BeatmapStatus::Graveyard),
            -1 => Ok(BeatmapStatus::Wip),
            0 => Ok(BeatmapStatus::Pending),
            1 => Ok(BeatmapStatus::Ranked),
            2 => Ok(BeatmapStatus::Approved),
            3 => Ok(BeatmapStatus::Qualified),
            4 => Ok(BeatmapStatus::Loved),
            other => Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("unknown beatmap status {}", other),
            }),
        }
    }
}

// ============================================================================
// BeatmapEntry
// ============================================================================

/// One chart within a beatmapset.
///
/// Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatmapEntry {
    pub beatmap_id: i64,
    pub beatmapset_id: i64,
    pub mode: GameMode,
    pub status: BeatmapStatus,

    pub artist: String,
    #[serde(default)]
    pub artist_unicode: String,
    pub title: String,
    #[serde(default)]
    pub title_unicode: String,
    #[serde(default)]
    pub difficulty_name: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub creator_id: i64,

    #[serde(default)]
    pub has_storyboard: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub cannot_download: bool,
    #[serde(default)]
    pub no_audio: bool,

    pub last_update: i64,
    #[serde(default)]
    pub submit_date: i64,
    #[serde(default)]
    pub approved_date: i64,

    #[serde(default)]
    pub link: VariantMap,
    #[serde(default)]
    pub path: VariantMap,
}

impl BeatmapEntry {
    /// Minimal entry; remaining fields take their empty defaults.
    pub fn new(
        beatmap_id: i64,
        beatmapset_id: i64,
        mode: GameMode,
        status: BeatmapStatus,
        artist: impl Into<String>,
        title: impl Into<String>,
        last_update: i64,
    ) -> Self {
        Self {
            beatmap_id,
            beatmapset_id,
            mode,
            status,
            artist: artist.into(),
            artist_unicode: String::new(),
            title: title.into(),
            title_unicode: String::new(),
            difficulty_name: String::new(),
            creator: String::new(),
            creator_id: 0,
            has_storyboard: false,
            has_video: false,
            cannot_download: false,
            no_audio: false,
            last_update,
            submit_date: 0,
            approved_date: 0,
            link: VariantMap::new(),
            path: VariantMap::new(),
        }
    }

    /// Catalog facts compared when deciding whether a set must be re-synced.
    ///
    /// Creator and the variant maps are deliberately excluded.
    pub fn catalog_eq(&self, other: &BeatmapEntry) -> bool {
        self.artist == other.artist
            && self.artist_unicode == other.artist_unicode
            && self.title == other.title
            && self.title_unicode == other.title_unicode
            && self.mode == other.mode
            && self.status == other.status
            && self.last_update == other.last_update
            && self.has_storyboard == other.has_storyboard
            && self.has_video == other.has_video
    }
}

// ============================================================================
// BeatmapsetEntry
// ============================================================================

/// A beatmapset and the charts it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatmapsetEntry {
    pub beatmapset_id: i64,
    pub beatmaps: BTreeMap<i64, BeatmapEntry>,
    pub last_update: i64,
    #[serde(default)]
    pub link: VariantMap,
    #[serde(default)]
    pub path: VariantMap,
    #[serde(default)]
    pub has_storyboard: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub cannot_download: bool,
    #[serde(default)]
    pub no_audio: bool,
}

impl BeatmapsetEntry {
    /// Aggregate charts into a set, deriving flags and `last_update`.
    ///
    /// Charts whose `beatmapset_id` differs from `beatmapset_id` are rejected.
    pub fn from_entries(
        beatmapset_id: i64,
        entries: impl IntoIterator<Item = BeatmapEntry>,
    ) -> Result<Self> {
        let mut set = Self {
            beatmapset_id,
            beatmaps: BTreeMap::new(),
            last_update: 0,
            link: VariantMap::new(),
            path: VariantMap::new(),
            has_storyboard: false,
            has_video: false,
            cannot_download: false,
            no_audio: false,
        };

        for entry in entries {
            if entry.beatmapset_id != beatmapset_id {
                return Err(LibraryError::InvalidInput {
                    field: "beatmapset_id".to_string(),
                    message: format!(
                        "beatmap {} belongs to set {}, not {}",
                        entry.beatmap_id, entry.beatmapset_id, beatmapset_id
                    ),
                });
            }
            set.beatmaps.insert(entry.beatmap_id, entry);
        }

        set.recompute_derived();
        Ok(set)
    }

    /// Re-derive the OR'd flags and raise `last_update` to cover every chart.
    pub fn recompute_derived(&mut self) {
        let entries = self.beatmaps.values();
        let (mut storyboard, mut video, mut no_download, mut no_audio) =
            (false, false, false, false);
        let mut newest = self.last_update;
        for entry in entries {
            storyboard |= entry.has_storyboard;
            video |= entry.has_video;
            no_download |= entry.cannot_download;
            no_audio |= entry.no_audio;
            newest = newest.max(entry.last_update);
        }
        self.has_storyboard = storyboard;
        self.has_video = video;
        self.cannot_download = no_download;
        self.no_audio = no_audio;
        self.last_update = newest;
    }

    /// Chart used for naming: the one with the lowest id.
    pub fn primary(&self) -> Option<&BeatmapEntry> {
        self.beatmaps.values().next()
    }

    /// Sets the catalog says cannot be fetched are skipped outright.
    pub fn is_downloadable(&self) -> bool {
        !(self.cannot_download || self.no_audio)
    }

    /// Game mode of the primary chart.
    pub fn mode(&self) -> GameMode {
        self.primary().map(|e| e.mode).unwrap_or(GameMode::Osu)
    }

    /// Status of the primary chart.
    pub fn status(&self) -> BeatmapStatus {
        self.primary()
            .map(|e| e.status)
            .unwrap_or(BeatmapStatus::Pending)
    }

    /// Record an uploaded variant on the set and on every chart.
    pub fn record_variant(&mut self, variant: &str, link: &str, path: &str) {
        self.link.insert(variant.to_string(), link.to_string());
        self.path.insert(variant.to_string(), path.to_string());
        for entry in self.beatmaps.values_mut() {
            entry.link.insert(variant.to_string(), link.to_string());
            entry.path.insert(variant.to_string(), path.to_string());
        }
    }

    /// Whether this catalog observation is already reflected by `ledger`.
    ///
    /// True only if this set is not older than the ledger copy, both hold the
    /// same charts, and every chart agrees on catalog facts.
    pub fn catalog_eq(&self, ledger: &BeatmapsetEntry) -> bool {
        if self.last_update < ledger.last_update || self.beatmaps.len() != ledger.beatmaps.len() {
            return false;
        }

        self.beatmaps.iter().all(|(id, entry)| {
            ledger
                .beatmaps
                .get(id)
                .is_some_and(|other| entry.catalog_eq(other))
        })
    }
}

impl fmt::Display for BeatmapsetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary() {
            Some(entry) => write!(f, "{} {} - {}", self.beatmapset_id, entry.artist, entry.title),
            None => write!(f, "{}", self.beatmapset_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, set: i64, last_update: i64) -> BeatmapEntry {
        BeatmapEntry::new(
            id,
            set,
            GameMode::Osu,
            BeatmapStatus::Ranked,
            "Artist",
            "Title",
            last_update,
        )
    }

    #[test]
    fn test_from_entries_derives_flags_and_timestamp() {
        let mut a = entry(2, 10, 100);
        a.has_video = true;
        let mut b = entry(1, 10, 250);
        b.no_audio = true;

        let set = BeatmapsetEntry::from_entries(10, vec![a, b]).unwrap();
        assert!(set.has_video);
        assert!(!set.has_storyboard);
        assert!(set.no_audio);
        assert!(!set.is_downloadable());
        assert_eq!(set.last_update, 250);
        assert_eq!(set.primary().unwrap().beatmap_id, 1);
    }

    #[test]
    fn test_from_entries_rejects_foreign_chart() {
        let result = BeatmapsetEntry::from_entries(10, vec![entry(1, 11, 0)]);
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[test]
    fn test_record_variant_reaches_every_chart() {
        let mut set =
            BeatmapsetEntry::from_entries(10, vec![entry(1, 10, 0), entry(2, 10, 0)]).unwrap();
        set.record_variant("full", "https://x/1", "beatmaps/std/ranked/full");

        assert_eq!(set.link.get("full").unwrap(), "https://x/1");
        for chart in set.beatmaps.values() {
            assert_eq!(chart.path.get("full").unwrap(), "beatmaps/std/ranked/full");
        }
    }

    #[test]
    fn test_catalog_eq_ignores_creator_and_links() {
        let ledger =
            BeatmapsetEntry::from_entries(10, vec![entry(1, 10, 100)]).unwrap();
        let mut observed = ledger.clone();
        observed.beatmaps.get_mut(&1).unwrap().creator = "someone else".to_string();
        observed.link.insert("full".into(), "x".into());
        assert!(observed.catalog_eq(&ledger));

        observed.beatmaps.get_mut(&1).unwrap().status = BeatmapStatus::Loved;
        assert!(!observed.catalog_eq(&ledger));
    }

    #[test]
    fn test_catalog_eq_older_or_different_count() {
        let ledger =
            BeatmapsetEntry::from_entries(10, vec![entry(1, 10, 100)]).unwrap();

        let mut older = ledger.clone();
        older.last_update = 50;
        assert!(!older.catalog_eq(&ledger));

        let bigger =
            BeatmapsetEntry::from_entries(10, vec![entry(1, 10, 100), entry(2, 10, 100)])
                .unwrap();
        assert!(!bigger.catalog_eq(&ledger));
    }

    #[test]
    fn test_enum_serialization_is_numeric() {
        let json = serde_json::to_string(&BeatmapStatus::Graveyard).unwrap();
        assert_eq!(json, "-2");
        let mode: GameMode = serde_json::from_str("3").unwrap();
        assert_eq!(mode, GameMode::Mania);
        assert!(serde_json::from_str::<GameMode>("7").is_err());
    }

    #[test]
    fn test_display_uses_primary_chart() {
        let set = BeatmapsetEntry::from_entries(10, vec![entry(1, 10, 0)]).unwrap();
        assert_eq!(set.to_string(), "10 Artist - Title");
    }
}
