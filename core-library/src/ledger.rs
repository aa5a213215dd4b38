//! # Metadata Ledger
//!
//! In-memory record of everything already mirrored, with the merge rules the
//! orchestrator applies after a successful upload.
//!
//! ## Invariants
//!
//! - Every chart reachable from `beatmap_sets` is also present in `beatmaps`
//!   with identical content.
//! - A set's `last_update` is at least the newest `last_update` of its charts.
//! - `game_mode[m]` is the newest `last_update` merged for mode `m`.
//!
//! ## Merge
//!
//! Newer wins, at set granularity and again at chart granularity. Ties keep
//! the existing value. With distinct timestamps the per-id winner is the
//! maximum, so merge order does not matter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{BeatmapEntry, BeatmapsetEntry, GameMode};

/// Per-mode "last processed" watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeWatermark {
    pub update_time: i64,
}

/// Result of merging one set into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The set was not present before.
    Inserted,
    /// At least one chart or the set-level record was replaced.
    Updated,
    /// Nothing newer than what the ledger already held.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataLedger {
    #[serde(default)]
    pub game_mode: BTreeMap<GameMode, ModeWatermark>,
    #[serde(default)]
    pub beatmaps: BTreeMap<i64, BeatmapEntry>,
    #[serde(default)]
    pub beatmap_sets: BTreeMap<i64, BeatmapsetEntry>,
}

impl MetadataLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_set(&self, beatmapset_id: i64) -> Option<&BeatmapsetEntry> {
        self.beatmap_sets.get(&beatmapset_id)
    }

    pub fn get_beatmap(&self, beatmap_id: i64) -> Option<&BeatmapEntry> {
        self.beatmaps.get(&beatmap_id)
    }

    pub fn watermark(&self, mode: GameMode) -> Option<i64> {
        self.game_mode.get(&mode).map(|w| w.update_time)
    }

    /// True unless the ledger already holds an equal-or-newer copy of `set`.
    pub fn needs_sync(&self, set: &BeatmapsetEntry) -> bool {
        match self.beatmap_sets.get(&set.beatmapset_id) {
            Some(existing) => !set.catalog_eq(existing),
            None => true,
        }
    }

    /// Merge one set, applying newer-wins at set and chart granularity.
    pub fn merge_set(&mut self, incoming: BeatmapsetEntry) -> MergeOutcome {
        let set_id = incoming.beatmapset_id;

        let outcome = match self.beatmap_sets.get_mut(&set_id) {
            None => {
                let mut set = incoming;
                set.recompute_derived();
                self.beatmap_sets.insert(set_id, set);
                MergeOutcome::Inserted
            }
            Some(existing) => {
                let mut changed = false;

                for (id, chart) in &incoming.beatmaps {
                    match existing.beatmaps.get(id) {
                        Some(current) if chart.last_update <= current.last_update => {}
                        _ => {
                            existing.beatmaps.insert(*id, chart.clone());
                            changed = true;
                        }
                    }
                }

                if incoming.last_update > existing.last_update {
                    existing.last_update = incoming.last_update;
                    existing.link = incoming.link;
                    existing.path = incoming.path;
                    changed = true;
                }

                existing.recompute_derived();
                if changed {
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Unchanged
                }
            }
        };

        self.sync_set_index(set_id);
        debug!(set_id, outcome = ?outcome, "Merged beatmapset into ledger");
        outcome
    }

    /// Copy the set's charts into the top-level map and raise mode watermarks.
    fn sync_set_index(&mut self, set_id: i64) {
        let Some(set) = self.beatmap_sets.get(&set_id) else {
            return;
        };
        for (id, chart) in &set.beatmaps {
            self.beatmaps.insert(*id, chart.clone());
            let mark = self.game_mode.entry(chart.mode).or_default();
            mark.update_time = mark.update_time.max(chart.last_update);
        }
    }

    /// Check the structural invariants. Used by stores after loading.
    pub fn is_consistent(&self) -> bool {
        self.beatmap_sets.values().all(|set| {
            let newest = set
                .beatmaps
                .values()
                .map(|c| c.last_update)
                .max()
                .unwrap_or(i64::MIN);
            set.last_update >= newest
                && set
                    .beatmaps
                    .iter()
                    .all(|(id, chart)| self.beatmaps.get(id) == Some(chart))
        })
    }
}

/// Catalog observations grouped into sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogDelta {
    /// Grouped sets, ordered by set id.
    pub sets: Vec<BeatmapsetEntry>,
    /// Newest `approved_date` seen, for use as the next catalog cursor.
    pub cursor: Option<i64>,
}

/// Group observed charts by set id, OR-ing flags into each set.
pub fn group_catalog_entries(entries: impl IntoIterator<Item = BeatmapEntry>) -> CatalogDelta {
    let mut grouped: BTreeMap<i64, Vec<BeatmapEntry>> = BTreeMap::new();
    let mut cursor: Option<i64> = None;

    for entry in entries {
        cursor = Some(cursor.map_or(entry.approved_date, |c| c.max(entry.approved_date)));
        grouped.entry(entry.beatmapset_id).or_default().push(entry);
    }

    let sets = grouped
        .into_iter()
        .filter_map(|(set_id, charts)| BeatmapsetEntry::from_entries(set_id, charts).ok())
        .collect();

    CatalogDelta { sets, cursor }
}
