//! Remote folder layout and object naming.

use core_library::{BeatmapStatus, BeatmapsetEntry, GameMode};
use core_runtime::config::PathsConfig;

const UNSAFE_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maps a set and variant to `root/{mode}/{status}/{variant}/{file}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteLayout {
    paths: PathsConfig,
}

impl RemoteLayout {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    pub fn mode_folder(&self, mode: GameMode) -> &str {
        match mode {
            GameMode::Osu => &self.paths.std,
            GameMode::Taiko => &self.paths.taiko,
            GameMode::Catch => &self.paths.catch,
            GameMode::Mania => &self.paths.mania,
        }
    }

    pub fn status_folder(&self, status: BeatmapStatus) -> &str {
        match status {
            BeatmapStatus::Ranked | BeatmapStatus::Approved => &self.paths.ranked,
            BeatmapStatus::Loved => &self.paths.loved,
            BeatmapStatus::Qualified => &self.paths.qualified,
            BeatmapStatus::Graveyard => &self.paths.graveyard,
            BeatmapStatus::Wip => &self.paths.wip,
            BeatmapStatus::Pending => &self.paths.pending,
        }
    }

    /// Folder holding `variant` for this set.
    pub fn folder(&self, set: &BeatmapsetEntry, variant: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.paths.root,
            self.mode_folder(set.mode()),
            self.status_folder(set.status()),
            variant
        )
    }

    /// `"{sid} {artist} - {title}.osz"`, named after the lowest-id chart.
    pub fn file_name(&self, set: &BeatmapsetEntry) -> String {
        sanitize(&format!("{}.osz", set))
    }
}

/// Replace characters most filesystems reject with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
