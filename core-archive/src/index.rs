//! Per-container classification of entries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::script::{frame_stem, normalize, ScriptReferences};

const VIDEO_EXTENSIONS: [&str; 3] = [".avi", ".mp4", ".flv"];

/// `<sampleSet>-<objType><hitSound><index>.wav`, with any prefix such as
/// `taiko-`.
static HIT_SAMPLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(normal|soft|drum)-(slider|hit)(normal|whistle|finish|clap|slide|tick)\d*\.wav$")
        .expect("HIT_SAMPLE is a valid regex")
});

/// Independent predicates over one entry name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryClass {
    pub video: bool,
    pub storyboard: bool,
    pub background: bool,
    pub hit_sample: bool,
}

/// Script references of one container, ready for classifying its entries.
#[derive(Debug, Default)]
pub struct ContainerIndex {
    refs: ScriptReferences,
}

impl ContainerIndex {
    pub fn new(refs: ScriptReferences) -> Self {
        Self { refs }
    }

    pub fn references(&self) -> &ScriptReferences {
        &self.refs
    }

    pub fn classify(&self, entry_name: &str) -> EntryClass {
        let name = normalize(entry_name);
        EntryClass {
            video: is_video(&name),
            storyboard: self.is_storyboard_asset(&name),
            background: self.refs.backgrounds.contains(&name),
            hit_sample: is_hit_sample(&name),
        }
    }

    fn is_storyboard_asset(&self, name: &str) -> bool {
        name.ends_with(".osb")
            || self.refs.single_files.contains(name)
            || self.refs.animation_stems.contains(frame_stem(name))
    }
}

/// `.osu` difficulty files and `.osb` storyboard scripts.
pub fn is_script(entry_name: &str) -> bool {
    let name = entry_name.to_ascii_lowercase();
    name.ends_with(".osu") || name.ends_with(".osb")
}

pub fn is_video(entry_name: &str) -> bool {
    let name = entry_name.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Matches skin hit samples by basename, in any folder.
pub fn is_hit_sample(entry_name: &str) -> bool {
    let base = entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name);
    HIT_SAMPLE.is_match(base)
}
