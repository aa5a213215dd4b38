//! Reference extraction from `.osu` / `.osb` scripts.
//!
//! Only the event lines matter here:
//!
//! ```text
//! 0,0,"bg.jpg",0,0                          background
//! Sprite,Foreground,Centre,"sb\star.png",320,240
//! Sample,2000,0,"sb\boom.wav",70
//! Animation,Fail,Centre,"sb\run.png",320,240,8,50,LoopForever
//! ```
//!
//! References are normalized the same way container entry names are: quotes
//! removed, `\` turned into `/`, lower-cased.

use std::collections::HashSet;

const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".bmp", ".gif"];

/// Files referenced by the scripts of one container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptReferences {
    /// `Sprite` and `Sample` targets.
    pub single_files: HashSet<String>,
    /// `Animation` targets with the image extension and frame digits removed.
    pub animation_stems: HashSet<String>,
    /// Declared background images, at most one per script.
    pub backgrounds: HashSet<String>,
}

impl ScriptReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect references from one script's text.
    pub fn scan(&mut self, script: &str) {
        let mut background_seen = false;

        for line in script.lines() {
            let line = line.trim_start();

            if !background_seen && line.starts_with("0,0,") {
                if let Some(file) = field(line, 2) {
                    self.backgrounds.insert(file);
                    background_seen = true;
                }
            } else if line.starts_with("Sprite,") || line.starts_with("Sample,") {
                if let Some(file) = field(line, 3) {
                    self.single_files.insert(file);
                }
            } else if line.starts_with("Animation,") {
                if let Some(file) = field(line, 3) {
                    self.animation_stems.insert(frame_stem(&file).to_string());
                }
            }
        }
    }
}

/// Normalize a reference or an entry name for comparison.
pub fn normalize(name: &str) -> String {
    name.trim()
        .replace('"', "")
        .replace('\\', "/")
        .to_lowercase()
}

/// Strip a trailing image extension, then trailing frame digits.
///
/// `sb/run12.png` and `sb/run.png` both become `sb/run`. Names with any
/// other extension are returned unchanged.
pub fn frame_stem(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    let stem = match IMAGE_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
        Some(ext) => &name[..name.len() - ext.len()],
        None if has_extension(name) => return name,
        None => name,
    };
    stem.trim_end_matches(|c: char| c.is_ascii_digit())
}

fn has_extension(name: &str) -> bool {
    name.rsplit('/').next().is_some_and(|base| base.contains('.'))
}

fn field(line: &str, index: usize) -> Option<String> {
    let raw = line.split(',').nth(index)?;
    let file = normalize(raw);
    if file.is_empty() {
        None
    } else {
        Some(file)
    }
}
