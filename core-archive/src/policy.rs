//! Named keep/drop rules.

use std::fmt;
use std::str::FromStr;

use crate::index::EntryClass;

/// A derived variant's filter rule.
///
/// The full archive has no policy; it is uploaded as downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterPolicy {
    Mini,
    NoVideo,
    NoStoryboard,
    NoHitSound,
    NoBackground,
}

impl FilterPolicy {
    pub const ALL: [FilterPolicy; 5] = [
        FilterPolicy::Mini,
        FilterPolicy::NoVideo,
        FilterPolicy::NoStoryboard,
        FilterPolicy::NoHitSound,
        FilterPolicy::NoBackground,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterPolicy::Mini => "mini",
            FilterPolicy::NoVideo => "no_video",
            FilterPolicy::NoStoryboard => "no_storyboard",
            FilterPolicy::NoHitSound => "no_hit_sound",
            FilterPolicy::NoBackground => "no_background",
        }
    }

    /// Whether the rule needs script references to classify entries.
    pub fn needs_scripts(&self) -> bool {
        matches!(
            self,
            FilterPolicy::Mini | FilterPolicy::NoStoryboard | FilterPolicy::NoBackground
        )
    }

    pub fn drops(&self, class: &EntryClass) -> bool {
        match self {
            FilterPolicy::NoVideo => class.video,
            FilterPolicy::NoHitSound => class.hit_sample,
            FilterPolicy::NoStoryboard => class.storyboard && !class.background,
            FilterPolicy::NoBackground => class.background && !class.storyboard,
            FilterPolicy::Mini => {
                class.video || class.hit_sample || class.background || class.storyboard
            }
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mini" => Ok(FilterPolicy::Mini),
            "no_video" => Ok(FilterPolicy::NoVideo),
            "no_storyboard" => Ok(FilterPolicy::NoStoryboard),
            "no_hit_sound" => Ok(FilterPolicy::NoHitSound),
            "no_background" | "no_bg" => Ok(FilterPolicy::NoBackground),
            other => Err(format!("unknown filter policy '{}'", other)),
        }
    }
}
