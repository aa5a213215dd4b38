//! Which variants a set needs.

use core_archive::FilterPolicy;
use core_library::BeatmapsetEntry;
use core_runtime::config::VariantsConfig;
use std::fmt;

/// One uploadable rendition of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// The archive exactly as downloaded.
    Full,
    Derived(FilterPolicy),
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Full => "full",
            Variant::Derived(policy) => policy.as_str(),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enabled derived variants, checked against each set's content flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPlan {
    enabled: VariantsConfig,
}

impl VariantPlan {
    pub fn new(enabled: VariantsConfig) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self, policy: FilterPolicy) -> bool {
        match policy {
            FilterPolicy::Mini => self.enabled.mini,
            FilterPolicy::NoVideo => self.enabled.no_video,
            FilterPolicy::NoStoryboard => self.enabled.no_storyboard,
            FilterPolicy::NoHitSound => self.enabled.no_hit_sound,
            FilterPolicy::NoBackground => self.enabled.no_background,
        }
    }

    /// `Full` first, then every enabled policy the set has content for.
    pub fn required(&self, set: &BeatmapsetEntry) -> Vec<Variant> {
        let mut variants = vec![Variant::Full];
        variants.extend(
            FilterPolicy::ALL
                .into_iter()
                .filter(|policy| self.is_enabled(*policy) && has_content_for(*policy, set))
                .map(Variant::Derived),
        );
        variants
    }
}

fn has_content_for(policy: FilterPolicy, set: &BeatmapsetEntry) -> bool {
    match policy {
        FilterPolicy::Mini => set.has_video || set.has_storyboard,
        FilterPolicy::NoVideo => set.has_video,
        FilterPolicy::NoStoryboard => set.has_storyboard,
        FilterPolicy::NoHitSound | FilterPolicy::NoBackground => true,
    }
}
