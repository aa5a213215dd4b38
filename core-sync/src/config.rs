use core_runtime::config::CoreConfig;

use crate::layout::RemoteLayout;
use crate::variants::VariantPlan;

/// Orchestrator settings, taken from the validated [`CoreConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Size of the download pool and, separately, of the upload pool.
    pub max_concurrency: usize,
    /// Multiplier on `max_concurrency` for the in-flight cap.
    pub upload_multiple: usize,
    /// Derived variants to produce next to `full`.
    pub variants: VariantPlan,
    pub layout: RemoteLayout,
    /// Permanent failures before a unit is abandoned. 0 never abandons.
    pub max_permanent_failures: u32,
}

impl SyncConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            max_concurrency: config.general.max_concurrency,
            upload_multiple: config.general.upload_multiple,
            variants: VariantPlan::new(config.variants.clone()),
            layout: RemoteLayout::new(config.paths.clone()),
            max_permanent_failures: config.run.max_permanent_failures,
        }
    }

    pub fn in_flight_cap(&self) -> usize {
        self.max_concurrency * self.upload_multiple
    }

    /// Whether `strikes` permanent failures exhaust the unit.
    pub fn is_exhausted(&self, strikes: u32) -> bool {
        self.max_permanent_failures > 0 && strikes >= self.max_permanent_failures
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_core(&CoreConfig::default())
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self::from_core(config)
    }
}
