//! # Core Configuration Module
//!
//! Plain-data configuration for an archive run.
//!
//! ## Overview
//!
//! `CoreConfig` is a tree of serde-enabled sections with defaults for every
//! field, so a host can deserialize a partial document in whatever format it
//! prefers and fill the rest from defaults. Every path into a usable config
//! goes through [`CoreConfig::validate`], which fails fast with an actionable
//! [`Error::Config`] message.
//!
//! ## Sections
//!
//! - [`GeneralConfig`] - worker pool sizing
//! - [`PathsConfig`] - remote folder layout
//! - [`VariantsConfig`] - which derived variants to produce
//! - [`MirrorConfig`] - which download mirrors to rotate through
//! - [`RunConfig`] - ledger, checkpoints and retry pacing
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, LedgerBackend};
//!
//! let config = CoreConfig::builder()
//!     .max_concurrency(8)
//!     .ledger_path("/srv/archive/metadata.json")
//!     .ledger_backend(LedgerBackend::Json)
//!     .checkpoint_dir("/srv/archive/checkpoints")
//!     .enable_variant("no_video")
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MAX_CONCURRENCY_LIMIT: usize = 64;
const MAX_UPLOAD_MULTIPLE: usize = 16;

/// Top-level configuration for an archive run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub variants: VariantsConfig,
    pub mirrors: MirrorConfig,
    pub run: RunConfig,
}

// ============================================================================
// Sections
// ============================================================================

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Parallel downloads, and separately parallel uploads.
    pub max_concurrency: usize,
    /// Downloaded-but-not-uploaded sets allowed per worker.
    ///
    /// The in-flight cap is `max_concurrency * upload_multiple`.
    pub upload_multiple: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            upload_multiple: 2,
        }
    }
}

impl GeneralConfig {
    pub fn in_flight_cap(&self) -> usize {
        self.max_concurrency * self.upload_multiple
    }
}

/// Remote folder layout: `root/{mode}/{status}/{variant}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: String,

    pub std: String,
    pub taiko: String,
    pub catch: String,
    pub mania: String,

    /// Shared by ranked and approved sets.
    pub ranked: String,
    pub loved: String,
    pub qualified: String,
    pub graveyard: String,
    pub wip: String,
    pub pending: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: "beatmaps".to_string(),
            std: "std".to_string(),
            taiko: "taiko".to_string(),
            catch: "catch".to_string(),
            mania: "mania".to_string(),
            ranked: "ranked".to_string(),
            loved: "loved".to_string(),
            qualified: "qualified".to_string(),
            graveyard: "graveyard".to_string(),
            wip: "wip".to_string(),
            pending: "pending".to_string(),
        }
    }
}

impl PathsConfig {
    fn folders(&self) -> [(&'static str, &str); 11] {
        [
            ("root", &self.root),
            ("std", &self.std),
            ("taiko", &self.taiko),
            ("catch", &self.catch),
            ("mania", &self.mania),
            ("ranked", &self.ranked),
            ("loved", &self.loved),
            ("qualified", &self.qualified),
            ("graveyard", &self.graveyard),
            ("wip", &self.wip),
            ("pending", &self.pending),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.folders() {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "paths.{} cannot be empty",
                    field
                )));
            }
            if value.contains('/') || value.contains('\\') {
                return Err(Error::Config(format!(
                    "paths.{} must be a single folder name, got '{}'",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// Derived variants to produce next to the always-on full archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantsConfig {
    pub mini: bool,
    pub no_video: bool,
    pub no_storyboard: bool,
    pub no_hit_sound: bool,
    #[serde(alias = "no_bg")]
    pub no_background: bool,
}

impl VariantsConfig {
    /// Enable a variant by name. Accepts `no_bg` for `no_background`.
    pub fn enable(&mut self, name: &str) -> Result<()> {
        match name {
            "mini" => self.mini = true,
            "no_video" => self.no_video = true,
            "no_storyboard" => self.no_storyboard = true,
            "no_hit_sound" => self.no_hit_sound = true,
            "no_background" | "no_bg" => self.no_background = true,
            other => {
                return Err(Error::Config(format!(
                    "Unknown variant '{}'. Expected one of: mini, no_video, no_storyboard, no_hit_sound, no_background",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Download mirrors, rotated round-robin in the order listed here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enable_sayobot: bool,
    pub enable_catboy: bool,
    pub enable_nerinyan: bool,
    pub enable_official: bool,
    /// Sayobot server selector (`auto`, `0`, ...).
    pub sayobot_server: String,
    /// Bearer token for the official API. Acquiring it is the host's job.
    pub official_token: Option<String>,
    /// Inline retries after a 429 before failing the download.
    pub rate_limit_retries: u32,
    /// Delay used when a 429 carries no usable retry header.
    pub fallback_retry_after_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enable_sayobot: true,
            enable_catboy: true,
            enable_nerinyan: true,
            enable_official: false,
            sayobot_server: "auto".to_string(),
            official_token: None,
            rate_limit_retries: 3,
            fallback_retry_after_secs: 60,
        }
    }
}

impl std::fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("enable_sayobot", &self.enable_sayobot)
            .field("enable_catboy", &self.enable_catboy)
            .field("enable_nerinyan", &self.enable_nerinyan)
            .field("enable_official", &self.enable_official)
            .field("sayobot_server", &self.sayobot_server)
            .field(
                "official_token",
                &self.official_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limit_retries", &self.rate_limit_retries)
            .field("fallback_retry_after_secs", &self.fallback_retry_after_secs)
            .finish()
    }
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<()> {
        let official_usable = self.enable_official && self.official_token.is_some();
        if !(self.enable_sayobot || self.enable_catboy || self.enable_nerinyan || official_usable) {
            return Err(Error::Config(
                "At least one mirror must be enabled. Set mirrors.enable_sayobot, enable_catboy, enable_nerinyan, or enable_official with official_token."
                    .to_string(),
            ));
        }
        if self.enable_official && self.official_token.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(
                "mirrors.enable_official requires mirrors.official_token".to_string(),
            ));
        }
        if self.sayobot_server.trim().is_empty() {
            return Err(Error::Config(
                "mirrors.sayobot_server cannot be empty. Use \"auto\" for the default server."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the ledger is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Json,
    Sqlite,
}

/// Ledger location, checkpoint sharding and retry pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub ledger_path: PathBuf,
    pub ledger_backend: LedgerBackend,
    pub checkpoint_dir: PathBuf,
    /// Number of checkpoint files a work list is split into.
    pub shards: usize,
    /// Pause between passes while a retry batch is non-empty.
    pub retry_backoff_secs: u64,
    /// Permanent failures tolerated per unit before it is abandoned. 0 never abandons.
    pub max_permanent_failures: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("metadata.json"),
            ledger_backend: LedgerBackend::Json,
            checkpoint_dir: PathBuf::from("checkpoints"),
            shards: 1,
            retry_backoff_secs: 60,
            max_permanent_failures: 3,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ledger_path.as_os_str().is_empty() {
            return Err(Error::Config("run.ledger_path cannot be empty".to_string()));
        }
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "run.checkpoint_dir cannot be empty".to_string(),
            ));
        }
        if self.shards == 0 {
            return Err(Error::Config(
                "run.shards must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CoreConfig
// ============================================================================

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.general.max_concurrency == 0 || self.general.max_concurrency > MAX_CONCURRENCY_LIMIT
        {
            return Err(Error::Config(format!(
                "general.max_concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY_LIMIT, self.general.max_concurrency
            )));
        }
        if self.general.upload_multiple == 0 || self.general.upload_multiple > MAX_UPLOAD_MULTIPLE
        {
            return Err(Error::Config(format!(
                "general.upload_multiple must be between 1 and {}, got {}",
                MAX_UPLOAD_MULTIPLE, self.general.upload_multiple
            )));
        }

        self.paths.validate()?;
        self.mirrors.validate()?;
        self.run.validate()?;
        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
    unknown_variants: Vec<String>,
}

impl CoreConfigBuilder {
    /// Start from an existing (e.g. deserialized) configuration.
    pub fn from_config(config: CoreConfig) -> Self {
        Self {
            config,
            unknown_variants: Vec::new(),
        }
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.config.general.max_concurrency = value;
        self
    }

    pub fn upload_multiple(mut self, value: usize) -> Self {
        self.config.general.upload_multiple = value;
        self
    }

    pub fn paths(mut self, paths: PathsConfig) -> Self {
        self.config.paths = paths;
        self
    }

    pub fn variants(mut self, variants: VariantsConfig) -> Self {
        self.config.variants = variants;
        self
    }

    /// Enable one variant by name; unknown names fail at `build()`.
    pub fn enable_variant(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.config.variants.enable(&name).is_err() {
            self.unknown_variants.push(name);
        }
        self
    }

    pub fn mirrors(mut self, mirrors: MirrorConfig) -> Self {
        self.config.mirrors = mirrors;
        self
    }

    pub fn official_token(mut self, token: impl Into<String>) -> Self {
        self.config.mirrors.official_token = Some(token.into());
        self.config.mirrors.enable_official = true;
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.run.ledger_path = path.into();
        self
    }

    pub fn ledger_backend(mut self, backend: LedgerBackend) -> Self {
        self.config.run.ledger_backend = backend;
        self
    }

    pub fn checkpoint_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.run.checkpoint_dir = path.into();
        self
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.config.run.shards = shards;
        self
    }

    pub fn retry_backoff_secs(mut self, secs: u64) -> Self {
        self.config.run.retry_backoff_secs = secs;
        self
    }

    pub fn max_permanent_failures(mut self, limit: u32) -> Self {
        self.config.run.max_permanent_failures = limit;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variant name is unknown or any section
    /// fails validation.
    pub fn build(self) -> Result<CoreConfig> {
        if let Some(name) = self.unknown_variants.first() {
            return Err(Error::Config(format!(
                "Unknown variant '{}'. Use one of: mini, no_video, no_storyboard, no_hit_sound, no_background.",
                name
            )));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
