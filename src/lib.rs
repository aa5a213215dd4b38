//! Workspace entry crate.
//!
//! Exposes feature flags that map onto `core-service` so a host can depend on
//! `beatmap-archive-workspace` alone. `desktop-shims` (default) enables the
//! desktop bootstrap; `sqlite-ledger` adds the SQLite ledger backend.

#[cfg(feature = "desktop-shims")]
pub use core_service::bootstrap_desktop;

#[cfg(any(feature = "desktop-shims", feature = "sqlite-ledger"))]
pub use core_service::{ArchiveDependencies, ArchiveService, CoreError, Result, SyncReport};
