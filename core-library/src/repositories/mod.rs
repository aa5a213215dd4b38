//! # Ledger Persistence
//!
//! The orchestrator only ever sees the [`LedgerStore`] trait. Two stores are
//! provided:
//!
//! - [`JsonLedgerStore`] - one JSON document written through
//!   [`FileSystemAccess`](bridge_traits::FileSystemAccess)
//! - [`SqliteLedgerStore`] - relational tables behind an sqlx pool
//!
//! Both treat `save` as a full replacement of the stored ledger.

use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::MetadataLedger;

pub mod json;
pub mod sqlite;

pub use json::JsonLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Persistence collaborator for the metadata ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the stored ledger.
    ///
    /// # Returns
    /// - `Ok(Some(ledger))` if one was stored
    /// - `Ok(None)` if nothing has been saved yet
    async fn load(&self) -> Result<Option<MetadataLedger>>;

    /// Replace the stored ledger with `ledger`.
    async fn save(&self, ledger: &MetadataLedger) -> Result<()>;
}
