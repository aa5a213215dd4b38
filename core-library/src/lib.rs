//! # Archive Ledger
//!
//! Owns the record of which beatmapsets have been mirrored, in which
//! variants, and where.
//!
//! ## Overview
//!
//! This crate provides:
//! - Catalog entities ([`models`]) with their derived set-level flags
//! - The [`MetadataLedger`](ledger::MetadataLedger) and its newer-wins merge
//! - Grouping of raw catalog observations into sets
//! - Persistence through the [`LedgerStore`](repositories::LedgerStore) trait,
//!   backed by a JSON document or SQLite tables

pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use ledger::{group_catalog_entries, CatalogDelta, MergeOutcome, MetadataLedger};
pub use models::{BeatmapEntry, BeatmapStatus, BeatmapsetEntry, GameMode, VariantMap};
pub use repositories::{JsonLedgerStore, LedgerStore, SqliteLedgerStore};
