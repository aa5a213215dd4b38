//! # Sync Pipeline
//!
//! Moves beatmapsets from download mirrors into the remote store.
//!
//! ## Overview
//!
//! One call to [`SyncOrchestrator::sync_batch`] is one pass:
//! - Downloading each set from a rotating mirror
//! - Holding downloaded sets behind a backpressure gate
//! - Rendering the full archive and every enabled derived variant
//! - Uploading variants the remote store does not already hold
//! - Merging synced sets into the metadata ledger
//! - Returning failed units as the next pass's retry batch
//!
//! ## Components
//!
//! - **Work Units** (`unit`): Per-set state machine, retry batch and pass report
//! - **Sync Orchestrator** (`orchestrator`): Download and upload pools, failure isolation
//! - **Upload Gate** (`gate`): In-flight cap between the two pools
//! - **Variant Plan** (`variants`): Which variants a set needs
//! - **Remote Layout** (`layout`): Folder and file naming in the remote store
//! - **Checkpoints** (`checkpoint`): Work list shards for resumable workers

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod gate;
pub mod layout;
pub mod orchestrator;
pub mod unit;
pub mod variants;

pub use checkpoint::{split_into_shards, CheckpointStore};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use gate::{InFlight, UploadGate};
pub use layout::RemoteLayout;
pub use orchestrator::SyncOrchestrator;
pub use unit::{FailureKind, PassReport, RetryBatch, UnitState, WorkUnit};
pub use variants::{Variant, VariantPlan};
