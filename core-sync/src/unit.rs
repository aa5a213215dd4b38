//! # Work Units
//!
//! A work unit is one beatmapset queued for a sync pass, plus the
//! bookkeeping the pass runner needs across passes.
//!
//! ## State Machine
//!
//! ```text
//! Pending ──> Downloading ──> AwaitingUploadSlot ──> Uploading ──> Done
//!    │             │                  │                  │
//!    │             └──────────────────┴──────────────────┴──────> Failed
//!    └──> Skipped
//! ```
//!
//! `Done`, `Failed` and `Skipped` are terminal. The state is ephemeral: it
//! is never written to checkpoints, and a unit read back from disk always
//! starts in `Pending`.

use core_library::BeatmapsetEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};

// ============================================================================
// Unit State
// ============================================================================

/// Position of a work unit in the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UnitState {
    #[default]
    Pending,
    Downloading,
    /// Downloaded; waiting for the backpressure gate.
    AwaitingUploadSlot,
    Uploading,
    Done,
    Failed,
    /// The catalog flags the set as undownloadable.
    Skipped,
}

impl UnitState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed | UnitState::Skipped)
    }

    /// Whether the unit holds downloaded bytes that are not uploaded yet.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, UnitState::AwaitingUploadSlot | UnitState::Uploading)
    }

    pub fn can_transition_to(&self, to: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, to),
            (Pending, Downloading)
                | (Pending, Skipped)
                | (Downloading, AwaitingUploadSlot)
                | (Downloading, Failed)
                | (AwaitingUploadSlot, Uploading)
                | (AwaitingUploadSlot, Failed)
                | (Uploading, Done)
                | (Uploading, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Downloading => "downloading",
            UnitState::AwaitingUploadSlot => "awaiting_upload_slot",
            UnitState::Uploading => "uploading",
            UnitState::Done => "done",
            UnitState::Failed => "failed",
            UnitState::Skipped => "skipped",
        }
    }
}

impl FromStr for UnitState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(UnitState::Pending),
            "downloading" => Ok(UnitState::Downloading),
            "awaiting_upload_slot" => Ok(UnitState::AwaitingUploadSlot),
            "uploading" => Ok(UnitState::Uploading),
            "done" => Ok(UnitState::Done),
            "failed" => Ok(UnitState::Failed),
            "skipped" => Ok(UnitState::Skipped),
            other => Err(SyncError::Checkpoint(format!("unknown unit state '{}'", other))),
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Work Unit
// ============================================================================

/// A beatmapset queued for sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub set: BeatmapsetEntry,
    /// Permanent failures across all passes so far. Transient failures leave
    /// the count unchanged.
    #[serde(default)]
    pub permanent_failures: u32,
    #[serde(skip)]
    state: UnitState,
}

impl WorkUnit {
    pub fn new(set: BeatmapsetEntry) -> Self {
        Self {
            set,
            permanent_failures: 0,
            state: UnitState::Pending,
        }
    }

    pub fn id(&self) -> i64 {
        self.set.beatmapset_id
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Move to `to`, rejecting edges the state machine does not allow.
    pub fn transition(&mut self, to: UnitState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: format!("beatmapset {}", self.id()),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Mark the unit failed from whatever non-terminal state it reached.
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = UnitState::Failed;
        }
    }

    /// Return to `Pending` for the next pass.
    pub(crate) fn reset(&mut self) {
        self.state = UnitState::Pending;
    }
}

impl From<BeatmapsetEntry> for WorkUnit {
    fn from(set: BeatmapsetEntry) -> Self {
        Self::new(set)
    }
}

// ============================================================================
// Failure Classification
// ============================================================================

/// How a unit failure is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, rate limit, 5xx and anything unclassified.
    Transient,
    /// Content gone from the mirror or a corrupt container.
    Permanent,
    /// The run is shutting down.
    Cancelled,
}

impl FailureKind {
    pub fn classify(err: &SyncError) -> Self {
        if err.is_cancelled() {
            FailureKind::Cancelled
        } else if err.is_permanent() {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        }
    }
}

// ============================================================================
// Retry Batch & Pass Report
// ============================================================================

/// Units to hand to the next pass, in the order they were given to this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryBatch {
    units: Vec<WorkUnit>,
}

impl RetryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.units.iter().map(WorkUnit::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkUnit> {
        self.units.iter()
    }

    pub fn into_units(self) -> Vec<WorkUnit> {
        self.units
    }
}

impl FromIterator<WorkUnit> for RetryBatch {
    fn from_iter<I: IntoIterator<Item = WorkUnit>>(iter: I) -> Self {
        Self {
            units: iter
                .into_iter()
                .map(|mut unit| {
                    unit.reset();
                    unit
                })
                .collect(),
        }
    }
}

/// Outcome of one `sync_batch` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// 1-based pass number within the orchestrator's lifetime.
    pub pass: u32,
    pub synced: Vec<i64>,
    pub skipped: Vec<i64>,
    /// Units that hit the permanent-failure limit, with the last error.
    pub abandoned: Vec<(i64, String)>,
    /// Units that were attempted and failed this pass.
    pub failed: usize,
    pub retry: RetryBatch,
    pub cancelled: bool,
}
