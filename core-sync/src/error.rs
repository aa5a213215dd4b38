use bridge_traits::BridgeError;
use core_archive::ArchiveError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the failure counts as a permanent strike against the unit.
    pub fn is_permanent(&self) -> bool {
        match self {
            SyncError::Bridge(BridgeError::NotAvailable(_)) => true,
            SyncError::Archive(err) => err.is_permanent(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled | SyncError::Bridge(BridgeError::Cancelled))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
