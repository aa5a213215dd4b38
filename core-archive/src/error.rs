use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The input bytes are not a readable zip container.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the output container failed.
    #[error("Failed to write container: {0}")]
    Write(String),
}

impl ArchiveError {
    /// Retrying the same bytes cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ArchiveError::MalformedContainer(_))
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
