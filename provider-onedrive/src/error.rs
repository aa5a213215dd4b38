//! Error types for the OneDrive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// OneDrive provider errors
#[derive(Error, Debug)]
pub enum OneDriveError {
    /// Graph returned an error status
    #[error("Microsoft Graph API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// A resumable upload session could not be created or continued
    #[error("Upload session failed: {0}")]
    UploadSession(String),

    /// Failed to parse a Graph response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for OneDrive operations
pub type Result<T> = std::result::Result<T, OneDriveError>;

impl From<OneDriveError> for BridgeError {
    fn from(error: OneDriveError) -> Self {
        match error {
            OneDriveError::ApiError {
                status_code: 404,
                message,
            } => BridgeError::NotFound(message),
            OneDriveError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "Graph API error (status {}): {}",
                status_code, message
            )),
            OneDriveError::UploadSession(msg) => {
                BridgeError::OperationFailed(format!("Upload session failed: {}", msg))
            }
            OneDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            OneDriveError::Bridge(e) => e,
        }
    }
}
