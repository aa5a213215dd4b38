//! # OneDrive Provider
//!
//! Implements `RemoteStore` over the Microsoft Graph API.
//!
//! ## Overview
//!
//! This module provides:
//! - Item lookup by drive path
//! - Resumable uploads in 10 MiB chunks, with Graph's retry guidance
//! - Anonymous share links rewritten to direct-download URLs
//! - QuickXorHash fingerprints for skip-if-unchanged uploads
//!
//! Token acquisition is left to the host.

pub mod connector;
pub mod error;
pub mod quickxor;
pub mod types;

pub use connector::OneDriveConnector;
pub use error::{OneDriveError, Result};
pub use quickxor::{quick_xor_hash, QuickXorHash};
