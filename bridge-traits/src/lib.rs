//! # Host Bridge Traits
//!
//! Capability traits the archive core depends on but does not implement.
//!
//! ## Overview
//!
//! The sync pipeline never talks to the network or the disk directly. Every
//! side effect goes through one of the traits below so the desktop host can
//! plug in real adapters and tests can plug in mocks.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry and redirect control
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Ledger and checkpoint files
//!
//! ### Archive endpoints
//! - [`MirrorDownloader`](mirror::MirrorDownloader) - Source of beatmapset archives
//! - [`RemoteStore`](storage::RemoteStore) - Destination object store
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Implementations
//!
//! | Trait | Crate |
//! |-------|-------|
//! | `HttpClient`, `FileSystemAccess` | `bridge-desktop` |
//! | `MirrorDownloader` | `provider-mirrors` |
//! | `RemoteStore` | `provider-onedrive` |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). The variant
//! carries the retry class: `NotAvailable` is permanent for the item,
//! `RateLimited`, `OperationFailed` and `Io` are transient, and `Cancelled`
//! means the run is shutting down.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so one adapter can be shared
//! across worker tasks.

pub mod error;
pub mod http;
pub mod mirror;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use mirror::MirrorDownloader;
pub use storage::{FileSystemAccess, RemoteItem, RemoteStore};
pub use time::{Clock, LogLevel, SystemClock};
