//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the beatmap archive core:
//! - Logging and tracing setup
//! - Run configuration and validation
//! - Event bus for pipeline progress
//!
//! Other crates receive configuration values through their constructors; this
//! crate holds no global state apart from the tracing subscriber the host
//! installs once.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
