//! # Content Filter Engine
//!
//! Produces the derived variants of a beatmapset container (`.osz`, a zip)
//! by dropping entries according to a [`FilterPolicy`].
//!
//! Every call builds a fresh [`ContainerIndex`] from the container's own
//! `.osu` and `.osb` scripts, then classifies each entry as video, storyboard
//! asset, background, or hit sample. Those predicates are independent; the
//! policy decides which combinations are dropped.
//!
//! ```rust,ignore
//! use core_archive::{process, FilterPolicy};
//!
//! let no_video = process(FilterPolicy::NoVideo, &osz_bytes)?;
//! ```

pub mod error;
pub mod filter;
pub mod index;
pub mod policy;
pub mod script;

pub use error::{ArchiveError, Result};
pub use filter::{entry_names, process};
pub use index::{ContainerIndex, EntryClass};
pub use policy::FilterPolicy;
pub use script::ScriptReferences;
