//! # Event Bus System
//!
//! Typed progress events for the archive pipeline, fanned out with
//! `tokio::sync::broadcast`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Orchestrator ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │ (broadcast│                  └────────────┘
//! │ Pass runner  ├──────────────>│  channel) │
//! └──────────────┘               └───────────┘
//! ```
//!
//! Emitting with no subscribers is not an error for the pipeline; callers
//! ignore the `SendError`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::UnitSkipped {
//!         set_id: 1,
//!         reason: "no audio".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Beatmapset skipped");
//! # }
//! ```

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Per-pass and per-unit pipeline progress
    Sync(SyncEvent),
    /// Ledger persistence and shard bookkeeping
    Ledger(LedgerEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Ledger(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::UnitAbandoned { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::UnitFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::PassCompleted { .. })
            | CoreEvent::Sync(SyncEvent::Cancelled { .. })
            | CoreEvent::Ledger(LedgerEvent::Saved { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while a pass moves units through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass was dispatched.
    PassStarted {
        /// 1-based pass number within the run.
        pass: u32,
        /// Number of work units handed to the pass.
        units: usize,
    },
    /// Every required variant of a set is uploaded and merged.
    UnitSynced {
        set_id: i64,
        /// Variant names that were uploaded or found up to date.
        variants: Vec<String>,
    },
    /// The set is known to be undownloadable and was not attempted.
    UnitSkipped { set_id: i64, reason: String },
    /// The unit failed and goes back to the retry batch.
    UnitFailed {
        set_id: i64,
        message: String,
        /// Whether the failure counted as a permanent strike.
        permanent: bool,
    },
    /// The unit hit its permanent-failure limit and will not be retried.
    UnitAbandoned { set_id: i64, reason: String },
    /// A pass drained all of its work.
    PassCompleted {
        pass: u32,
        synced: usize,
        skipped: usize,
        failed: usize,
        abandoned: usize,
    },
    /// The run observed cancellation.
    Cancelled {
        pass: u32,
        /// Units left unsynced.
        remaining: usize,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::PassStarted { .. } => "Sync pass started",
            SyncEvent::UnitSynced { .. } => "Beatmapset synced",
            SyncEvent::UnitSkipped { .. } => "Beatmapset skipped",
            SyncEvent::UnitFailed { .. } => "Beatmapset failed",
            SyncEvent::UnitAbandoned { .. } => "Beatmapset abandoned",
            SyncEvent::PassCompleted { .. } => "Sync pass completed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Ledger Events
// ============================================================================

/// Events about the persisted ledger and checkpoint shards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    /// The ledger was written to its store.
    Saved { sets: usize },
    /// A worker claimed a checkpoint shard.
    ShardClaimed { shard: usize, units: usize },
    /// A shard finished and its checkpoint was removed.
    ShardCompleted { shard: usize },
}

impl LedgerEvent {
    fn description(&self) -> &str {
        match self {
            LedgerEvent::Saved { .. } => "Ledger saved",
            LedgerEvent::ShardClaimed { .. } => "Shard claimed",
            LedgerEvent::ShardCompleted { .. } => "Shard completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for pipeline events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers falling behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::default();
/// let problems = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Ledger(LedgerEvent::ShardCompleted { shard: 1 });
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Sync(SyncEvent::PassStarted { pass: 1, units: 10 });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Warning);

        bus.emit(CoreEvent::Sync(SyncEvent::UnitSynced {
            set_id: 1,
            variants: vec!["full".to_string()],
        }))
        .ok();
        let failed = CoreEvent::Sync(SyncEvent::UnitFailed {
            set_id: 2,
            message: "HTTP 502 error".to_string(),
            permanent: false,
        });
        bus.emit(failed.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), failed);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::UnitAbandoned {
            set_id: 42,
            reason: "Content not available: 404".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Sync\""));
        assert!(json.contains("\"event\":\"UnitAbandoned\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.severity(), EventSeverity::Error);
    }
}
