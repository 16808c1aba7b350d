use crate::broadcaster::{Broadcaster, LiveEvents};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One accepted upload, as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionEvent {
    /// Arrival time of the upload
    pub timestamp: DateTime<Utc>,
    /// URL path of the stored image
    pub image_url: String,
}

impl IngestionEvent {
    pub fn new(timestamp: DateTime<Utc>, image_url: impl Into<String>) -> Self {
        Self {
            timestamp,
            image_url: image_url.into(),
        }
    }
}

/// History snapshot plus the live feed that continues it
#[derive(Debug)]
pub struct Subscription {
    /// Every event appended before the subscription, in order
    pub replay: Vec<IngestionEvent>,
    /// Every event appended after it
    pub live: LiveEvents,
}

struct StoreState {
    history: Vec<IngestionEvent>,
    broadcaster: Broadcaster,
}

/// Append-only event history with real-time fan-out.
///
/// One instance exists per process. History and subscriber registry sit behind
/// a single lock, so a subscriber sees each event either in its replay or on
/// its live feed, exactly once.
pub struct EventStore {
    state: Mutex<StoreState>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                history: Vec::new(),
                broadcaster: Broadcaster::new(),
            }),
        }
    }

    /// Append an event and publish it to every live subscriber.
    ///
    /// Returns the number of viewers the event was queued for.
    pub fn append(&self, event: IngestionEvent) -> usize {
        let mut state = self.state.lock();
        let delivered = state.broadcaster.publish(&event);
        state.history.push(event);

        debug!(
            history_len = state.history.len(),
            viewers = delivered,
            "Event appended"
        );

        delivered
    }

    /// Copy of the full history in arrival order
    pub fn snapshot(&self) -> Vec<IngestionEvent> {
        self.state.lock().history.clone()
    }

    /// Take a history snapshot and start receiving later events.
    pub fn subscribe(&self) -> Subscription {
        let mut state = self.state.lock();
        let live = state.broadcaster.register();
        Subscription {
            replay: state.history.clone(),
            live,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    /// Number of connected viewers
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.broadcaster.prune_closed();
        state.broadcaster.len()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}
