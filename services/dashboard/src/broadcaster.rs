//! Per-viewer fan-out of ingestion events.
//!
//! Every subscriber owns an unbounded queue, so a publish never waits on a
//! viewer. A subscriber whose receiving half has been dropped is removed the
//! next time anything is published.
//!
//! `Broadcaster` itself is not synchronized. It lives inside
//! [`EventStore`](crate::event_store::EventStore), which drives it under the
//! same lock that guards the history.

use crate::event_store::IngestionEvent;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<IngestionEvent>,
}

/// Registry of live subscribers
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber that receives every event published from now on.
    pub fn register(&mut self) -> LiveEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, tx });

        debug!(subscriber_id = id, subscribers = self.subscribers.len(), "Viewer subscribed");

        LiveEvents { id, rx }
    }

    /// Deliver an event to every subscriber, dropping the ones that are gone.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&mut self, event: &IngestionEvent) -> usize {
        self.subscribers.retain(|sub| match sub.tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!(subscriber_id = sub.id, "Viewer disconnected, removing subscriber");
                false
            }
        });

        trace!(delivered = self.subscribers.len(), "Event published");
        self.subscribers.len()
    }

    /// Remove subscribers whose receiver was dropped.
    pub fn prune_closed(&mut self) {
        self.subscribers.retain(|sub| !sub.tx.is_closed());
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Receiving half of a subscription.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct LiveEvents {
    id: u64,
    rx: mpsc::UnboundedReceiver<IngestionEvent>,
}

impl LiveEvents {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the store has been dropped.
    pub async fn recv(&mut self) -> Option<IngestionEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<IngestionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for LiveEvents {
    type Item = IngestionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(name: &str) -> IngestionEvent {
        IngestionEvent::new(Utc::now(), format!("/uploads/{}", name))
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut broadcaster = Broadcaster::new();
        let mut a = broadcaster.register();
        let mut b = broadcaster.register();

        assert_eq!(broadcaster.publish(&event("1.jpg")), 2);
        assert_eq!(broadcaster.publish(&event("2.jpg")), 2);

        for live in [&mut a, &mut b] {
            assert_eq!(live.try_recv().unwrap().image_url, "/uploads/1.jpg");
            assert_eq!(live.try_recv().unwrap().image_url, "/uploads/2.jpg");
            assert!(live.try_recv().is_none());
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut broadcaster = Broadcaster::new();
        let mut kept = broadcaster.register();
        let gone = broadcaster.register();
        assert_ne!(kept.id(), gone.id());
        drop(gone);

        assert_eq!(broadcaster.publish(&event("1.jpg")), 1);
        assert_eq!(broadcaster.len(), 1);
        assert!(kept.try_recv().is_some());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let mut broadcaster = Broadcaster::new();
        assert!(broadcaster.is_empty());
        assert_eq!(broadcaster.publish(&event("1.jpg")), 0);
    }

    #[test]
    fn test_prune_closed() {
        let mut broadcaster = Broadcaster::new();
        let live = broadcaster.register();
        drop(live);
        broadcaster.prune_closed();
        assert!(broadcaster.is_empty());
    }

    #[tokio::test]
    async fn test_live_events_as_stream() {
        use futures::StreamExt;

        let mut broadcaster = Broadcaster::new();
        let mut live = broadcaster.register();
        broadcaster.publish(&event("a.jpg"));
        broadcaster.publish(&event("b.jpg"));
        drop(broadcaster);

        let urls: Vec<String> = (&mut live).map(|e| e.image_url).collect().await;
        assert_eq!(urls, vec!["/uploads/a.jpg", "/uploads/b.jpg"]);
    }
}
