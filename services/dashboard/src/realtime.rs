//! Real-time dashboard channel.
//!
//! A viewer connecting to `/ws` first receives `initial_data` with the whole
//! history, then one `new_warning` per accepted upload. Frames are JSON text:
//!
//! ```text
//! {"event": "initial_data", "data": [{"timestamp": "...", "image_url": "/uploads/..."}]}
//! {"event": "new_warning",  "data": {"timestamp": "...", "image_url": "/uploads/..."}}
//! ```

use crate::api::AppState;
use crate::broadcaster::LiveEvents;
use crate::event_store::{EventStore, IngestionEvent, Subscription};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Messages pushed to dashboard viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full history, sent once on connect
    InitialData(Vec<IngestionEvent>),
    /// One newly accepted upload
    NewWarning(IngestionEvent),
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Upgrade handler for `/ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let store = state.ingestor.store().clone();
    ws.on_upgrade(move |socket| viewer_session(socket, store))
}

async fn viewer_session(socket: WebSocket, store: Arc<EventStore>) {
    let Subscription { replay, mut live } = store.subscribe();
    let viewer_id = live.id();
    let (mut sender, mut receiver) = socket.split();

    metrics::gauge!("dashboard.viewers").set(store.subscriber_count() as f64);
    info!(viewer_id, history_len = replay.len(), "Viewer connected, sending history");

    if send(&mut sender, &ServerMessage::InitialData(replay)).await.is_err() {
        debug!(viewer_id, "Viewer left before history was delivered");
        disconnect(&store, live);
        return;
    }

    loop {
        tokio::select! {
            event = live.recv() => {
                let Some(event) = event else { break };
                if send(&mut sender, &ServerMessage::NewWarning(event)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(viewer_id, error = %e, "Viewer socket error");
                        break;
                    }
                    // viewers never send anything we act on
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    disconnect(&store, live);
}

fn disconnect(store: &EventStore, live: LiveEvents) {
    let viewer_id = live.id();
    drop(live);
    let remaining = store.subscriber_count();
    metrics::gauge!("dashboard.viewers").set(remaining as f64);
    info!(viewer_id, remaining, "Viewer disconnected");
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize dashboard message");
            return Err(());
        }
    };
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
