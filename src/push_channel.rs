//! Push channel registry
//!
//! Tracks every connected WebSocket client and fans server events out to
//! them. Delivery is best-effort: a message is queued at most once per open
//! client, never retried, and never acknowledged.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::StoryError;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Server-initiated messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushMessage {
    ClearStory,
}

struct ClientEntry {
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<PushMessage>,
}

/// Concurrency-safe set of push channel clients.
#[derive(Default)]
pub struct ChannelRegistry {
    clients: RwLock<HashMap<Uuid, ClientEntry>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client in the `Connecting` state. The receiver yields what
    /// broadcasts queue for it.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<PushMessage>) {
        let id = Uuid::new_v4();
        let (outbound, rx) = mpsc::unbounded_channel();
        let mut clients = self.clients.write().await;
        clients.insert(
            id,
            ClientEntry {
                state: ConnectionState::Connecting,
                outbound,
            },
        );
        (id, rx)
    }

    pub async fn set_state(&self, id: Uuid, state: ConnectionState) {
        if let Some(entry) = self.clients.write().await.get_mut(&id) {
            entry.state = state;
        }
    }

    pub async fn unregister(&self, id: Uuid) {
        self.clients.write().await.remove(&id);
    }

    pub async fn state(&self, id: Uuid) -> Option<ConnectionState> {
        self.clients.read().await.get(&id).map(|e| e.state)
    }

    /// Queue `message` for every open client; connecting and closed clients
    /// are skipped. Returns how many clients it was queued for.
    pub async fn broadcast(&self, message: PushMessage) -> usize {
        let clients = self.clients.read().await;
        let mut delivered = 0;

        for (id, entry) in clients.iter() {
            if entry.state != ConnectionState::Open {
                continue;
            }
            match entry.outbound.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let err = StoryError::ChannelSend {
                        reason: e.to_string(),
                    };
                    tracing::debug!(client = %id, error = %err, "Skipping gone push client");
                }
            }
        }

        tracing::debug!(?message, delivered, "Broadcast push message");
        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn open_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|e| e.state == ConnectionState::Open)
            .count()
    }

    /// Drop every client. Their socket tasks see the outbound queue end and
    /// close the connection.
    pub async fn close_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        tracing::info!(count, "Closed push channel clients");
    }
}

/// Drive one accepted WebSocket until either side hangs up.
pub async fn serve_socket(socket: WebSocket, registry: std::sync::Arc<ChannelRegistry>) {
    let (id, mut outbound) = registry.register().await;
    let (mut sink, mut stream) = socket.split();

    registry.set_state(id, ConnectionState::Open).await;
    tracing::debug!(client = %id, "Push client connected");

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode push message");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // clients have nothing to say on this channel yet
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    registry.set_state(id, ConnectionState::Closed).await;
    registry.unregister(id).await;
    tracing::debug!(client = %id, "Push client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_story_wire_format() {
        let json = serde_json::to_string(&PushMessage::ClearStory).unwrap();
        assert_eq!(json, r#"{"type":"clearStory"}"#);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_open_clients() {
        let registry = ChannelRegistry::new();

        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        let (c, mut rx_c) = registry.register().await;
        let (_d, mut rx_d) = registry.register().await;
        registry.set_state(a, ConnectionState::Open).await;
        registry.set_state(b, ConnectionState::Open).await;
        registry.set_state(c, ConnectionState::Closed).await;
        // the fourth stays Connecting

        let delivered = registry.broadcast(PushMessage::ClearStory).await;

        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), PushMessage::ClearStory);
        assert_eq!(rx_b.try_recv().unwrap(), PushMessage::ClearStory);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
        assert!(rx_d.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_dropped_receiver() {
        let registry = ChannelRegistry::new();
        let (a, rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        registry.set_state(a, ConnectionState::Open).await;
        registry.set_state(b, ConnectionState::Open).await;
        drop(rx_a);

        let delivered = registry.broadcast(PushMessage::ClearStory).await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_b.try_recv().unwrap(), PushMessage::ClearStory);
    }

    #[tokio::test]
    async fn test_unregister_and_close_all() {
        let registry = ChannelRegistry::new();
        let (a, _rx_a) = registry.register().await;
        let (_b, mut rx_b) = registry.register().await;
        assert_eq!(registry.client_count().await, 2);
        assert_eq!(registry.state(a).await, Some(ConnectionState::Connecting));

        registry.unregister(a).await;
        assert_eq!(registry.client_count().await, 1);
        assert_eq!(registry.state(a).await, None);

        registry.close_all().await;
        assert_eq!(registry.client_count().await, 0);
        assert!(rx_b.recv().await.is_none());
    }
}
