//! Per-session registry of live WebSocket connections and event fan-out.

use std::collections::HashMap;

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

#[derive(Clone)]
/// Handle used to push messages to one connected client.
pub struct ClientConnection {
    /// Unique identifier of the socket.
    pub id: Uuid,
    /// Participant the socket announced itself as, if any.
    pub participant_id: Option<String>,
    /// Outbound channel drained by the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ClientConnection {
    /// Build a handle with a fresh identifier.
    pub fn new(participant_id: Option<String>, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_id,
            tx,
        }
    }
}

/// Connections grouped by session code.
///
/// Guarded by its own lock so broadcasts never contend with the session store.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_code: RwLock<HashMap<String, HashMap<Uuid, ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection to `code`.
    pub async fn register(&self, code: &str, connection: ClientConnection) {
        let mut guard = self.by_code.write().await;
        debug!(code = %code, connection = %connection.id, "connection registered");
        guard
            .entry(code.to_string())
            .or_default()
            .insert(connection.id, connection);
    }

    /// Detach a connection; drops the code entry once it has no connections left.
    pub async fn unregister(&self, code: &str, connection_id: Uuid) {
        let mut guard = self.by_code.write().await;
        if let Some(connections) = guard.get_mut(code) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                guard.remove(code);
            }
        }
    }

    /// Send a close frame to every connection of `code` and forget them.
    ///
    /// Returns how many connections were dropped.
    pub async fn disconnect_all(&self, code: &str) -> usize {
        let removed = self.by_code.write().await.remove(code).unwrap_or_default();
        for connection in removed.values() {
            let _ = connection.tx.send(Message::Close(None));
        }
        removed.len()
    }

    /// Number of live connections attached to `code`.
    pub async fn connection_count(&self, code: &str) -> usize {
        let guard = self.by_code.read().await;
        guard.get(code).map_or(0, HashMap::len)
    }

    /// Deliver `message` to every connection of `code`.
    ///
    /// The message is serialized once. Connections whose writer is gone are
    /// logged and pruned; the others still receive the message. Returns the
    /// number of successful deliveries.
    pub async fn broadcast(&self, code: &str, message: &ServerMessage) -> usize {
        let Some(payload) = encode(message) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let guard = self.by_code.read().await;
            let Some(connections) = guard.get(code) else {
                return 0;
            };
            for connection in connections.values() {
                if connection
                    .tx
                    .send(Message::Text(payload.clone().into()))
                    .is_ok()
                {
                    delivered += 1;
                } else {
                    warn!(
                        code = %code,
                        connection = %connection.id,
                        participant = ?connection.participant_id,
                        event = message.kind(),
                        "failed to deliver event; pruning connection"
                    );
                    dead.push(connection.id);
                }
            }
        }

        for id in dead {
            self.unregister(code, id).await;
        }

        delivered
    }

    /// Deliver `message` to a single connection of `code`.
    ///
    /// Returns `false` when the connection is unknown or its writer is gone.
    pub async fn send_to(&self, code: &str, connection_id: Uuid, message: &ServerMessage) -> bool {
        let tx = {
            let guard = self.by_code.read().await;
            guard
                .get(code)
                .and_then(|connections| connections.get(&connection_id))
                .map(|connection| connection.tx.clone())
        };
        let Some(tx) = tx else {
            return false;
        };

        match encode(message) {
            Some(payload) => tx.send(Message::Text(payload.into())).is_ok(),
            None => false,
        }
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, event = message.kind(), "failed to serialize event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_owned(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection_of_the_code() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        registry.register("ABCD1234", ClientConnection::new(None, tx_a)).await;
        registry
            .register("ABCD1234", ClientConnection::new(Some("p1".into()), tx_b))
            .await;
        registry
            .register("FFFF0000", ClientConnection::new(None, tx_other))
            .await;

        let delivered = registry
            .broadcast("ABCD1234", &ServerMessage::TimeUpdate { time_remaining: 3 })
            .await;
        assert_eq!(delivered, 2);

        let expected = r#"{"type":"time_update","payload":{"time_remaining":3}}"#;
        assert_eq!(text(rx_a.recv().await.unwrap()), expected);
        assert_eq!(text(rx_b.recv().await.unwrap()), expected);
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_connections_are_pruned_without_affecting_others() {
        let registry = ConnectionRegistry::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        registry.register("CODE", ClientConnection::new(None, tx_live)).await;
        registry.register("CODE", ClientConnection::new(None, tx_dead)).await;
        drop(rx_dead);

        let delivered = registry
            .broadcast("CODE", &ServerMessage::TimeUpdate { time_remaining: 1 })
            .await;
        assert_eq!(delivered, 1);
        assert!(rx_live.recv().await.is_some());
        assert_eq!(registry.connection_count("CODE").await, 1);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_code_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let delivered = registry
            .broadcast("NOPE", &ServerMessage::TimeUpdate { time_remaining: 1 })
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let target = ClientConnection::new(None, tx_a);
        let target_id = target.id;
        registry.register("CODE", target).await;
        registry.register("CODE", ClientConnection::new(None, tx_b)).await;

        assert!(
            registry
                .send_to("CODE", target_id, &ServerMessage::TimeUpdate { time_remaining: 9 })
                .await
        );
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
        assert!(
            !registry
                .send_to("CODE", Uuid::new_v4(), &ServerMessage::TimeUpdate { time_remaining: 9 })
                .await
        );
    }

    #[tokio::test]
    async fn disconnect_all_closes_every_socket() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("CODE", ClientConnection::new(None, tx)).await;

        assert_eq!(registry.disconnect_all("CODE").await, 1);
        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert_eq!(registry.connection_count("CODE").await, 0);
        assert_eq!(registry.disconnect_all("CODE").await, 0);
    }

    #[tokio::test]
    async fn unregister_drops_empty_codes() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ClientConnection::new(None, tx);
        let id = connection.id;
        registry.register("CODE", connection).await;

        registry.unregister("CODE", id).await;
        assert_eq!(registry.connection_count("CODE").await, 0);
        assert!(registry.by_code.read().await.is_empty());
    }
}
