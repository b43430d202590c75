use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::dto::{events::ServerEvent, ws::PushFrame};

/// Handle used to push messages to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Identifier of this connection.
    pub id: Uuid,
    /// User the connection listens on behalf of.
    pub user_id: Uuid,
    /// Sender feeding the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Boundary through which lifecycle transitions reach connected clients.
///
/// The engine never talks to sockets directly; it resolves a user to
/// connection ids and pushes an event per connection. Tests inject a
/// recording implementation.
pub trait NotificationGateway: Send + Sync {
    /// Live connection ids for a user; empty when the user is offline.
    fn connections_for(&self, user_id: Uuid) -> Vec<Uuid>;
    /// Push an event to one connection. Returns whether the event was queued.
    fn push(&self, connection_id: Uuid, event: &ServerEvent) -> bool;
}

/// Registry of live WebSocket connections, indexed both ways.
#[derive(Default)]
pub struct ClientHub {
    connections: DashMap<Uuid, ClientConnection>,
    by_user: DashMap<Uuid, HashSet<Uuid>>,
}

impl ClientHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly identified connection.
    pub fn register(&self, connection: ClientConnection) {
        self.by_user
            .entry(connection.user_id)
            .or_default()
            .insert(connection.id);
        self.connections.insert(connection.id, connection);
    }

    /// Drop a connection from both indexes; safe to call twice.
    pub fn unregister(&self, connection_id: Uuid) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };
        if let Some(mut set) = self.by_user.get_mut(&connection.user_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                drop(set);
                self.by_user
                    .remove_if(&connection.user_id, |_, set| set.is_empty());
            }
        }
    }

    /// Number of live connections, used by logs and tests.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl NotificationGateway for ClientHub {
    fn connections_for(&self, user_id: Uuid) -> Vec<Uuid> {
        self.by_user
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn push(&self, connection_id: Uuid, event: &ServerEvent) -> bool {
        let Some(connection) = self.connections.get(&connection_id) else {
            return false;
        };
        let tx = connection.tx.clone();
        drop(connection);

        let frame = PushFrame {
            event: event.event.as_deref(),
            data: &event.data,
        };
        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize push frame");
                return false;
            }
        };

        if tx.send(Message::Text(payload.into())).is_err() {
            // Writer task is gone; the socket handler cleans up on exit, but
            // drop the registration now so fan-outs stop selecting it.
            self.unregister(connection_id);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(user_id: Uuid) -> (ClientConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ClientConnection {
                id: Uuid::new_v4(),
                user_id,
                tx,
            },
            rx,
        )
    }

    #[test]
    fn register_and_resolve_connections() {
        let hub = ClientHub::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = connection(user);
        let (second, _rx2) = connection(user);
        hub.register(first.clone());
        hub.register(second.clone());

        let mut resolved = hub.connections_for(user);
        resolved.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(resolved, expected);

        hub.unregister(first.id);
        assert_eq!(hub.connections_for(user), vec![second.id]);
        hub.unregister(second.id);
        assert!(hub.connections_for(user).is_empty());
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn push_delivers_an_envelope() {
        let hub = ClientHub::new();
        let user = Uuid::new_v4();
        let (conn, mut rx) = connection(user);
        hub.register(conn.clone());

        let event = ServerEvent::json(Some("quest.assigned".to_string()), &serde_json::json!({
            "team_xp": 10,
        }))
        .unwrap();
        assert!(hub.push(conn.id, &event));

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "quest.assigned");
        assert_eq!(value["data"]["team_xp"], 10);
    }

    #[test]
    fn push_to_closed_writer_unregisters() {
        let hub = ClientHub::new();
        let user = Uuid::new_v4();
        let (conn, rx) = connection(user);
        hub.register(conn.clone());
        drop(rx);

        let event = ServerEvent::json(None, &serde_json::json!({})).unwrap();
        assert!(!hub.push(conn.id, &event));
        assert!(hub.connections_for(user).is_empty());
    }
}
