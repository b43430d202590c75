//! WebSocket connection lifecycle for player clients.
//!
//! Clients identify themselves with a first message carrying their user id,
//! then only listen: lifecycle events flow out through the registered
//! connection until the socket closes.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientAck, ClientInboundMessage},
    state::{ClientConnection, SharedState},
};

/// Handle the full lifecycle for an individual client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ident_timeout = state.config().identification_timeout();
    let initial_message = match tokio::time::timeout(ident_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let user_id = match serde_json::from_str::<ClientInboundMessage>(&initial_message) {
        Ok(ClientInboundMessage::Identification { user_id }) => user_id,
        Ok(_) => {
            warn!("first websocket message was not an identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    state.clients().register(ClientConnection {
        id: connection_id,
        user_id,
        tx: outbound_tx.clone(),
    });
    info!(
        %user_id,
        %connection_id,
        total = state.clients().connection_count(),
        "client connected"
    );

    send_ack(&outbound_tx, connection_id, user_id);

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Text(text)) => {
                // Connections are listen-only after identification.
                warn!(%user_id, payload = %text, "ignoring unexpected client message");
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.clients().unregister(connection_id);
    info!(%user_id, %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize the identification acknowledgement onto the writer channel.
fn send_ack(tx: &mpsc::UnboundedSender<Message>, connection_id: Uuid, user_id: Uuid) {
    let ack = ClientAck {
        connection_id,
        user_id,
    };
    match serde_json::to_string(&ack) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize identification ack"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
