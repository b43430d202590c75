use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type")]
pub enum ClientInboundMessage {
    /// First message a client must send: who it listens on behalf of.
    /// Authentication happens in the fronting layer; the engine trusts the id.
    #[serde(rename = "identification")]
    Identification {
        /// User this connection belongs to.
        user_id: Uuid,
    },
    /// Anything unrecognized; connections are listen-only past identification.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, ToSchema)]
/// Positive acknowledgement sent to a client after successful identification.
pub struct ClientAck {
    /// Identifier assigned to this connection.
    pub connection_id: Uuid,
    /// User the connection was registered for.
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
/// Outbound frame wrapping a lifecycle event for WebSocket delivery.
pub struct PushFrame<'a> {
    /// Event name, when the payload is a named event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'a str>,
    /// Event payload.
    pub data: &'a serde_json::Value,
}
