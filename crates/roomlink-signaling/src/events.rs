use roomlink_core::GatewayId;
use serde_json::Value;

/// Lifecycle notifications delivered to the owning application.
///
/// Identifiers and payloads are passed by value; the session's internal
/// tables are never exposed.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The local publisher handle joined the room; media setup can begin.
    PublisherJoined { handle_id: GatewayId },
    /// The gateway attached a remote session description to this handle.
    RemoteOffer { handle_id: GatewayId, jsep: Value },
    /// The handle is gone. Fired before the `detach` request goes out so the
    /// UI stops rendering immediately.
    Left { handle_id: GatewayId },
    /// A recording configure request completed.
    RecordingChanged { handle_id: GatewayId, active: bool },
    /// The transport closed.
    ChannelClosed,
    /// Terminal session failure; no protocol traffic follows.
    ChannelError { message: String },
}
