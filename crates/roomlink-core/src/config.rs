use std::time::Duration;

use crate::ids::GatewayId;

/// Interval between fire-and-forget `keepalive` requests once connected.
/// The gateway reaps sessions after 60 s of silence; half that is safe.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// WebSocket subprotocol the gateway expects.
pub const DEFAULT_SUBPROTOCOL: &str = "janus-protocol";

/// Parameters for one gateway session, immutable for its lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    pub server_url: String,
    pub subprotocols: Vec<String>,
    pub room_id: GatewayId,
    pub display_name: Option<String>,
}

impl ConnectionParameters {
    pub fn new(server_url: impl Into<String>, room_id: impl Into<GatewayId>) -> Self {
        Self {
            server_url: server_url.into(),
            subprotocols: vec![DEFAULT_SUBPROTOCOL.to_string()],
            room_id: room_id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionParameters;
    use crate::ids::GatewayId;

    #[test]
    fn defaults_to_the_gateway_subprotocol() {
        let params = ConnectionParameters::new("wss://gw.example.org/ws", 1234u64)
            .with_display_name("alice");
        assert_eq!(params.subprotocols, vec!["janus-protocol"]);
        assert_eq!(params.room_id, GatewayId::from(1234));
        assert_eq!(params.display_name.as_deref(), Some("alice"));
    }
}
