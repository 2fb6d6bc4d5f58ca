use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed gateway frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Gateway error {code}: {reason}")]
    Gateway { code: i64, reason: String },
}
