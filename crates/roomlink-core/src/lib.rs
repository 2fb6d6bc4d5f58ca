pub mod config;
pub mod errors;
pub mod ids;

pub use config::{ConnectionParameters, DEFAULT_SUBPROTOCOL, KEEP_ALIVE_INTERVAL};
pub use errors::{SignalingError, TransportError};
pub use ids::GatewayId;
