//! Janus-style videoroom signaling client.
//!
//! Control-plane only: establishes a gateway session, joins a room as a
//! publisher, attaches subscriber handles for remote feeds as the gateway
//! announces them, and brokers SDP / ICE payloads between the media engine
//! and the gateway. Media transport, rendering, and capture live elsewhere;
//! SDP and candidate payloads pass through opaque.
//!
//! # Lifecycle
//!
//! ```text
//! 1. let (client, mut events) = RoomClient::spawn(WsConnector::default());
//! 2. client.connect(ConnectionParameters::new(url, room));
//!       └─ create → attach (publisher) → join, driven internally
//! 3. events: PublisherJoined / RemoteOffer / Left / ChannelError …
//! 4. client.publish_offer(handle, sdp);  client.trickle(handle, candidate);
//! 5. client.disconnect();  client.release();
//! ```
//!
//! All protocol logic runs on one spawned task. Public operations and
//! transport events funnel into that task's inbox, so the session state
//! needs no locks; callers never race with inbound dispatch.

pub mod client;
pub mod events;
pub mod handle;
pub mod protocol;
pub mod session;
pub mod transaction;
pub mod transport;
pub mod ws;

pub use client::RoomClient;
pub use events::RoomEvent;
pub use handle::{Handle, HandleRole, HandleTable};
pub use roomlink_core::{ConnectionParameters, GatewayId};
pub use session::{Session, SessionState};
pub use transport::{SignalingConnector, TransportEvent, TransportWriter};
pub use ws::WsConnector;
