//! The transport seam.
//!
//! The session consumes a persistent, ordered, text-frame transport through
//! these two traits and never touches sockets itself. [`crate::ws::WsConnector`]
//! is the default implementation; tests substitute a scripted one.

use async_trait::async_trait;
use roomlink_core::{ConnectionParameters, TransportError};
use tokio::sync::mpsc;

/// Everything the transport reports after a successful connect.
#[derive(Debug)]
pub enum TransportEvent {
    /// One UTF-8 text frame.
    Message(String),
    /// The remote closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// Write half of an established connection.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    async fn close(&mut self);
}

/// Opens connections. `Ok` doubles as the "channel open" signal; the
/// returned receiver delivers every later transport event in order.
#[async_trait]
pub trait SignalingConnector: Send + 'static {
    type Writer: TransportWriter;

    async fn connect(
        &mut self,
        params: &ConnectionParameters,
    ) -> Result<(Self::Writer, mpsc::Receiver<TransportEvent>), TransportError>;
}
