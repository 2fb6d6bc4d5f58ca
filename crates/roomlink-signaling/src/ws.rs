//! WebSocket transport.
//!
//! Wraps `tokio-tungstenite` behind the [`SignalingConnector`] seam: one
//! connection per session, text frames only, with a spawned read loop
//! forwarding everything inbound as [`TransportEvent`]s.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use roomlink_core::{ConnectionParameters, TransportError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::transport::{SignalingConnector, TransportEvent, TransportWriter};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Backpressure bound for inbound transport events. The session drains fast;
/// this only smooths bursts.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Connects over `ws://` or `wss://` with the configured subprotocols.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl SignalingConnector for WsConnector {
    type Writer = WsWriter;

    async fn connect(
        &mut self,
        params: &ConnectionParameters,
    ) -> Result<(Self::Writer, mpsc::Receiver<TransportEvent>), TransportError> {
        let mut request = params
            .server_url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed {
                reason: e.to_string(),
            })?;
        if !params.subprotocols.is_empty() {
            let protocols = HeaderValue::from_str(&params.subprotocols.join(", ")).map_err(
                |e| TransportError::ConnectFailed {
                    reason: e.to_string(),
                },
            )?;
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocols);
        }

        let (stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    reason: e.to_string(),
                })?;
        debug!("websocket open: {}", params.server_url);

        let (sink, source) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        tokio::spawn(recv_loop(source, event_tx));
        Ok((WsWriter { sink }, event_rx))
    }
}

/// Write half of an open connection.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::text(frame))
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!("close frame not sent: {e}");
        }
    }
}

/// Drains the read half until close or error. Stops silently once the
/// session side drops its receiver.
async fn recv_loop(mut source: SplitStream<WsStream>, events: mpsc::Sender<TransportEvent>) {
    while let Some(next) = source.next().await {
        match next {
            Ok(Message::Text(text)) => {
                let forwarded = events
                    .send(TransportEvent::Message(text.as_str().to_owned()))
                    .await;
                if forwarded.is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                let _ = events.send(TransportEvent::Closed).await;
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Pongs are handled by tungstenite itself.
            }
            Ok(other) => {
                debug!("non-text frame dropped: {other:?}");
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}
