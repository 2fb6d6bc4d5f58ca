//! The public client facade and its driver task.
//!
//! [`RoomClient`] is a cheap clonable command sender; all state lives in the
//! driver task spawned by [`RoomClient::spawn`]. The task multiplexes three
//! inputs over one `select!` loop: client commands, transport events, and
//! the keepalive timer. Exactly one input is serviced at a time, which is
//! the whole concurrency story.

use roomlink_core::{ConnectionParameters, GatewayId, KEEP_ALIVE_INTERVAL};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::events::RoomEvent;
use crate::session::Session;
use crate::transport::{SignalingConnector, TransportEvent};

// MARK: - Command

/// One queued client operation. Commands are fire-and-forget; outcomes
/// surface as [`RoomEvent`]s.
#[derive(Debug)]
enum Command {
    Connect(ConnectionParameters),
    Disconnect,
    PublishOffer { handle_id: GatewayId, sdp: Value },
    CreateAnswer { handle_id: GatewayId, sdp: Value },
    Trickle { handle_id: GatewayId, candidate: Value },
    TrickleComplete { handle_id: GatewayId },
    StartRecording { handle_id: GatewayId, file_name: Option<String> },
    StopRecording { handle_id: GatewayId },
    Release,
}

// MARK: - RoomClient

/// Handle to a running videoroom signaling session.
///
/// Every method posts to the driver task and returns immediately. After
/// [`release`](RoomClient::release) (or a driver crash) posts become silent
/// no-ops, matching the fire-and-forget contract.
#[derive(Clone)]
pub struct RoomClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl RoomClient {
    /// Spawns the driver task. Returns the client handle and the stream of
    /// room events.
    pub fn spawn<C: SignalingConnector>(
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(connector, command_rx, event_tx));
        (Self { commands: command_tx }, event_rx)
    }

    /// Opens the transport and drives the session handshake.
    pub fn connect(&self, params: ConnectionParameters) {
        self.post(Command::Connect(params));
    }

    /// Destroys the gateway session and closes the transport. The client can
    /// connect again afterwards.
    pub fn disconnect(&self) {
        self.post(Command::Disconnect);
    }

    /// Sends the local SDP offer for a publisher handle.
    pub fn publish_offer(&self, handle_id: GatewayId, sdp: Value) {
        self.post(Command::PublishOffer { handle_id, sdp });
    }

    /// Sends the local SDP answer for a subscriber handle.
    pub fn create_answer(&self, handle_id: GatewayId, sdp: Value) {
        self.post(Command::CreateAnswer { handle_id, sdp });
    }

    /// Forwards one ICE candidate for a handle.
    pub fn trickle(&self, handle_id: GatewayId, candidate: Value) {
        self.post(Command::Trickle { handle_id, candidate });
    }

    /// Signals the end of ICE candidate gathering for a handle.
    pub fn trickle_complete(&self, handle_id: GatewayId) {
        self.post(Command::TrickleComplete { handle_id });
    }

    /// Asks the gateway to record the handle's media, optionally to a named
    /// file.
    pub fn start_recording(&self, handle_id: GatewayId, file_name: Option<String>) {
        self.post(Command::StartRecording { handle_id, file_name });
    }

    pub fn stop_recording(&self, handle_id: GatewayId) {
        self.post(Command::StopRecording { handle_id });
    }

    /// Tears everything down and stops the driver task.
    pub fn release(&self) {
        self.post(Command::Release);
    }

    fn post(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("command dropped: driver task is gone");
        }
    }
}

// MARK: - Driver

async fn run<C: SignalingConnector>(
    mut connector: C,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<RoomEvent>,
) {
    let mut session: Session<C::Writer> = Session::new(events);
    let mut transport_rx: Option<mpsc::Receiver<TransportEvent>> = None;

    // First tick one full period out; the create handshake is its own proof
    // of liveness.
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + KEEP_ALIVE_INTERVAL,
        KEEP_ALIVE_INTERVAL,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    // Every client handle dropped; tear down and stop.
                    session.release().await;
                    break;
                };
                match command {
                    Command::Connect(params) => {
                        if !session.begin_connect(params.clone()) {
                            continue;
                        }
                        match connector.connect(&params).await {
                            Ok((writer, rx)) => {
                                transport_rx = Some(rx);
                                session.on_transport_open(writer).await;
                            }
                            Err(e) => {
                                session.on_transport_error(e.to_string()).await;
                            }
                        }
                    }
                    Command::Disconnect => {
                        session.disconnect().await;
                        transport_rx = None;
                    }
                    Command::PublishOffer { handle_id, sdp } => {
                        session.publish_offer(handle_id, sdp).await;
                    }
                    Command::CreateAnswer { handle_id, sdp } => {
                        session.create_answer(handle_id, sdp).await;
                    }
                    Command::Trickle { handle_id, candidate } => {
                        session.trickle(handle_id, candidate).await;
                    }
                    Command::TrickleComplete { handle_id } => {
                        session.trickle_complete(handle_id).await;
                    }
                    Command::StartRecording { handle_id, file_name } => {
                        session.set_recording(handle_id, true, file_name).await;
                    }
                    Command::StopRecording { handle_id } => {
                        session.set_recording(handle_id, false, None).await;
                    }
                    Command::Release => {
                        session.release().await;
                        break;
                    }
                }
            }
            event = recv_transport(&mut transport_rx) => {
                match event {
                    Some(TransportEvent::Message(text)) => {
                        session.on_message(&text).await;
                    }
                    Some(TransportEvent::Closed) | None => {
                        transport_rx = None;
                        session.on_transport_close().await;
                    }
                    Some(TransportEvent::Error(description)) => {
                        transport_rx = None;
                        session.on_transport_error(description).await;
                    }
                }
            }
            _ = keepalive.tick(), if session.is_connected() => {
                session.keep_alive().await;
            }
        }
    }
    info!("signaling driver stopped");
}

/// Receives from the transport when one is attached; otherwise parks this
/// select branch forever.
async fn recv_transport(
    rx: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
