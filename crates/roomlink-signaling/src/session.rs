//! The session state machine.
//!
//! Owns the session/private ids, the transaction registry, and the handle
//! table, and sequences create → attach → join → configure/start → detach
//! against the gateway. Everything here runs on one task (see
//! [`crate::client`]); methods are `async` only because sending on the
//! transport is.

use roomlink_core::{ConnectionParameters, GatewayId, SignalingError};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::RoomEvent;
use crate::handle::{Handle, HandleTable};
use crate::protocol::{
    parse_frame, InboundFrame, InboundMessage, OutboundRequest, ParticipantType, RequestBody,
    RoomData, VIDEOROOM_PLUGIN,
};
use crate::transaction::{random_token, TransactionRegistry};
use crate::transport::TransportWriter;

// MARK: - SessionState

/// Lifecycle of the control-plane connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    /// The transport is connecting; no protocol traffic yet.
    Connecting,
    Connected,
    Closed,
    /// Terminal. Entered once; only teardown traffic may follow.
    Error,
}

// MARK: - Continuation

/// What to do when the reply for an outstanding transaction arrives.
/// Captures only the data the completion needs, never enclosing context.
#[derive(Debug)]
enum Continuation {
    CreateSession,
    AttachHandle {
        feed_id: GatewayId,
        display: Option<String>,
    },
    Join {
        handle_id: GatewayId,
    },
    PublishOffer {
        handle_id: GatewayId,
    },
    StartAnswer {
        handle_id: GatewayId,
    },
    Recording {
        handle_id: GatewayId,
        active: bool,
    },
    Detach {
        handle_id: GatewayId,
    },
}

// MARK: - Session

pub struct Session<W: TransportWriter> {
    state: SessionState,
    params: Option<ConnectionParameters>,
    writer: Option<W>,
    session_id: GatewayId,
    private_id: GatewayId,
    transactions: TransactionRegistry<Continuation>,
    handles: HandleTable,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl<W: TransportWriter> Session<W> {
    pub fn new(events: mpsc::UnboundedSender<RoomEvent>) -> Self {
        Self {
            state: SessionState::New,
            params: None,
            writer: None,
            session_id: GatewayId::zero(),
            private_id: GatewayId::zero(),
            transactions: TransactionRegistry::new(),
            handles: HandleTable::new(),
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub(crate) fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub(crate) fn session_id(&self) -> &GatewayId {
        &self.session_id
    }

    pub(crate) fn private_id(&self) -> &GatewayId {
        &self.private_id
    }

    // ── Connection lifecycle ─────────────────────────────────────────────────

    /// Stores the connection parameters ahead of the transport connect.
    /// Returns false (and does nothing) unless the session is fresh.
    pub fn begin_connect(&mut self, params: ConnectionParameters) -> bool {
        if !matches!(self.state, SessionState::New | SessionState::Closed) {
            warn!("connect() ignored in state {:?}", self.state);
            return false;
        }
        self.params = Some(params);
        self.state = SessionState::Connecting;
        true
    }

    /// The transport is open: adopt the writer and start the `create`
    /// handshake.
    pub async fn on_transport_open(&mut self, writer: W) {
        self.writer = Some(writer);
        self.create().await;
    }

    /// The connection dropped without an explicit disconnect. All per-life
    /// state is discarded so a later reconnect starts from a clean slate;
    /// only the connection parameters survive.
    pub async fn on_transport_close(&mut self) {
        info!("signaling channel closed");
        if matches!(self.state, SessionState::Connected | SessionState::Connecting) {
            self.state = SessionState::Closed;
        }
        self.transactions.clear();
        self.handles.clear();
        self.session_id = GatewayId::zero();
        self.private_id = GatewayId::zero();
        self.writer = None;
        let _ = self.events.send(RoomEvent::ChannelClosed);
    }

    pub async fn on_transport_error(&mut self, description: String) {
        self.report_error(format!("transport error: {description}")).await;
    }

    /// No-op unless connected: destroys the gateway session, clears all
    /// tables, and closes the transport.
    pub async fn disconnect(&mut self) {
        if self.state != SessionState::Connected {
            debug!("disconnect() ignored in state {:?}", self.state);
            return;
        }
        self.teardown().await;
    }

    /// Idempotent final teardown; the session is inert afterwards.
    pub async fn release(&mut self) {
        if self.state == SessionState::Connected {
            self.teardown().await;
        }
        self.transactions.clear();
        self.handles.clear();
        self.writer = None;
        self.params = None;
    }

    async fn teardown(&mut self) {
        self.destroy().await;
        self.transactions.clear();
        self.handles.clear();
        if let Some(writer) = self.writer.as_mut() {
            writer.close().await;
        }
        self.writer = None;
    }

    // ── Public protocol operations ───────────────────────────────────────────

    /// Sends the local offer for a publisher handle (`configure` + jsep).
    pub async fn publish_offer(&mut self, handle_id: GatewayId, sdp: Value) {
        if !self.guard_connected("publish_offer") {
            return;
        }
        let token = self.transactions.register(Continuation::PublishOffer {
            handle_id: handle_id.clone(),
        });
        let request = OutboundRequest::Message {
            body: RequestBody::Configure {
                audio: Some(true),
                video: Some(true),
                record: None,
                filename: None,
            },
            jsep: Some(sdp),
            session_id: self.session_id.clone(),
            handle_id,
            transaction: token,
        };
        self.send(&request).await;
    }

    /// Sends the local answer for a subscriber handle (`start` + jsep).
    pub async fn create_answer(&mut self, handle_id: GatewayId, sdp: Value) {
        if !self.guard_connected("create_answer") {
            return;
        }
        let Some(room) = self.room_id() else { return };
        let token = self.transactions.register(Continuation::StartAnswer {
            handle_id: handle_id.clone(),
        });
        let request = OutboundRequest::Message {
            body: RequestBody::Start { room },
            jsep: Some(sdp),
            session_id: self.session_id.clone(),
            handle_id,
            transaction: token,
        };
        self.send(&request).await;
    }

    /// Forwards one ICE candidate. Fire-and-forget: no continuation, errors
    /// only surface in the gateway log.
    pub async fn trickle(&mut self, handle_id: GatewayId, candidate: Value) {
        if !self.guard_connected("trickle") {
            return;
        }
        let request = OutboundRequest::Trickle {
            candidate,
            session_id: self.session_id.clone(),
            handle_id,
            transaction: random_token(),
        };
        self.send(&request).await;
    }

    /// Signals the end of candidate gathering for a handle.
    pub async fn trickle_complete(&mut self, handle_id: GatewayId) {
        if !self.guard_connected("trickle_complete") {
            return;
        }
        let request = OutboundRequest::Trickle {
            candidate: json!({"completed": true}),
            session_id: self.session_id.clone(),
            handle_id,
            transaction: random_token(),
        };
        self.send(&request).await;
    }

    /// Starts or stops server-side recording for a handle.
    pub async fn set_recording(
        &mut self,
        handle_id: GatewayId,
        active: bool,
        file_name: Option<String>,
    ) {
        if !self.guard_connected("set_recording") {
            return;
        }
        let token = self.transactions.register(Continuation::Recording {
            handle_id: handle_id.clone(),
            active,
        });
        let request = OutboundRequest::Message {
            body: RequestBody::Configure {
                audio: None,
                video: None,
                record: Some(active),
                filename: file_name,
            },
            jsep: None,
            session_id: self.session_id.clone(),
            handle_id,
            transaction: token,
        };
        self.send(&request).await;
    }

    /// Periodic fire-and-forget heartbeat; uncorrelated, never retried.
    pub async fn keep_alive(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        let request = OutboundRequest::Keepalive {
            session_id: self.session_id.clone(),
            transaction: random_token(),
        };
        self.send(&request).await;
    }

    // ── Client-initiated transactions ────────────────────────────────────────

    async fn create(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::New | SessionState::Closed
        ) {
            warn!("create() ignored in state {:?}", self.state);
            return;
        }
        let token = self.transactions.register(Continuation::CreateSession);
        self.send(&OutboundRequest::Create { transaction: token }).await;
    }

    /// Attaches a plugin handle: feed zero means "self" (publisher), any
    /// other feed a subscriber for that feed.
    async fn attach(&mut self, feed_id: GatewayId, display: Option<String>) {
        if !self.guard_connected("attach") {
            return;
        }
        let token = self.transactions.register(Continuation::AttachHandle {
            feed_id,
            display,
        });
        let request = OutboundRequest::Attach {
            session_id: self.session_id.clone(),
            plugin: VIDEOROOM_PLUGIN,
            transaction: token,
        };
        self.send(&request).await;
    }

    async fn join(&mut self, handle_id: GatewayId, feed_id: GatewayId) {
        if !self.guard_connected("join") {
            return;
        }
        let (room, display) = match self.params.as_ref() {
            Some(p) => (p.room_id.clone(), p.display_name.clone()),
            None => {
                warn!("join() without connection parameters");
                return;
            }
        };
        let body = if feed_id.is_zero() {
            RequestBody::Join {
                room,
                ptype: ParticipantType::Publisher,
                display,
                feed: None,
                private_id: None,
            }
        } else {
            RequestBody::Join {
                room,
                ptype: ParticipantType::Subscriber,
                display: None,
                feed: Some(feed_id),
                private_id: Some(self.private_id.clone()),
            }
        };
        let token = self.transactions.register(Continuation::Join {
            handle_id: handle_id.clone(),
        });
        let request = OutboundRequest::Message {
            body,
            jsep: None,
            session_id: self.session_id.clone(),
            handle_id,
            transaction: token,
        };
        self.send(&request).await;
    }

    /// Fires `Left` immediately (the UI must stop rendering now), then asks
    /// the gateway to drop the handle. The tables are cleaned once any reply
    /// arrives.
    async fn detach(&mut self, handle_id: GatewayId) {
        if !self.guard_connected("detach") {
            return;
        }
        let _ = self.events.send(RoomEvent::Left {
            handle_id: handle_id.clone(),
        });
        self.handles.mark_detaching(&handle_id);
        let token = self.transactions.register(Continuation::Detach {
            handle_id: handle_id.clone(),
        });
        let request = OutboundRequest::Detach {
            session_id: self.session_id.clone(),
            handle_id,
            transaction: token,
        };
        self.send(&request).await;
    }

    async fn destroy(&mut self) {
        if self.session_id.is_zero() {
            warn!("destroy() with no live session");
            return;
        }
        let request = OutboundRequest::Destroy {
            session_id: self.session_id.clone(),
            transaction: random_token(),
        };
        self.send(&request).await;
        self.state = SessionState::Closed;
        self.session_id = GatewayId::zero();
    }

    // ── Inbound dispatch ─────────────────────────────────────────────────────

    /// Handles one inbound text frame. A parse failure is reported as a
    /// channel error but never stops dispatch of later frames.
    pub async fn on_message(&mut self, text: &str) {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.report_error(format!("{e}")).await;
                return;
            }
        };
        if frame.sender.is_some() {
            self.on_sender_message(frame).await;
        } else {
            self.on_direct_reply(frame).await;
        }
    }

    /// Direct replies carry no `sender`; they correlate by token alone.
    async fn on_direct_reply(&mut self, frame: InboundFrame) {
        match frame.message {
            InboundMessage::Ack => {
                // The real reply is still outstanding; keep the transaction.
                debug!("ack on session {}", self.session_id);
            }
            InboundMessage::Success { id } => {
                match self.take_transaction(frame.transaction.as_deref()) {
                    Some(continuation) => self.complete(continuation, id, None).await,
                    None => debug!(
                        "success for unknown transaction {:?}; dropped",
                        frame.transaction
                    ),
                }
            }
            InboundMessage::Error { code, reason } => {
                match self.take_transaction(frame.transaction.as_deref()) {
                    Some(continuation) => self.fail(continuation, &reason, code).await,
                    None => error!("gateway error {code}: {reason}"),
                }
            }
            InboundMessage::Unknown { janus } => {
                debug!("unrecognized message type {janus:?}; dropped");
            }
            other => debug!("{other:?} without sender; dropped"),
        }
    }

    /// Room-scoped events and handle-scoped replies.
    async fn on_sender_message(&mut self, frame: InboundFrame) {
        let Some(sender) = frame.sender else { return };
        match frame.message {
            InboundMessage::Event { data, jsep } => {
                self.on_room_event(sender, frame.transaction, data, jsep).await;
            }
            InboundMessage::WebRtcUp => {
                info!("webrtc peer connection is up (handle {sender})");
            }
            InboundMessage::SlowLink => {
                info!("slow link on session {}", self.session_id);
            }
            InboundMessage::Media { kind, receiving } => {
                debug!(
                    "media event on handle {sender}: type {:?}, receiving {:?}",
                    kind, receiving
                );
            }
            InboundMessage::HangUp => {
                debug!("hangup for handle {sender} on session {}", self.session_id);
            }
            InboundMessage::Detached => {
                debug!("handle {sender} detached by the gateway");
            }
            InboundMessage::Error { code, reason } => {
                match self.take_transaction(frame.transaction.as_deref()) {
                    Some(continuation) => self.fail(continuation, &reason, code).await,
                    None => error!("gateway error {code}: {reason}"),
                }
            }
            InboundMessage::Ack => debug!("ack from handle {sender}"),
            InboundMessage::Success { .. } => {
                debug!("bare success from handle {sender}; dropped");
            }
            InboundMessage::Unknown { janus } => {
                debug!("unrecognized message type {janus:?}; dropped");
            }
        }
    }

    async fn on_room_event(
        &mut self,
        sender: GatewayId,
        transaction: Option<String>,
        data: RoomData,
        jsep: Option<Value>,
    ) {
        // New publishers arrive by gateway push, never by polling. Feeds that
        // already have a live handle are skipped so the one-handle-per-feed
        // invariant holds when the gateway repeats an announcement.
        if let Some(publishers) = &data.publishers {
            for publisher in publishers {
                if self.handles.contains_feed(&publisher.id) {
                    debug!("feed {} already attached; skipping", publisher.id);
                    continue;
                }
                self.attach(publisher.id.clone(), publisher.display.clone()).await;
            }
        }

        let kind = data.videoroom.clone();
        match kind.as_deref() {
            Some("joined") => {
                if let Some(private_id) = data.private_id.clone() {
                    self.private_id = private_id;
                }
                match self.take_transaction(transaction.as_deref()) {
                    Some(continuation) => self.complete(continuation, sender, None).await,
                    None => debug!("joined event without a pending transaction"),
                }
            }
            Some("attached") => {
                match self.take_transaction(transaction.as_deref()) {
                    Some(continuation) => self.complete(continuation, sender, jsep).await,
                    None => debug!("attached event without a pending transaction"),
                }
            }
            Some("event") => {
                self.on_plugin_event(sender, transaction, data, jsep).await;
            }
            Some("slow_link") => {
                info!("slow_link event on session {}", self.session_id);
            }
            Some("error") => {
                let reason = data
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                let code = data.error_code.unwrap_or(0);
                match self.take_transaction(transaction.as_deref()) {
                    Some(continuation) => self.fail(continuation, &reason, code).await,
                    None => error!("videoroom error {code}: {reason}"),
                }
            }
            Some(other) => debug!("unrecognized videoroom event {other:?}; dropped"),
            None => {}
        }
    }

    /// `videoroom: "event"` sub-dispatch: configure/start outcomes and
    /// feed departures.
    async fn on_plugin_event(
        &mut self,
        sender: GatewayId,
        transaction: Option<String>,
        data: RoomData,
        jsep: Option<Value>,
    ) {
        if let Some(configured) = data.configured.as_deref() {
            if configured == "ok" {
                if let Some(continuation) = self.take_transaction(transaction.as_deref()) {
                    self.complete(continuation, sender, jsep).await;
                }
            } else {
                let reason = data
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("configured is {configured}"));
                if let Some(continuation) = self.take_transaction(transaction.as_deref()) {
                    self.fail(continuation, &reason, data.error_code.unwrap_or(0)).await;
                }
            }
            return;
        }

        if let Some(started) = data.started.as_deref() {
            if started == "ok" {
                if let Some(continuation) = self.take_transaction(transaction.as_deref()) {
                    self.complete(continuation, sender, None).await;
                }
            } else {
                let reason = data
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("started is {started}"));
                if let Some(continuation) = self.take_transaction(transaction.as_deref()) {
                    self.fail(continuation, &reason, data.error_code.unwrap_or(0)).await;
                }
            }
            return;
        }

        if let Some(unpublished) = &data.unpublished {
            if unpublished.as_str() == Some("ok") {
                // Acknowledgement of our own unpublish; upstream has no
                // client-side side effect for this case.
                debug!("own unpublish acknowledged");
            } else if let Some(feed_id) = GatewayId::from_value(unpublished) {
                self.detach_feed(&feed_id).await;
            }
            return;
        }

        if let Some(leaving) = &data.leaving {
            if let Some(feed_id) = GatewayId::from_value(leaving) {
                self.detach_feed(&feed_id).await;
            }
        }
    }

    /// A feed left or unpublished: resolve it to a live handle and detach.
    /// An unknown or already-detaching feed is "already gone", not an error.
    async fn detach_feed(&mut self, feed_id: &GatewayId) {
        let Some(handle) = self.handles.handle_for_feed(feed_id) else {
            debug!("no live handle for feed {feed_id}; already gone");
            return;
        };
        if handle.is_detaching() {
            debug!("handle {} already detaching", handle.handle_id);
            return;
        }
        let handle_id = handle.handle_id.clone();
        self.detach(handle_id).await;
    }

    // ── Transaction resolution ───────────────────────────────────────────────

    fn take_transaction(&mut self, token: Option<&str>) -> Option<Continuation> {
        self.transactions.take(token?)
    }

    async fn complete(
        &mut self,
        continuation: Continuation,
        id: GatewayId,
        jsep: Option<Value>,
    ) {
        match continuation {
            Continuation::CreateSession => {
                self.session_id = id;
                self.state = SessionState::Connected;
                info!("session {} established", self.session_id);
                let display = self.params.as_ref().and_then(|p| p.display_name.clone());
                self.attach(GatewayId::zero(), display).await;
            }
            Continuation::AttachHandle { feed_id, display } => {
                let handle = if feed_id.is_zero() {
                    Handle::publisher(id.clone(), display)
                } else {
                    Handle::subscriber(id.clone(), feed_id.clone(), display)
                };
                self.handles.insert(handle);
                self.join(id, feed_id).await;
            }
            Continuation::Join { handle_id } => {
                if !self.handles.contains(&id) {
                    warn!("join completed for unknown handle {id}");
                    return;
                }
                match jsep {
                    // Subscriber join: the gateway attached a remote offer.
                    Some(jsep) => {
                        let _ = self.events.send(RoomEvent::RemoteOffer { handle_id, jsep });
                    }
                    // Publisher join: bare success.
                    None => {
                        let _ = self
                            .events
                            .send(RoomEvent::PublisherJoined { handle_id: id });
                    }
                }
            }
            Continuation::PublishOffer { handle_id } => match jsep {
                Some(jsep) => {
                    if self.handles.contains(&handle_id) {
                        let _ = self.events.send(RoomEvent::RemoteOffer { handle_id, jsep });
                    } else {
                        warn!("configured reply for unknown handle {handle_id}");
                    }
                }
                None => debug!("offer configured for handle {handle_id}"),
            },
            Continuation::StartAnswer { handle_id } => {
                debug!("gateway accepted the answer for handle {handle_id}");
            }
            Continuation::Recording { handle_id, active } => {
                info!(
                    "recording {} for handle {handle_id}",
                    if active { "started" } else { "stopped" }
                );
                let _ = self
                    .events
                    .send(RoomEvent::RecordingChanged { handle_id, active });
            }
            Continuation::Detach { handle_id } => {
                self.remove_handle(&handle_id);
            }
        }
    }

    async fn fail(&mut self, continuation: Continuation, reason: &str, code: i64) {
        error!("transaction failed ({code}): {reason}");
        match continuation {
            // Either way the handle is gone locally; `Left` already fired.
            Continuation::Detach { handle_id } => {
                self.remove_handle(&handle_id);
            }
            _ => {
                let error = SignalingError::Gateway {
                    code,
                    reason: reason.to_string(),
                };
                self.report_error(error.to_string()).await;
            }
        }
    }

    fn remove_handle(&mut self, handle_id: &GatewayId) {
        if let Some(handle) = self.handles.remove(handle_id) {
            debug!("handle {} (feed {}) removed", handle.handle_id, handle.feed_id);
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn guard_connected(&self, op: &str) -> bool {
        if self.state == SessionState::Connected {
            true
        } else {
            warn!("{op}() ignored in state {:?}", self.state);
            false
        }
    }

    fn room_id(&self) -> Option<GatewayId> {
        match self.params.as_ref() {
            Some(p) => Some(p.room_id.clone()),
            None => {
                warn!("operation without connection parameters");
                None
            }
        }
    }

    async fn send(&mut self, request: &OutboundRequest) {
        let frame = match request.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode request: {e}");
                return;
            }
        };
        let result = match self.writer.as_mut() {
            Some(writer) => writer.send(&frame).await,
            None => {
                warn!("outbound frame dropped: transport not connected");
                return;
            }
        };
        if let Err(e) = result {
            // The read side will observe the same failure and escalate.
            warn!("transport send failed: {e}");
        }
    }

    /// Terminal error: best-effort `destroy`, enter `Error`, tell the owner.
    async fn report_error(&mut self, message: String) {
        error!("{message}");
        if self.state == SessionState::Error {
            return;
        }
        self.destroy().await;
        self.state = SessionState::Error; // destroy() moves to Closed
        let _ = self.events.send(RoomEvent::ChannelError { message });
    }
}
