//! Wire protocol for the videoroom gateway.
//!
//! One JSON text frame per message, UTF-8. Field names here are the wire
//! contract and must not be renamed. Outbound frames are typed per request
//! kind; inbound frames decode in two phases — first the envelope
//! ([`InboundFrame`]), then classification by the `janus` discriminator into
//! [`InboundMessage`], which documents every message kind the protocol uses.

use roomlink_core::{GatewayId, SignalingError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plugin identifier sent with every `attach`.
pub const VIDEOROOM_PLUGIN: &str = "janus.plugin.videoroom";

// ── Outbound ──────────────────────────────────────────────────────────────────

/// A client-initiated frame. Every variant carries a `transaction` token of
/// ≥12 random lowercase letters correlating it with the eventual reply.
#[derive(Debug, Serialize)]
#[serde(tag = "janus", rename_all = "lowercase")]
pub enum OutboundRequest {
    Create {
        transaction: String,
    },
    Attach {
        session_id: GatewayId,
        plugin: &'static str,
        transaction: String,
    },
    /// Plugin message: `join`, `configure`, or `start`, optionally with a
    /// local session description attached.
    Message {
        body: RequestBody,
        #[serde(skip_serializing_if = "Option::is_none")]
        jsep: Option<Value>,
        session_id: GatewayId,
        handle_id: GatewayId,
        transaction: String,
    },
    /// Incremental ICE candidate, or `{"completed": true}` once done.
    Trickle {
        candidate: Value,
        session_id: GatewayId,
        handle_id: GatewayId,
        transaction: String,
    },
    Keepalive {
        session_id: GatewayId,
        transaction: String,
    },
    Destroy {
        session_id: GatewayId,
        transaction: String,
    },
    Detach {
        session_id: GatewayId,
        handle_id: GatewayId,
        transaction: String,
    },
}

impl OutboundRequest {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Body of a plugin `message` request.
#[derive(Debug, Serialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum RequestBody {
    Join {
        room: GatewayId,
        ptype: ParticipantType,
        #[serde(skip_serializing_if = "Option::is_none")]
        display: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        feed: Option<GatewayId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        private_id: Option<GatewayId>,
    },
    Configure {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        video: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        record: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Start {
        room: GatewayId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    Publisher,
    Subscriber,
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Envelope of a gateway frame after both parse phases.
#[derive(Debug)]
pub struct InboundFrame {
    /// Handle id of the originating plugin endpoint. Present on room-scoped
    /// events and handle-scoped replies; absent on direct replies.
    pub sender: Option<GatewayId>,
    /// Correlation token, echoing a client request when applicable.
    pub transaction: Option<String>,
    pub message: InboundMessage,
}

/// Every top-level message kind the gateway emits.
#[derive(Debug)]
pub enum InboundMessage {
    /// Acknowledgement only. The real reply is still outstanding, so the
    /// pending transaction must not be consumed.
    Ack,
    /// Direct success reply; `id` is `data.id` when present, zero otherwise.
    Success { id: GatewayId },
    Error { code: i64, reason: String },
    /// Room-scoped plugin event (`plugindata.data` body).
    Event { data: RoomData, jsep: Option<Value> },
    WebRtcUp,
    Media { kind: Option<String>, receiving: Option<bool> },
    SlowLink,
    HangUp,
    Detached,
    /// Unrecognized `janus` value; the protocol is not assumed closed.
    Unknown { janus: String },
}

/// `plugindata.data` body of a room event. Sub-kinds overlap (a `joined`
/// event may also carry `publishers`), so every field the protocol uses is
/// an independent optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoomData {
    /// Room sub-kind: `joined`, `attached`, `event`, `slow_link`, `error`.
    pub videoroom: Option<String>,
    pub publishers: Option<Vec<PublisherInfo>>,
    pub private_id: Option<GatewayId>,
    pub configured: Option<String>,
    pub started: Option<String>,
    /// Either a feed id or the string `"ok"` (own unpublish acknowledged).
    pub unpublished: Option<Value>,
    /// Feed id of a departing participant.
    pub leaving: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<i64>,
}

/// One entry of a `publishers` list.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherInfo {
    pub id: GatewayId,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    janus: String,
    #[serde(default)]
    sender: Option<GatewayId>,
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    plugindata: Option<RawPluginData>,
    #[serde(default)]
    jsep: Option<Value>,
    #[serde(default)]
    error: Option<GatewayError>,
    #[serde(default)]
    data: Option<SuccessData>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    receiving: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawPluginData {
    #[serde(default)]
    data: RoomData,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuccessData {
    #[serde(default)]
    id: Option<GatewayId>,
}

/// Parses one gateway frame: serde envelope decode, then classification.
pub fn parse_frame(text: &str) -> Result<InboundFrame, SignalingError> {
    let raw: RawFrame = serde_json::from_str(text)?;

    let message = match raw.janus.as_str() {
        "ack" => InboundMessage::Ack,
        "success" => InboundMessage::Success {
            id: raw
                .data
                .and_then(|d| d.id)
                .unwrap_or_else(GatewayId::zero),
        },
        "error" => {
            let error = raw.error.unwrap_or_default();
            InboundMessage::Error {
                code: error.code.unwrap_or(0),
                reason: error
                    .reason
                    .unwrap_or_else(|| "unknown error".to_string()),
            }
        }
        "event" => InboundMessage::Event {
            data: raw.plugindata.map(|p| p.data).unwrap_or_default(),
            jsep: raw.jsep,
        },
        "webrtcup" => InboundMessage::WebRtcUp,
        "media" => InboundMessage::Media {
            kind: raw.kind,
            receiving: raw.receiving,
        },
        "slowlink" => InboundMessage::SlowLink,
        "hangup" => InboundMessage::HangUp,
        "detached" => InboundMessage::Detached,
        other => InboundMessage::Unknown {
            janus: other.to_string(),
        },
    };

    Ok(InboundFrame {
        sender: raw.sender,
        transaction: raw.transaction,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(request: &OutboundRequest) -> Value {
        serde_json::from_str(&request.encode().unwrap()).unwrap()
    }

    #[test]
    fn create_frame_shape() {
        let frame = encoded(&OutboundRequest::Create {
            transaction: "abcdefghijkl".into(),
        });
        assert_eq!(frame, json!({"janus": "create", "transaction": "abcdefghijkl"}));
    }

    #[test]
    fn attach_frame_shape() {
        let frame = encoded(&OutboundRequest::Attach {
            session_id: GatewayId::from(42),
            plugin: VIDEOROOM_PLUGIN,
            transaction: "tokentokento".into(),
        });
        assert_eq!(
            frame,
            json!({
                "janus": "attach",
                "session_id": 42,
                "plugin": "janus.plugin.videoroom",
                "transaction": "tokentokento"
            })
        );
    }

    #[test]
    fn subscriber_join_carries_feed_and_private_id() {
        let frame = encoded(&OutboundRequest::Message {
            body: RequestBody::Join {
                room: GatewayId::from(1234),
                ptype: ParticipantType::Subscriber,
                display: None,
                feed: Some(GatewayId::from(9)),
                private_id: Some(GatewayId::from(77)),
            },
            jsep: None,
            session_id: GatewayId::from(42),
            handle_id: GatewayId::from(101),
            transaction: "tokentokento".into(),
        });
        assert_eq!(frame["body"]["request"], "join");
        assert_eq!(frame["body"]["ptype"], "subscriber");
        assert_eq!(frame["body"]["feed"], json!(9));
        assert_eq!(frame["body"]["private_id"], json!(77));
        assert!(frame["body"].get("display").is_none());
        assert!(frame.get("jsep").is_none());
    }

    #[test]
    fn publisher_join_omits_feed() {
        let frame = encoded(&OutboundRequest::Message {
            body: RequestBody::Join {
                room: GatewayId::from(1234),
                ptype: ParticipantType::Publisher,
                display: Some("alice".into()),
                feed: None,
                private_id: None,
            },
            jsep: None,
            session_id: GatewayId::from(42),
            handle_id: GatewayId::from(7),
            transaction: "tokentokento".into(),
        });
        assert_eq!(frame["body"]["ptype"], "publisher");
        assert_eq!(frame["body"]["display"], "alice");
        assert!(frame["body"].get("feed").is_none());
    }

    #[test]
    fn trickle_round_trip_preserves_identifiers_and_candidate() {
        let candidate = json!({
            "candidate": "candidate:0 1 UDP 2122252543 198.51.100.7 54321 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        });
        let frame = encoded(&OutboundRequest::Trickle {
            candidate: candidate.clone(),
            session_id: GatewayId::from(42),
            handle_id: GatewayId::from(7),
            transaction: "tokentokento".into(),
        });
        assert_eq!(frame["janus"], "trickle");
        assert_eq!(frame["session_id"], json!(42));
        assert_eq!(frame["handle_id"], json!(7));
        assert_eq!(frame["candidate"], candidate);
    }

    #[test]
    fn success_reply_extracts_data_id() {
        let frame = parse_frame(
            r#"{"janus":"success","transaction":"tok","data":{"id":4171960713001797}}"#,
        )
        .unwrap();
        assert_eq!(frame.transaction.as_deref(), Some("tok"));
        match frame.message {
            InboundMessage::Success { id } => {
                assert_eq!(id, GatewayId::from(4171960713001797))
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn success_reply_without_data_yields_zero() {
        let frame = parse_frame(r#"{"janus":"success","transaction":"tok"}"#).unwrap();
        match frame.message {
            InboundMessage::Success { id } => assert!(id.is_zero()),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn event_envelope_decodes_publishers_and_jsep() {
        let frame = parse_frame(
            r#"{
                "janus": "event",
                "sender": 101,
                "transaction": "tok",
                "plugindata": {
                    "plugin": "janus.plugin.videoroom",
                    "data": {
                        "videoroom": "attached",
                        "publishers": [{"id": "9", "display": "bob"}]
                    }
                },
                "jsep": {"type": "offer", "sdp": "v=0..."}
            }"#,
        )
        .unwrap();
        assert_eq!(frame.sender, Some(GatewayId::from(101)));
        match frame.message {
            InboundMessage::Event { data, jsep } => {
                assert_eq!(data.videoroom.as_deref(), Some("attached"));
                let publishers = data.publishers.unwrap();
                assert_eq!(publishers[0].id, GatewayId::from(9));
                assert_eq!(publishers[0].display.as_deref(), Some("bob"));
                assert_eq!(jsep.unwrap()["type"], "offer");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn error_reply_defaults_missing_fields() {
        let frame = parse_frame(r#"{"janus":"error","transaction":"tok"}"#).unwrap();
        match frame.message {
            InboundMessage::Error { code, reason } => {
                assert_eq!(code, 0);
                assert_eq!(reason, "unknown error");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_janus_value_classifies_as_unknown() {
        let frame = parse_frame(r#"{"janus":"timeout","session_id":42}"#).unwrap();
        match frame.message {
            InboundMessage::Unknown { janus } => assert_eq!(janus, "timeout"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        assert!(parse_frame("not json at all").is_err());
    }
}
