//! Client-server message protocol definitions.
//!
//! Every event is one variant of a closed tagged enum, so a malformed
//! payload fails the single decoding step at the transport boundary. SDP and
//! ICE bodies are opaque `serde_json::Value`s: the server is a courier and
//! never interprets them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Room Management
    #[serde(rename_all = "camelCase")]
    JoinMeeting { meeting_id: String, user: UserInfo },
    LeaveMeeting,

    // WebRTC Signaling
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        to: String,
        sdp: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user: Option<UserInfo>,
    },
    WebrtcAnswer {
        to: String,
        sdp: Value,
    },
    IceCandidate {
        to: String,
        candidate: Value,
    },

    // Chat
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        meeting_id: String,
        user: UserInfo,
        text: String,
    },
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    // Connection
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String },
    HeartbeatAck,

    // Room Events
    MeetingParticipants(Vec<Participant>),
    #[serde(rename_all = "camelCase")]
    UserJoined {
        connection_id: String,
        user: UserInfo,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft { connection_id: String },

    // Chat
    ChatHistory(Vec<ChatMessage>),
    ChatMessage(ChatMessage),

    // WebRTC Signaling
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        from: String,
        sdp: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user: Option<UserInfo>,
    },
    WebrtcAnswer {
        from: String,
        sdp: Value,
    },
    IceCandidate {
        from: String,
        candidate: Value,
    },
}

/// Authenticated-user identity, supplied externally at join time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

impl UserInfo {
    /// Mint a guest identity client-side so `id` is always present and chat
    /// stays attributable even without an account.
    pub fn guest() -> Self {
        use rand::Rng;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("Guest-{}", rand::thread_rng().gen_range(100..1000)),
        }
    }
}

/// One room member as seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: String,
    pub user: UserInfo,
}

/// One chat entry. Immutable once created; `timestamp` is server-assigned
/// milliseconds since the Unix epoch. Keyed by meeting id in the `ChatLog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub user: UserInfo,
    pub text: String,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_meeting_wire_shape() {
        let msg = ClientMessage::JoinMeeting {
            meeting_id: "room1".into(),
            user: UserInfo {
                id: "u1".into(),
                name: "Ada".into(),
            },
        };
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "join-meeting",
                "payload": { "meetingId": "room1", "user": { "id": "u1", "name": "Ada" } }
            })
        );
    }

    #[test]
    fn snapshot_and_roster_events_use_camel_case_fields() {
        let msg = ServerMessage::MeetingParticipants(vec![Participant {
            connection_id: "c1".into(),
            user: UserInfo {
                id: "u1".into(),
                name: "Ada".into(),
            },
        }]);
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["type"], "meeting-participants");
        assert_eq!(encoded["payload"][0]["connectionId"], "c1");

        let left = serde_json::to_value(ServerMessage::UserLeft {
            connection_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(
            left,
            json!({ "type": "user-left", "payload": { "connectionId": "c1" } })
        );
    }

    #[test]
    fn relay_payloads_round_trip_as_opaque_values() {
        let text = r#"{
            "type": "webrtc-offer",
            "payload": {
                "to": "c2",
                "sdp": { "type": "offer", "sdp": "v=0...", "vendorExtra": 7 },
                "fromUser": { "id": "u1", "name": "Ada" }
            }
        }"#;
        let decoded: ClientMessage = serde_json::from_str(text).unwrap();
        match &decoded {
            ClientMessage::WebrtcOffer { to, sdp, from_user } => {
                assert_eq!(to, "c2");
                assert_eq!(sdp["vendorExtra"], 7);
                assert_eq!(from_user.as_ref().unwrap().name, "Ada");
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
        let reencoded: ClientMessage =
            serde_json::from_str(&serde_json::to_string(&decoded).unwrap()).unwrap();
        assert_eq!(reencoded, decoded);
    }

    #[test]
    fn chat_message_out_is_user_text_timestamp() {
        let msg = ServerMessage::ChatMessage(ChatMessage {
            user: UserInfo {
                id: "u1".into(),
                name: "Ada".into(),
            },
            text: "hi".into(),
            timestamp: 1234,
        });
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["type"], "chat-message");
        assert_eq!(
            encoded["payload"],
            json!({ "user": { "id": "u1", "name": "Ada" }, "text": "hi", "timestamp": 1234 })
        );
    }

    #[test]
    fn malformed_payload_fails_the_single_decode_step() {
        let err = serde_json::from_str::<ClientMessage>(
            r#"{ "type": "join-meeting", "payload": { "user": 42 } }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn guest_identities_are_unique_and_named() {
        let a = UserInfo::guest();
        let b = UserInfo::guest();
        assert_ne!(a.id, b.id);
        assert!(a.name.starts_with("Guest-"));
    }
}
