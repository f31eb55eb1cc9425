//! WebRTC signaling relay.
//!
//! Pure courier: each message is forwarded verbatim to its addressee with a
//! stamped `from`, the SDP/ICE body never inspected. Unknown targets are
//! dropped silently — fire-and-forget, no error back to the sender.

use crate::protocol::{ServerMessage, UserInfo};
use crate::state::AppState;
use serde_json::Value;

pub fn relay_offer(
    state: &AppState,
    from_peer_id: &str,
    to: &str,
    sdp: Value,
    from_user: Option<UserInfo>,
) {
    send_to_peer(
        state,
        to,
        ServerMessage::WebrtcOffer {
            from: from_peer_id.to_string(),
            sdp,
            from_user,
        },
    );

    tracing::debug!(from = %from_peer_id, to = %to, "relayed offer");
}

pub fn relay_answer(state: &AppState, from_peer_id: &str, to: &str, sdp: Value) {
    send_to_peer(
        state,
        to,
        ServerMessage::WebrtcAnswer {
            from: from_peer_id.to_string(),
            sdp,
        },
    );

    tracing::debug!(from = %from_peer_id, to = %to, "relayed answer");
}

pub fn relay_ice_candidate(state: &AppState, from_peer_id: &str, to: &str, candidate: Value) {
    send_to_peer(
        state,
        to,
        ServerMessage::IceCandidate {
            from: from_peer_id.to_string(),
            candidate,
        },
    );

    tracing::debug!(from = %from_peer_id, to = %to, "relayed ice candidate");
}

fn send_to_peer(state: &AppState, peer_id: &str, message: ServerMessage) {
    match state.peers.get(peer_id) {
        Some(session) => {
            let _ = session.sender.send(message);
        }
        None => {
            tracing::debug!(to = %peer_id, "dropped signaling message for unknown connection");
        }
    }
}
