//! Connection handlers

use crate::protocol::ServerMessage;
use crate::state::{AppState, PeerSession};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Register a new connection and send the hello carrying its id.
pub fn handle_connect(state: &AppState, sender: UnboundedSender<ServerMessage>) -> String {
    let peer_id = Uuid::new_v4().to_string();

    let session = PeerSession {
        id: peer_id.clone(),
        meeting_id: Mutex::new(None),
        sender: sender.clone(),
        connected_at: Instant::now(),
    };

    state.peers.insert(peer_id.clone(), session);

    let _ = sender.send(ServerMessage::Connected {
        connection_id: peer_id.clone(),
    });

    tracing::info!(peer_id = %peer_id, "connection established");
    peer_id
}

/// Tear down a connection. The session removal gates the whole path, so a
/// duplicate disconnect event finds nothing and broadcasts nothing.
pub fn handle_disconnect(state: &AppState, peer_id: &str) {
    if let Some((_, session)) = state.peers.remove(peer_id) {
        let meeting_id = session.meeting_id.lock().unwrap().take();
        if let Some(meeting_id) = meeting_id {
            crate::handlers::room::leave_room_internal(state, peer_id, &meeting_id);
        }
        tracing::info!(peer_id = %peer_id, "connection closed");
    }
}

/// Answer a keep-alive probe.
pub fn handle_heartbeat(sender: &UnboundedSender<ServerMessage>) {
    let _ = sender.send(ServerMessage::HeartbeatAck);
}
