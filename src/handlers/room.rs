//! Room membership handlers.
//!
//! All membership mutations for one meeting run inside that room's `inner`
//! guard (one exclusive lock per meeting id — unrelated meetings never
//! contend). Sends are unbounded-channel pushes, so nothing inside a
//! critical section blocks or awaits.

use crate::protocol::{ServerMessage, UserInfo};
use crate::state::{AppState, Room, RoomInner};

/// Join a meeting, creating the room on first use.
///
/// The joiner receives the pre-insertion participant snapshot (everyone
/// already present, never itself) followed by the chat history; everyone
/// already present receives `user-joined`. All of it happens under the room
/// guard so a concurrent chat append cannot interleave between history
/// replay and live delivery.
pub fn handle_join(state: &AppState, peer_id: &str, meeting_id: &str, user: UserInfo) {
    let meeting_id = meeting_id.trim();
    if meeting_id.is_empty() || user.name.trim().is_empty() {
        tracing::warn!(peer_id = %peer_id, "rejected join with blank meeting id or user name");
        return;
    }

    // Connections are single-room: joining a new meeting leaves the old one
    // first, with the departure broadcast to the old room.
    let previous = state
        .peers
        .get(peer_id)
        .and_then(|session| session.meeting_id.lock().unwrap().clone());
    if let Some(previous) = previous {
        if previous == meeting_id {
            tracing::debug!(peer_id = %peer_id, meeting_id = %meeting_id, "duplicate join ignored");
            return;
        }
        leave_room_internal(state, peer_id, &previous);
    }

    let Some(joiner) = state.peers.get(peer_id).map(|s| s.sender.clone()) else {
        tracing::debug!(peer_id = %peer_id, "join from unknown connection dropped");
        return;
    };

    let user_count = {
        let room = state
            .rooms
            .entry(meeting_id.to_string())
            .or_insert_with(|| {
                tracing::info!(meeting_id = %meeting_id, "room created");
                Room::new(meeting_id.to_string())
            });
        let mut inner = room.inner.lock().unwrap();

        let snapshot = inner.participants();
        inner.members.insert(peer_id.to_string(), user.clone());

        let _ = joiner.send(ServerMessage::MeetingParticipants(snapshot));
        let _ = joiner.send(ServerMessage::ChatHistory(state.chat.history(meeting_id)));

        send_to_members(
            state,
            &inner,
            ServerMessage::UserJoined {
                connection_id: peer_id.to_string(),
                user: user.clone(),
            },
            Some(peer_id),
        );

        match state.peers.get(peer_id) {
            Some(session) => {
                *session.meeting_id.lock().unwrap() = Some(meeting_id.to_string());
            }
            None => {
                // A disconnect won the race while we were recording the
                // membership: last state wins, withdraw it again.
                inner.members.remove(peer_id);
                send_to_members(
                    state,
                    &inner,
                    ServerMessage::UserLeft {
                        connection_id: peer_id.to_string(),
                    },
                    None,
                );
                return;
            }
        }

        inner.members.len()
    };

    tracing::info!(
        peer_id = %peer_id,
        meeting_id = %meeting_id,
        user = %user.name,
        user_count = user_count,
        "user joined meeting"
    );
}

/// Leave the meeting the connection is currently joined to, if any.
pub fn handle_leave(state: &AppState, peer_id: &str) {
    let meeting_id = state
        .peers
        .get(peer_id)
        .and_then(|session| session.meeting_id.lock().unwrap().take());

    if let Some(meeting_id) = meeting_id {
        leave_room_internal(state, peer_id, &meeting_id);
    }
}

/// Remove a connection from a room. The departure broadcast is gated on the
/// registry actually containing the connection, so replayed leave or
/// disconnect events broadcast nothing. Deletes the room when it empties;
/// `remove_if` re-checks under the map guard so a racing join survives.
pub(crate) fn leave_room_internal(state: &AppState, peer_id: &str, meeting_id: &str) {
    let removed = if let Some(room) = state.rooms.get(meeting_id) {
        let mut inner = room.inner.lock().unwrap();
        if inner.members.remove(peer_id).is_some() {
            send_to_members(
                state,
                &inner,
                ServerMessage::UserLeft {
                    connection_id: peer_id.to_string(),
                },
                None,
            );
            tracing::info!(
                peer_id = %peer_id,
                meeting_id = %meeting_id,
                remaining = inner.members.len(),
                "user left meeting"
            );
            true
        } else {
            false
        }
    } else {
        false
    };

    if removed {
        let deleted = state
            .rooms
            .remove_if(meeting_id, |_, room| room.inner.lock().unwrap().members.is_empty());
        if deleted.is_some() {
            tracing::info!(meeting_id = %meeting_id, "room deleted");
        }
    }
}

/// Current membership of a meeting; empty if the room does not exist.
pub fn snapshot(state: &AppState, meeting_id: &str) -> Vec<crate::protocol::Participant> {
    state
        .rooms
        .get(meeting_id)
        .map(|room| room.inner.lock().unwrap().participants())
        .unwrap_or_default()
}

/// Push a message to every member of a room, optionally skipping one.
pub(crate) fn send_to_members(
    state: &AppState,
    inner: &RoomInner,
    message: ServerMessage,
    except_peer_id: Option<&str>,
) {
    for peer_id in inner.members.keys() {
        if Some(peer_id.as_str()) == except_peer_id {
            continue;
        }
        if let Some(session) = state.peers.get(peer_id) {
            let _ = session.sender.send(message.clone());
        }
    }
}

/// Defensive cleanup: delete-on-empty should already have removed these.
pub fn sweep_empty_rooms(state: &AppState) {
    let mut deleted = 0;
    state.rooms.retain(|meeting_id, room| {
        let empty = room.inner.lock().unwrap().members.is_empty();
        if empty {
            tracing::info!(
                meeting_id = %meeting_id,
                age_ms = room.created_at.elapsed().as_millis() as u64,
                "swept empty room"
            );
            deleted += 1;
        }
        !empty
    });

    if deleted > 0 {
        tracing::debug!(deleted_rooms = deleted, "room sweep completed");
    }
}
