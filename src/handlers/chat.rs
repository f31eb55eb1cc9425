//! Chat message handler.

use crate::handlers::room;
use crate::protocol::{ServerMessage, UserInfo};
use crate::state::AppState;

/// Persist a chat message and broadcast it to the meeting.
///
/// Append and broadcast run under the room guard: a join replaying history
/// either sees the message in `chat-history` or receives it live, never
/// both and never neither. Delivery is not gated on the store.
pub fn handle_chat_message(
    state: &AppState,
    peer_id: &str,
    meeting_id: &str,
    user: UserInfo,
    text: String,
) {
    if text.trim().is_empty() {
        return;
    }

    let Some(room) = state.rooms.get(meeting_id) else {
        tracing::debug!(peer_id = %peer_id, meeting_id = %meeting_id, "chat for unknown meeting dropped");
        return;
    };
    let inner = room.inner.lock().unwrap();

    if !inner.members.contains_key(peer_id) {
        tracing::warn!(peer_id = %peer_id, meeting_id = %meeting_id, "chat from non-member dropped");
        return;
    }

    let message = state.chat.append(meeting_id, user, text);
    room::send_to_members(state, &inner, ServerMessage::ChatMessage(message), None);

    tracing::debug!(peer_id = %peer_id, meeting_id = %meeting_id, "chat message relayed");
}
