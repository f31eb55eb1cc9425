//! Process-wide application state.
//!
//! Created at startup; room entries appear on first join and are deleted
//! when their member set empties. Nothing here survives a restart — only
//! the chat log is kept independently of room lifetime, and that is
//! process-lifetime as well.

use crate::chat::ChatLog;
use crate::config::Config;
use crate::protocol::{Participant, ServerMessage, UserInfo};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Global application state.
pub struct AppState {
    /// Rooms (meeting_id -> Room)
    pub rooms: DashMap<String, Room>,
    /// Peer sessions (connection_id -> PeerSession)
    pub peers: DashMap<String, PeerSession>,
    /// Per-meeting chat log, independent of room lifetime
    pub chat: ChatLog,
    /// Settings
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            rooms: DashMap::new(),
            peers: DashMap::new(),
            chat: ChatLog::new(config.chat.history_limit),
            config: Arc::new(config),
        }
    }
}

/// One meeting's membership. `inner` is the single exclusive guard for this
/// meeting id: every membership mutation and chat append for the meeting
/// runs inside it, and critical sections never await.
pub struct Room {
    #[allow(dead_code)]
    pub id: String,
    pub inner: Mutex<RoomInner>,
    pub created_at: Instant,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            inner: Mutex::new(RoomInner {
                members: HashMap::new(),
            }),
            created_at: Instant::now(),
        }
    }
}

/// Membership table guarded by `Room::inner`.
pub struct RoomInner {
    /// connection_id -> user
    pub members: HashMap<String, UserInfo>,
}

impl RoomInner {
    pub fn participants(&self) -> Vec<Participant> {
        self.members
            .iter()
            .map(|(connection_id, user)| Participant {
                connection_id: connection_id.clone(),
                user: user.clone(),
            })
            .collect()
    }
}

/// Peer session info. The sender is an unbounded queue, so room broadcasts
/// never block on a slow receiver.
pub struct PeerSession {
    #[allow(dead_code)]
    pub id: String,
    pub meeting_id: Mutex<Option<String>>,
    pub sender: UnboundedSender<ServerMessage>,
    #[allow(dead_code)]
    pub connected_at: Instant,
}
