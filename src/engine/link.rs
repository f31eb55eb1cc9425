//! Per-remote-participant link state.

use crate::engine::media::{MediaKind, PeerTransport};
use crate::protocol::UserInfo;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Negotiation state of one peer link. `Idle` only exists between link
/// creation and the first description exchange; a missing link table entry
/// means no negotiation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    OfferSent,
    OfferReceived,
    Answered,
    Connected,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::OfferSent => write!(f, "offer-sent"),
            LinkState::OfferReceived => write!(f, "offer-received"),
            LinkState::Answered => write!(f, "answered"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

impl LinkState {
    /// States whose outgoing media is live enough to retarget (screen
    /// share swap applies to these).
    pub fn has_outgoing_media(self) -> bool {
        matches!(
            self,
            LinkState::OfferSent | LinkState::Answered | LinkState::Connected
        )
    }
}

/// Health of the underlying transport, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHealth {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportHealth {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportHealth::Disconnected | TransportHealth::Failed | TransportHealth::Closed
        )
    }
}

/// Notifications from a link backend to the engine.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A locally gathered ICE candidate ready to trickle to the peer.
    LocalCandidate {
        connection_id: String,
        candidate: Value,
    },
    /// Transport-level connection state change.
    Health {
        connection_id: String,
        health: TransportHealth,
    },
    /// A remote media track arrived.
    RemoteMedia {
        connection_id: String,
        stream_id: String,
        kind: MediaKind,
    },
}

/// One client-side handle to a direct media connection with one remote
/// participant. Owned by the engine; never shared across tasks.
pub struct PeerLink {
    pub connection_id: String,
    pub remote_user: UserInfo,
    pub state: LinkState,
    pub(crate) transport: Arc<dyn PeerTransport>,
    /// Remote stream ids observed on this link.
    pub remote_streams: Vec<String>,
    remote_ready: bool,
    queued_candidates: Vec<Value>,
}

impl PeerLink {
    pub(crate) fn new(
        connection_id: String,
        remote_user: UserInfo,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            connection_id,
            remote_user,
            state: LinkState::Idle,
            transport,
            remote_streams: Vec::new(),
            remote_ready: false,
            queued_candidates: Vec::new(),
        }
    }

    /// Apply a remote candidate now, or queue it until the remote
    /// description lands. Application failures are logged and tolerated —
    /// one bad candidate does not end a negotiation.
    pub(crate) async fn push_candidate(&mut self, candidate: Value) {
        if self.remote_ready {
            if let Err(err) = self.transport.add_remote_candidate(candidate).await {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "failed to apply remote candidate"
                );
            }
        } else {
            self.queued_candidates.push(candidate);
        }
    }

    /// Mark the remote description applied and flush queued candidates in
    /// arrival order.
    pub(crate) async fn remote_description_applied(&mut self) {
        self.remote_ready = true;
        for candidate in std::mem::take(&mut self.queued_candidates) {
            if let Err(err) = self.transport.add_remote_candidate(candidate).await {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "failed to apply queued candidate"
                );
            }
        }
    }
}
