//! Seams between the negotiation engine and its collaborators.
//!
//! The engine drives negotiation purely through these traits; the concrete
//! WebRTC stack lives behind [`LinkFactory`]/[`PeerTransport`] (see
//! [`crate::engine::rtc`]) and tests substitute mocks.

use crate::engine::link::LinkEvent;
use crate::error::EngineError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Opens one peer transport per remote participant. Events for the opened
/// link (local candidates, health changes, remote media) flow back through
/// the provided sender.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn open_link(
        &self,
        connection_id: &str,
        events: UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn PeerTransport>, EngineError>;
}

/// One direct media connection under negotiation. Descriptions and
/// candidates are opaque JSON — the engine never interprets them either.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the local offer and apply it as the local description.
    async fn create_offer(&self) -> Result<Value, EngineError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(&self, offer: Value) -> Result<Value, EngineError>;

    /// Apply a remote answer to a previously sent offer.
    async fn accept_answer(&self, answer: Value) -> Result<(), EngineError>;

    /// Apply a trickled remote ICE candidate.
    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), EngineError>;

    /// Swap the outgoing video track in place, without renegotiating.
    /// Returns `false` when the link has no video sender (a no-op, not an
    /// error).
    async fn set_video_source(&self, source: VideoSource) -> Result<bool, EngineError>;

    /// Release the transport and every media resource it holds.
    async fn close(&self);
}

/// Which local track feeds the outgoing video sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Camera,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}
