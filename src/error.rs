//! Engine error taxonomy.
//!
//! Nothing here is fatal to a session: a negotiation error closes the one
//! affected link and the room carries on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Failure inside the underlying peer transport.
    #[error("peer transport error: {0}")]
    Transport(#[from] webrtc::Error),

    /// Offer/answer exchange failed for one link.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A session description or candidate that did not decode.
    #[error("malformed signaling payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The signaling channel to the server is gone.
    #[error("signaling channel closed")]
    SignalingClosed,
}
