//! Meeting signaling server and full-mesh negotiation engine.
//!
//! The server side (`handlers`, `state`, `chat`) tracks room membership,
//! relays WebRTC handshake messages between peers and keeps a per-meeting
//! chat log. The client side (`engine`) drives one peer link per remote
//! participant: offer/answer exchange, ICE trickling, teardown and in-place
//! track replacement for screen sharing. Media never flows through the
//! server.

pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod state;
