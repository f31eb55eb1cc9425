//! Client-side negotiation engine.
//!
//! One [`MeshEngine`] per joined meeting drives a full mesh: one peer link
//! per remote participant, negotiated over the signaling relay. The engine
//! is an actor — a single driver task owns it and feeds it server messages,
//! backend link events and local commands, so no two transitions for the
//! same link ever interleave.

pub mod link;
pub mod media;
pub mod rtc;

use crate::error::EngineError;
use crate::protocol::{ChatMessage, ClientMessage, Participant, ServerMessage, UserInfo};
use link::{LinkEvent, LinkState, PeerLink};
use media::{LinkFactory, MediaKind, PeerTransport, VideoSource};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Events the engine surfaces to its consumer (UI layer, recorder, ...).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Pre-join participant snapshot, as received.
    Participants(Vec<Participant>),
    /// A participant arrived after us.
    PeerJoined {
        connection_id: String,
        user: UserInfo,
    },
    /// A participant left the meeting.
    PeerLeft { connection_id: String },
    /// A peer link was torn down; the view of that participant's media
    /// must be dropped with it.
    LinkClosed { connection_id: String },
    /// A remote media track arrived on a link.
    RemoteMedia {
        connection_id: String,
        stream_id: String,
        kind: MediaKind,
    },
    /// Chat history replayed at join.
    ChatHistory(Vec<ChatMessage>),
    /// A live chat message.
    Chat(ChatMessage),
}

/// Local commands fed to the engine's driver loop.
#[derive(Debug)]
pub enum EngineCommand {
    /// Local media capture finished; drain the pending-offer queue.
    MediaReady,
    /// Start (`true`) or end (`false`) screen sharing.
    ScreenShare(bool),
    /// Send a chat message to the meeting.
    SendChat(String),
    /// Leave the meeting and release every link.
    Leave,
}

/// Full-mesh negotiation engine for one meeting session.
pub struct MeshEngine {
    meeting_id: String,
    local_user: UserInfo,
    local_connection_id: Option<String>,
    factory: Arc<dyn LinkFactory>,
    signals: UnboundedSender<ClientMessage>,
    events: UnboundedSender<EngineEvent>,
    link_events: UnboundedSender<LinkEvent>,
    links: HashMap<String, PeerLink>,
    pending: VecDeque<Participant>,
    media_available: bool,
    sharing_screen: bool,
}

impl MeshEngine {
    /// Build an engine. The returned receiver carries backend link events
    /// and must be polled by the same task that feeds the engine (see
    /// [`run`]).
    pub fn new(
        meeting_id: impl Into<String>,
        local_user: UserInfo,
        factory: Arc<dyn LinkFactory>,
        signals: UnboundedSender<ClientMessage>,
        events: UnboundedSender<EngineEvent>,
    ) -> (Self, UnboundedReceiver<LinkEvent>) {
        let (link_events, link_rx) = mpsc::unbounded_channel();
        (
            Self {
                meeting_id: meeting_id.into(),
                local_user,
                local_connection_id: None,
                factory,
                signals,
                events,
                link_events,
                links: HashMap::new(),
                pending: VecDeque::new(),
                media_available: false,
                sharing_screen: false,
            },
            link_rx,
        )
    }

    /// Request to join the meeting.
    pub fn join(&self) -> Result<(), EngineError> {
        self.signals
            .send(ClientMessage::JoinMeeting {
                meeting_id: self.meeting_id.clone(),
                user: self.local_user.clone(),
            })
            .map_err(|_| EngineError::SignalingClosed)
    }

    /// Send a chat message through the relay.
    pub fn send_chat(&self, text: String) -> Result<(), EngineError> {
        self.signals
            .send(ClientMessage::ChatMessage {
                meeting_id: self.meeting_id.clone(),
                user: self.local_user.clone(),
                text,
            })
            .map_err(|_| EngineError::SignalingClosed)
    }

    /// Negotiation state of the link for `connection_id`, if one exists.
    pub fn link_state(&self, connection_id: &str) -> Option<LinkState> {
        self.links.get(connection_id).map(|link| link.state)
    }

    /// Number of peers waiting for local media before they get an offer.
    pub fn pending_offers(&self) -> usize {
        self.pending.len()
    }

    /// Dispatch one message from the server.
    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { connection_id } => {
                tracing::debug!(connection_id = %connection_id, "signaling connection established");
                self.local_connection_id = Some(connection_id);
            }
            ServerMessage::HeartbeatAck => {}
            ServerMessage::MeetingParticipants(participants) => {
                let _ = self
                    .events
                    .send(EngineEvent::Participants(participants.clone()));
                for participant in participants {
                    if Some(&participant.connection_id) == self.local_connection_id.as_ref() {
                        continue;
                    }
                    self.peer_discovered(participant).await;
                }
            }
            ServerMessage::UserJoined {
                connection_id,
                user,
            } => {
                let _ = self.events.send(EngineEvent::PeerJoined {
                    connection_id: connection_id.clone(),
                    user: user.clone(),
                });
                self.peer_discovered(Participant {
                    connection_id,
                    user,
                })
                .await;
            }
            ServerMessage::UserLeft { connection_id } => {
                self.pending.retain(|p| p.connection_id != connection_id);
                let _ = self.events.send(EngineEvent::PeerLeft {
                    connection_id: connection_id.clone(),
                });
                self.close_link(&connection_id).await;
            }
            ServerMessage::WebrtcOffer {
                from,
                sdp,
                from_user,
            } => {
                self.handle_remote_offer(from, sdp, from_user).await;
            }
            ServerMessage::WebrtcAnswer { from, sdp } => {
                self.handle_remote_answer(&from, sdp).await;
            }
            ServerMessage::IceCandidate { from, candidate } => {
                match self.links.get_mut(&from) {
                    Some(link) => link.push_candidate(candidate).await,
                    None => {
                        tracing::debug!(connection_id = %from, "candidate for unknown link dropped");
                    }
                }
            }
            ServerMessage::ChatHistory(history) => {
                let _ = self.events.send(EngineEvent::ChatHistory(history));
            }
            ServerMessage::ChatMessage(message) => {
                let _ = self.events.send(EngineEvent::Chat(message));
            }
        }
    }

    /// Dispatch one event from a link backend.
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::LocalCandidate {
                connection_id,
                candidate,
            } => {
                if self.links.contains_key(&connection_id) {
                    let _ = self.signals.send(ClientMessage::IceCandidate {
                        to: connection_id,
                        candidate,
                    });
                } else {
                    tracing::debug!(connection_id = %connection_id, "local candidate for closed link dropped");
                }
            }
            LinkEvent::Health {
                connection_id,
                health,
            } => {
                tracing::debug!(connection_id = %connection_id, ?health, "link health changed");
                if health.is_terminal() {
                    self.close_link(&connection_id).await;
                }
            }
            LinkEvent::RemoteMedia {
                connection_id,
                stream_id,
                kind,
            } => {
                let Some(link) = self.links.get_mut(&connection_id) else {
                    return;
                };
                if !link.remote_streams.contains(&stream_id) {
                    link.remote_streams.push(stream_id.clone());
                }
                let _ = self.events.send(EngineEvent::RemoteMedia {
                    connection_id,
                    stream_id,
                    kind,
                });
            }
        }
    }

    /// Local media became available: drain the pending queue exactly once,
    /// FIFO, each entry getting its offer.
    pub async fn media_ready(&mut self) {
        if self.media_available {
            return;
        }
        self.media_available = true;
        while let Some(participant) = self.pending.pop_front() {
            if self.links.contains_key(&participant.connection_id) {
                // The peer offered first while it sat in the queue.
                continue;
            }
            self.send_offer(participant).await;
        }
    }

    /// Swap the outgoing video source in place on every link with live
    /// outgoing media. No new offer/answer round trip.
    pub async fn set_screen_share(&mut self, active: bool) {
        if self.sharing_screen == active {
            return;
        }
        self.sharing_screen = active;
        let source = if active {
            VideoSource::Screen
        } else {
            VideoSource::Camera
        };

        let targets: Vec<(String, Arc<dyn PeerTransport>)> = self
            .links
            .values()
            .filter(|link| link.state.has_outgoing_media())
            .map(|link| (link.connection_id.clone(), link.transport.clone()))
            .collect();

        let mut failed = Vec::new();
        for (connection_id, transport) in targets {
            match transport.set_video_source(source).await {
                Ok(true) => {
                    tracing::debug!(connection_id = %connection_id, ?source, "video source replaced");
                }
                Ok(false) => {
                    tracing::debug!(connection_id = %connection_id, "link has no video sender");
                }
                Err(err) => {
                    tracing::warn!(connection_id = %connection_id, error = %err, "video source swap failed");
                    failed.push(connection_id);
                }
            }
        }
        for connection_id in failed {
            self.close_link(&connection_id).await;
        }
    }

    /// Leave the meeting: cancel every outstanding negotiation and release
    /// all links immediately.
    pub async fn leave(&mut self) {
        let _ = self.signals.send(ClientMessage::LeaveMeeting);
        self.pending.clear();
        let links: Vec<(String, PeerLink)> = self.links.drain().collect();
        for (connection_id, link) in links {
            link.transport.close().await;
            let _ = self.events.send(EngineEvent::LinkClosed { connection_id });
        }
        tracing::info!(meeting_id = %self.meeting_id, "left meeting");
    }

    async fn peer_discovered(&mut self, participant: Participant) {
        if self.links.contains_key(&participant.connection_id) {
            tracing::debug!(
                connection_id = %participant.connection_id,
                "peer already has a link, discovery ignored"
            );
            return;
        }
        if !self.media_available {
            if !self
                .pending
                .iter()
                .any(|p| p.connection_id == participant.connection_id)
            {
                tracing::debug!(
                    connection_id = %participant.connection_id,
                    "local media not ready, offer queued"
                );
                self.pending.push_back(participant);
            }
            return;
        }
        self.send_offer(participant).await;
    }

    async fn send_offer(&mut self, participant: Participant) {
        if self.links.contains_key(&participant.connection_id) {
            return;
        }
        let connection_id = participant.connection_id.clone();

        let transport = match self
            .factory
            .open_link(&connection_id, self.link_events.clone())
            .await
        {
            Ok(transport) => transport,
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "failed to open link");
                return;
            }
        };

        let offer = match transport.create_offer().await {
            Ok(offer) => offer,
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "offer creation failed");
                transport.close().await;
                return;
            }
        };

        let _ = self.signals.send(ClientMessage::WebrtcOffer {
            to: connection_id.clone(),
            sdp: offer,
            from_user: Some(self.local_user.clone()),
        });

        let mut link = PeerLink::new(connection_id.clone(), participant.user, transport);
        link.state = LinkState::OfferSent;
        self.links.insert(connection_id.clone(), link);

        tracing::debug!(connection_id = %connection_id, "offer sent");
    }

    async fn handle_remote_offer(&mut self, from: String, sdp: Value, from_user: Option<UserInfo>) {
        if self.links.contains_key(&from) {
            // Glare: both sides offered at once. The existing link wins,
            // the incoming duplicate is ignored.
            tracing::warn!(connection_id = %from, "offer for existing link ignored");
            return;
        }

        let remote_user = from_user
            .or_else(|| {
                self.pending
                    .iter()
                    .find(|p| p.connection_id == from)
                    .map(|p| p.user.clone())
            })
            .unwrap_or_else(|| UserInfo {
                id: from.clone(),
                name: String::new(),
            });

        let transport = match self
            .factory
            .open_link(&from, self.link_events.clone())
            .await
        {
            Ok(transport) => transport,
            Err(err) => {
                tracing::warn!(connection_id = %from, error = %err, "failed to open link for offer");
                return;
            }
        };

        let mut link = PeerLink::new(from.clone(), remote_user, transport.clone());
        link.state = LinkState::OfferReceived;

        let answer = match transport.accept_offer(sdp).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(connection_id = %from, error = %err, "answer creation failed");
                transport.close().await;
                return;
            }
        };
        link.remote_description_applied().await;

        let _ = self.signals.send(ClientMessage::WebrtcAnswer {
            to: from.clone(),
            sdp: answer,
        });

        link.state = LinkState::Answered;
        self.links.insert(from.clone(), link);

        tracing::debug!(connection_id = %from, "offer answered");
    }

    async fn handle_remote_answer(&mut self, from: &str, sdp: Value) {
        let transport = match self.links.get(from) {
            Some(link) if link.state == LinkState::OfferSent => link.transport.clone(),
            Some(link) => {
                tracing::debug!(
                    connection_id = %from,
                    state = %link.state,
                    "answer without outstanding offer ignored"
                );
                return;
            }
            None => {
                tracing::debug!(connection_id = %from, "answer for unknown link ignored");
                return;
            }
        };

        match transport.accept_answer(sdp).await {
            Ok(()) => {
                if let Some(link) = self.links.get_mut(from) {
                    link.state = LinkState::Connected;
                    link.remote_description_applied().await;
                    tracing::debug!(connection_id = %from, "answer applied, link connected");
                }
            }
            Err(err) => {
                tracing::warn!(connection_id = %from, error = %err, "applying answer failed");
                self.close_link(from).await;
            }
        }
    }

    async fn close_link(&mut self, connection_id: &str) {
        if let Some(mut link) = self.links.remove(connection_id) {
            link.state = LinkState::Closed;
            link.transport.close().await;
            let _ = self.events.send(EngineEvent::LinkClosed {
                connection_id: connection_id.to_string(),
            });
            tracing::info!(connection_id = %connection_id, "peer link closed");
        }
    }
}

/// Drive an engine until the meeting ends: the signaling channel closes, the
/// command channel closes, or an explicit [`EngineCommand::Leave`] arrives.
/// Single task, so every transition for one link is serialized.
pub async fn run(
    mut engine: MeshEngine,
    mut server_rx: UnboundedReceiver<ServerMessage>,
    mut link_rx: UnboundedReceiver<LinkEvent>,
    mut commands: UnboundedReceiver<EngineCommand>,
) {
    if engine.join().is_err() {
        return;
    }

    loop {
        tokio::select! {
            message = server_rx.recv() => match message {
                Some(message) => engine.handle_server_message(message).await,
                None => {
                    // Transport gone; release everything.
                    engine.leave().await;
                    break;
                }
            },
            event = link_rx.recv() => match event {
                Some(event) => engine.handle_link_event(event).await,
                // Unreachable while the engine holds its sender clone.
                None => break,
            },
            command = commands.recv() => match command {
                Some(EngineCommand::MediaReady) => engine.media_ready().await,
                Some(EngineCommand::ScreenShare(active)) => engine.set_screen_share(active).await,
                Some(EngineCommand::SendChat(text)) => {
                    if engine.send_chat(text).is_err() {
                        tracing::warn!("chat dropped, signaling channel closed");
                    }
                }
                Some(EngineCommand::Leave) | None => {
                    engine.leave().await;
                    break;
                }
            },
        }
    }
}
