//! `webrtc`-crate backed peer links.
//!
//! One [`RtcLinkFactory`] per session builds the API object once and opens
//! one `RTCPeerConnection` per remote participant, wiring its callbacks
//! into [`LinkEvent`]s. Media capture itself lives outside this crate; a
//! [`LocalTracks`] only holds the sample-track handles the capture pipeline
//! writes into, so screen-share swaps are plain `replace_track` calls.

use crate::engine::link::{LinkEvent, TransportHealth};
use crate::engine::media::{LinkFactory, MediaKind, PeerTransport, VideoSource};
use crate::error::EngineError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Local outgoing track handles. The capture pipeline writes samples into
/// them; links attach them at open and retarget video in place.
pub struct LocalTracks {
    audio: Option<Arc<TrackLocalStaticSample>>,
    camera: Option<Arc<TrackLocalStaticSample>>,
    screen: Mutex<Option<Arc<TrackLocalStaticSample>>>,
}

impl LocalTracks {
    pub fn new(
        audio: Option<Arc<TrackLocalStaticSample>>,
        camera: Option<Arc<TrackLocalStaticSample>>,
    ) -> Self {
        Self {
            audio,
            camera,
            screen: Mutex::new(None),
        }
    }

    /// Opus audio track with the given track id.
    pub fn opus_track(id: &str) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            id.to_owned(),
            "meetmesh".to_owned(),
        ))
    }

    /// VP8 video track with the given track id.
    pub fn vp8_track(id: &str) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            id.to_owned(),
            "meetmesh".to_owned(),
        ))
    }

    /// Install or clear the screen-capture track. Clearing it means a swap
    /// back to the camera is the only remaining video source.
    pub fn set_screen_track(&self, track: Option<Arc<TrackLocalStaticSample>>) {
        *self.screen.lock().unwrap() = track;
    }

    fn video_for(&self, source: VideoSource) -> Option<Arc<TrackLocalStaticSample>> {
        match source {
            VideoSource::Camera => self.camera.clone(),
            VideoSource::Screen => self.screen.lock().unwrap().clone(),
        }
    }
}

/// Opens `webrtc`-crate peer connections for the engine.
pub struct RtcLinkFactory {
    api: API,
    stun_servers: Vec<String>,
    tracks: Arc<LocalTracks>,
}

impl RtcLinkFactory {
    pub fn new(stun_servers: Vec<String>, tracks: Arc<LocalTracks>) -> Result<Self, EngineError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let api = APIBuilder::new().with_media_engine(media_engine).build();

        Ok(Self {
            api,
            stun_servers,
            tracks,
        })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl LinkFactory for RtcLinkFactory {
    async fn open_link(
        &self,
        connection_id: &str,
        events: UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn PeerTransport>, EngineError> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        if let Some(audio) = &self.tracks.audio {
            pc.add_track(Arc::clone(audio) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
        }
        let mut video_sender: Option<Arc<RTCRtpSender>> = None;
        if let Some(camera) = &self.tracks.camera {
            video_sender = Some(
                pc.add_track(Arc::clone(camera) as Arc<dyn TrackLocal + Send + Sync>)
                    .await?,
            );
        }

        let id = connection_id.to_string();
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let id = id.clone();
            let tx = tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json().map(serde_json::to_value) {
                    Ok(Ok(value)) => {
                        let _ = tx.send(LinkEvent::LocalCandidate {
                            connection_id: id,
                            candidate: value,
                        });
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "local candidate did not encode");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "local candidate did not encode");
                    }
                }
            })
        }));

        let id = connection_id.to_string();
        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let id = id.clone();
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(LinkEvent::Health {
                    connection_id: id,
                    health: health_of(state),
                });
            })
        }));

        let id = connection_id.to_string();
        let tx = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = if track.kind() == RTPCodecType::Video {
                MediaKind::Video
            } else {
                MediaKind::Audio
            };
            let _ = tx.send(LinkEvent::RemoteMedia {
                connection_id: id.clone(),
                stream_id: track.stream_id(),
                kind,
            });
            Box::pin(async {})
        }));

        Ok(Arc::new(RtcLink {
            pc,
            video_sender,
            tracks: Arc::clone(&self.tracks),
        }))
    }
}

fn health_of(state: RTCPeerConnectionState) -> TransportHealth {
    match state {
        RTCPeerConnectionState::Connecting => TransportHealth::Connecting,
        RTCPeerConnectionState::Connected => TransportHealth::Connected,
        RTCPeerConnectionState::Disconnected => TransportHealth::Disconnected,
        RTCPeerConnectionState::Failed => TransportHealth::Failed,
        RTCPeerConnectionState::Closed => TransportHealth::Closed,
        _ => TransportHealth::New,
    }
}

/// One `RTCPeerConnection` wrapped as a [`PeerTransport`].
pub struct RtcLink {
    pc: Arc<RTCPeerConnection>,
    video_sender: Option<Arc<RTCRtpSender>>,
    tracks: Arc<LocalTracks>,
}

#[async_trait]
impl PeerTransport for RtcLink {
    async fn create_offer(&self) -> Result<Value, EngineError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(serde_json::to_value(&offer)?)
    }

    async fn accept_offer(&self, offer: Value) -> Result<Value, EngineError> {
        let offer: RTCSessionDescription = serde_json::from_value(offer)?;
        self.pc.set_remote_description(offer).await?;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(serde_json::to_value(&answer)?)
    }

    async fn accept_answer(&self, answer: Value) -> Result<(), EngineError> {
        let answer: RTCSessionDescription = serde_json::from_value(answer)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), EngineError> {
        let init: RTCIceCandidateInit = serde_json::from_value(candidate)?;
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn set_video_source(&self, source: VideoSource) -> Result<bool, EngineError> {
        let Some(sender) = &self.video_sender else {
            return Ok(false);
        };
        let Some(track) = self.tracks.video_for(source) else {
            return Ok(false);
        };
        sender
            .replace_track(Some(track as Arc<dyn TrackLocal + Send + Sync>))
            .await?;
        Ok(true)
    }

    async fn close(&self) {
        if let Err(err) = self.pc.close().await {
            tracing::debug!(error = %err, "peer connection close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn factory() -> RtcLinkFactory {
        let tracks = Arc::new(LocalTracks::new(
            Some(LocalTracks::opus_track("mic")),
            Some(LocalTracks::vp8_track("cam")),
        ));
        RtcLinkFactory::new(vec!["stun:stun.l.google.com:19302".to_string()], tracks).unwrap()
    }

    #[tokio::test]
    async fn link_produces_a_serializable_offer() {
        let factory = factory();
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = factory.open_link("peer", tx).await.unwrap();

        let offer = link.create_offer().await.unwrap();
        assert_eq!(offer["type"], "offer");
        assert!(offer["sdp"].as_str().unwrap().starts_with("v=0"));

        link.close().await;
    }

    #[tokio::test]
    async fn offer_answer_round_trip_between_two_links() {
        let factory = factory();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = factory.open_link("a", tx_a).await.unwrap();
        let b = factory.open_link("b", tx_b).await.unwrap();

        let offer = a.create_offer().await.unwrap();
        let answer = b.accept_offer(offer).await.unwrap();
        assert_eq!(answer["type"], "answer");
        a.accept_answer(answer).await.unwrap();

        assert!(a.set_video_source(VideoSource::Camera).await.unwrap());

        a.close().await;
        b.close().await;
    }

    #[tokio::test]
    async fn video_swap_without_a_sender_or_track_is_a_noop() {
        let tracks = Arc::new(LocalTracks::new(Some(LocalTracks::opus_track("mic")), None));
        let factory =
            RtcLinkFactory::new(vec!["stun:stun.l.google.com:19302".to_string()], tracks).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = factory.open_link("peer", tx).await.unwrap();

        // Audio-only session: no video sender at all.
        assert!(!link.set_video_source(VideoSource::Screen).await.unwrap());

        link.close().await;
    }

    #[tokio::test]
    async fn screen_track_installs_and_clears() {
        let tracks = Arc::new(LocalTracks::new(None, Some(LocalTracks::vp8_track("cam"))));
        let factory = RtcLinkFactory::new(
            vec!["stun:stun.l.google.com:19302".to_string()],
            Arc::clone(&tracks),
        )
        .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = factory.open_link("peer", tx).await.unwrap();

        // No screen track installed yet: the swap has no source to use.
        assert!(!link.set_video_source(VideoSource::Screen).await.unwrap());

        tracks.set_screen_track(Some(LocalTracks::vp8_track("screen")));
        assert!(link.set_video_source(VideoSource::Screen).await.unwrap());

        tracks.set_screen_track(None);
        assert!(link.set_video_source(VideoSource::Camera).await.unwrap());

        link.close().await;
    }
}
