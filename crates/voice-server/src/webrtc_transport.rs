//! Browser voice path: DTLS/SCTP DataChannel bring-up via the `webrtc` crate,
//! with the WebSocket-fallback audio path handled purely through
//! `audio_sink.rs` once `signaling_hub.rs` flips a session over to it.
//!
//! One [`WebRtcTransport`] per server, holding the once-configured `API` and
//! ICE server list; one [`RTCPeerConnection`] per session, created inside
//! [`WebRtcTransport::accept_offer`]. The `webrtc` crate mints a fresh
//! self-signed DTLS certificate per `RTCPeerConnection` on its own, which is
//! what gives each session its own fingerprint without any code here.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use voice_protocol::audio_frame::AudioFrame;
use voice_protocol::ids::SessionId;
use voice_protocol::signaling::{IceCandidateData, ServerMessage};

use crate::app_state::AppState;
use crate::audio_sink::{AudioEgress, AudioSink};
use crate::config::ServerConfig;
use crate::router;
use crate::settings::ServerSettings;

#[derive(Debug, Error)]
pub enum WebRtcError {
    #[error("webrtc internal error: {0}")]
    Lib(#[from] webrtc::Error),
    #[error("no active session for this connection")]
    UnknownSession,
}

/// Answers browser offers and shepherds the resulting DataChannel's audio
/// into the same [`router::route`] path the UDP transport uses.
pub struct WebRtcTransport {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    peer_connections: DashMap<SessionId, Arc<RTCPeerConnection>>,
}

impl WebRtcTransport {
    /// Builds the `MediaEngine`/`SettingEngine`/`APIBuilder` stack once for
    /// the whole server's lifetime; ICE port range and STUN list come from
    /// config/settings rather than per-connection.
    pub fn new(config: &ServerConfig, settings: &ServerSettings) -> Result<Self, WebRtcError> {
        let media_engine = MediaEngine::default();
        let mut registry = Registry::new();
        let mut media_engine = media_engine;
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_ephemeral_udp_port_range(config.ice_port_min, config.ice_port_max)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = settings
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        Ok(Self {
            api,
            ice_servers,
            peer_connections: DashMap::new(),
        })
    }

    /// Builds a fresh peer connection for `session_id`, wires up its
    /// ICE/state/DataChannel callbacks, applies the client's SDP offer, and
    /// returns the server's SDP answer. ICE candidates trickle separately
    /// through `on_ice_candidate`/`add_ice_candidate`.
    pub async fn accept_offer(&self, state: Arc<AppState>, session_id: SessionId, offer_sdp: String) -> Result<String, WebRtcError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let peer_connection = Arc::new(self.api.new_peer_connection(config).await?);

        self.register_ice_candidate_handler(&peer_connection, state.clone(), session_id);
        self.register_connection_state_handler(&peer_connection, session_id);
        self.register_data_channel_handler(&peer_connection, state, session_id);

        let offer = RTCSessionDescription::offer(offer_sdp)?;
        peer_connection.set_remote_description(offer).await?;
        let answer = peer_connection.create_answer(None).await?;
        peer_connection.set_local_description(answer.clone()).await?;

        self.peer_connections.insert(session_id, peer_connection);
        Ok(answer.sdp)
    }

    /// Feeds a trickled remote ICE candidate from the client into its peer
    /// connection. A missing peer connection (candidate arrived before the
    /// offer, or after teardown) is logged and otherwise ignored.
    pub async fn add_ice_candidate(&self, session_id: SessionId, candidate: IceCandidateData) -> Result<(), WebRtcError> {
        let Some(pc) = self.peer_connections.get(&session_id).map(|e| e.value().clone()) else {
            return Err(WebRtcError::UnknownSession);
        };
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        pc.add_ice_candidate(init).await?;
        Ok(())
    }

    /// Tears down and forgets a session's peer connection, if any.
    pub async fn close_session(&self, session_id: SessionId) {
        if let Some((_, pc)) = self.peer_connections.remove(&session_id) {
            if let Err(err) = pc.close().await {
                warn!(%err, "error closing webrtc peer connection");
            }
        }
    }

    fn register_ice_candidate_handler(&self, pc: &Arc<RTCPeerConnection>, state: Arc<AppState>, session_id: SessionId) {
        pc.on_ice_candidate(Box::new(move |candidate| {
            let state = state.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(%session_id, "ICE gathering complete");
                    return;
                };
                let Ok(json) = candidate.to_json() else { return };
                let Some(session) = state.sessions.get(session_id) else { return };
                let _ = session.signal_tx.send(ServerMessage::IceCandidate(IceCandidateData {
                    candidate: json.candidate,
                    sdp_mid: json.sdp_mid,
                    sdp_m_line_index: json.sdp_mline_index,
                }));
            })
        }));
    }

    fn register_connection_state_handler(&self, pc: &Arc<RTCPeerConnection>, session_id: SessionId) {
        pc.on_peer_connection_state_change(Box::new(move |connection_state: RTCPeerConnectionState| {
            match connection_state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                    debug!(%session_id, ?connection_state, "webrtc peer connection ended");
                }
                _ => {}
            }
            Box::pin(async {})
        }));
    }

    /// The client negotiates the `"audio"` DataChannel as part of its offer,
    /// so the server only ever observes it arrive here — it never creates
    /// one itself.
    fn register_data_channel_handler(&self, pc: &Arc<RTCPeerConnection>, state: Arc<AppState>, session_id: SessionId) {
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let state = state.clone();
            Box::pin(async move {
                if dc.label() != "audio" {
                    return;
                }
                let open_state = state.clone();
                let open_dc = dc.clone();
                dc.on_open(Box::new(move || {
                    open_state.sessions.set_audio_egress(session_id, AudioEgress::spawn(AudioSink::DataChannel(open_dc.clone())));
                    Box::pin(async {})
                }));

                let message_state = state.clone();
                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    let state = message_state.clone();
                    Box::pin(async move { handle_audio_message(state, session_id, msg).await })
                }));
            })
        }));
    }
}

async fn handle_audio_message(state: Arc<AppState>, session_id: SessionId, msg: DataChannelMessage) {
    let frame = match AudioFrame::from_bytes(&msg.data) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%session_id, %err, "malformed audio frame on datachannel");
            return;
        }
    };
    let Some(session) = state.sessions.get(session_id) else {
        return;
    };
    let Some(sender_player_id) = session.player_id else {
        return;
    };
    let sender_obfuscated_id = session.obfuscated_id;
    drop(session);

    let settings = state.settings_snapshot().await;
    let routed = router::route(
        session_id,
        frame,
        &state.sessions,
        &state.positions,
        &state.groups,
        settings.default_proximity_distance,
        settings.server_side_pcm_gain,
    );
    router::dispatch(routed, &state.sessions, sender_player_id, sender_obfuscated_id);
}
