//! Native-client UDP voice path: binary framing, address learning, and NAT
//! rebinding. Grounded on the teacher's `udp.rs` recv loop and address-
//! learning table, generalized from a single voice channel to proximity
//! routing across the whole player set.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use voice_protocol::audio_frame::AudioFrame;
use voice_protocol::group::GroupSettings;
use voice_protocol::ids::{ObfuscatedId, PlayerId};
use voice_protocol::session::AudioCodec;
use voice_protocol::udp_packet::{
    AudioPacket, AuthAckPacket, AuthAckReason, AuthPacket, DisconnectPacket, GroupListPacket, GroupOpKind,
    GroupOpPacket, UdpPacket,
};

use crate::app_state::AppState;
use crate::audio_sink::{AudioEgress, AudioSink, EgressFrame};
use crate::router;

const MAX_UDP_PACKET_SIZE: usize = 1500;

/// `PlayerId -> SocketAddr` learned from the first valid AUTH/AUDIO packet;
/// mirrors the session registry's notion of "this player's remote address"
/// without coupling `SessionRegistry` to any one transport's addressing.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    state: Arc<AppState>,
    addr_by_player: Arc<DashMap<PlayerId, SocketAddr>>,
    player_by_addr: DashMap<SocketAddr, PlayerId>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, state: Arc<AppState>) -> Self {
        Self {
            socket,
            state,
            addr_by_player: Arc::new(DashMap::new()),
            player_by_addr: DashMap::new(),
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_UDP_PACKET_SIZE];
        loop {
            let (len, src_addr) = match self.socket.recv_from(&mut buf).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(%err, "UDP recv error");
                    continue;
                }
            };
            let data = &buf[..len];
            let packet = match UdpPacket::from_bytes(data) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(src = %src_addr, %err, "malformed UDP packet");
                    continue;
                }
            };
            self.dispatch(packet, src_addr).await;
        }
    }

    async fn dispatch(&self, packet: UdpPacket, src_addr: SocketAddr) {
        match packet {
            UdpPacket::Auth(auth) => self.handle_auth(auth, src_addr).await,
            UdpPacket::Audio(audio) => self.handle_audio(audio, src_addr, false).await,
            UdpPacket::TestAudio(audio) => self.handle_audio(audio, src_addr, true).await,
            UdpPacket::Disconnect(disconnect) => self.handle_disconnect(disconnect, src_addr).await,
            UdpPacket::GroupOp(op) => self.handle_group_op(op).await,
            UdpPacket::GroupList(GroupListPacket::Query) => self.handle_group_list_query(src_addr).await,
            other => {
                debug!(src = %src_addr, packet_type = other.type_byte(), "ignoring server-to-client packet type on inbound path");
            }
        }
    }

    /// Registers (or re-registers) the UDP address for a player who has
    /// already authenticated over signalling. The AUTH packet itself carries
    /// no credential — it only binds this specific socket address to a
    /// player who must already own an active session.
    async fn handle_auth(&self, auth: AuthPacket, src_addr: SocketAddr) {
        let Some(session_id) = self.state.sessions.session_for_player(auth.sender) else {
            self.send_auth_ack(src_addr, auth.sender, AuthAckReason::PlayerNotFound, "no active session for player").await;
            return;
        };
        let obfuscated_id = match self.state.sessions.get(session_id) {
            Some(session) => session.obfuscated_id,
            None => {
                self.send_auth_ack(src_addr, auth.sender, AuthAckReason::PlayerNotFound, "session vanished").await;
                return;
            }
        };
        self.bind_address(auth.sender, src_addr);
        self.state.sessions.set_audio_egress(
            session_id,
            AudioEgress::spawn(AudioSink::Udp {
                socket: self.socket.clone(),
                addr_by_player: self.addr_by_player.clone(),
                recipient_player_id: auth.sender,
            }),
        );
        let settings = self.state.settings_snapshot().await;
        let selected = if auth.requested_sample_rate == settings.sample_rate {
            auth.requested_sample_rate
        } else {
            settings.sample_rate
        };
        let ack = UdpPacket::AuthAck(AuthAckPacket {
            client: obfuscated_id,
            reason: AuthAckReason::Accepted,
            message: String::new(),
            selected_sample_rate: selected,
        });
        self.send(&ack, src_addr).await;
    }

    async fn send_auth_ack(&self, src_addr: SocketAddr, sender: PlayerId, reason: AuthAckReason, message: &str) {
        let obfuscated_id = ObfuscatedId::from_bytes(sender.to_bytes()[..12].try_into().unwrap());
        let ack = UdpPacket::AuthAck(AuthAckPacket {
            client: obfuscated_id,
            reason,
            message: message.to_string(),
            selected_sample_rate: 0,
        });
        self.send(&ack, src_addr).await;
    }

    fn bind_address(&self, player_id: PlayerId, addr: SocketAddr) {
        if let Some(prior) = self.addr_by_player.insert(player_id, addr) {
            if prior != addr {
                self.player_by_addr.remove(&prior);
            }
        }
        self.player_by_addr.insert(addr, player_id);
    }

    /// NAT rebinding: if `src_addr` doesn't match the learned address for the
    /// packet's claimed sender but the address maps to a *different* known
    /// player, trust the address over the claim (matches teacher's
    /// address-wins address-learning table).
    fn resolve_sender(&self, claimed: PlayerId, src_addr: SocketAddr) -> Option<PlayerId> {
        if let Some(player_id) = self.player_by_addr.get(&src_addr) {
            return Some(*player_id);
        }
        if self.state.sessions.session_for_player(claimed).is_some() {
            self.bind_address(claimed, src_addr);
            debug!(player_id = %claimed, %src_addr, "learned UDP address for player");
            return Some(claimed);
        }
        None
    }

    async fn handle_audio(&self, audio: AudioPacket, src_addr: SocketAddr, bypass_proximity: bool) {
        let Some(sender_player_id) = self.resolve_sender(audio.sender, src_addr) else {
            warn!(src = %src_addr, "rejected UDP audio packet: unknown sender/address pairing");
            return;
        };
        let Some(session_id) = self.state.sessions.session_for_player(sender_player_id) else {
            return;
        };

        if bypass_proximity {
            self.broadcast_test_audio(sender_player_id, &audio).await;
            return;
        }

        let frame = match audio.codec {
            AudioCodec::PcmS16Le => AudioFrame::PcmPlain {
                sender_id: player_id_hex(sender_player_id),
                samples: pcm_from_le_payload(&audio.payload),
            },
            AudioCodec::Opus => AudioFrame::Opus {
                sender_id: player_id_hex(sender_player_id),
                proximity: None,
                gain: None,
                payload: audio.payload.clone(),
            },
        };

        let Some(sender_obfuscated_id) = self.state.sessions.get(session_id).map(|s| s.obfuscated_id) else {
            return;
        };

        let settings = self.state.settings_snapshot().await;
        let routed = router::route(
            session_id,
            frame,
            &self.state.sessions,
            &self.state.positions,
            &self.state.groups,
            settings.default_proximity_distance,
            settings.server_side_pcm_gain,
        );

        router::dispatch(routed, &self.state.sessions, sender_player_id, sender_obfuscated_id);
    }

    async fn broadcast_test_audio(&self, sender_player_id: PlayerId, audio: &AudioPacket) {
        let Some(sender_session_id) = self.state.sessions.session_for_player(sender_player_id) else {
            return;
        };
        let Some(sender_obfuscated_id) = self.state.sessions.get(sender_session_id).map(|s| s.obfuscated_id) else {
            return;
        };
        let frame = match audio.codec {
            AudioCodec::PcmS16Le => AudioFrame::PcmPlain {
                sender_id: player_id_hex(sender_player_id),
                samples: pcm_from_le_payload(&audio.payload),
            },
            AudioCodec::Opus => AudioFrame::Opus {
                sender_id: player_id_hex(sender_player_id),
                proximity: None,
                gain: None,
                payload: audio.payload.clone(),
            },
        };
        for (recipient_session_id, player_id) in self.state.sessions.active_sessions() {
            if player_id == sender_player_id {
                continue;
            }
            let Some(session) = self.state.sessions.get(recipient_session_id) else {
                continue;
            };
            let Some(egress) = &session.audio_egress else {
                continue;
            };
            egress.push(EgressFrame {
                frame: frame.clone(),
                sender_player_id,
                sender_obfuscated_id,
            });
        }
    }

    async fn handle_disconnect(&self, disconnect: DisconnectPacket, src_addr: SocketAddr) {
        let Some(player_id) = self.player_by_addr.get(&src_addr).map(|e| *e.value()) else {
            return;
        };
        let _ = disconnect;
        if let Some(addr) = self.addr_by_player.remove(&player_id) {
            self.player_by_addr.remove(&addr.1);
        }
        if let Some(session_id) = self.state.sessions.session_for_player(player_id) {
            let _ = self.state.groups.leave(player_id);
            self.state.positions.remove(player_id);
            self.state.sessions.remove(session_id);
        }
    }

    async fn handle_group_op(&self, op: GroupOpPacket) {
        match op.op {
            GroupOpKind::Create => {
                let settings = GroupSettings::default();
                let result = self.state.groups.create(
                    op.name.unwrap_or_default(),
                    false,
                    op.player,
                    settings,
                    op.password,
                );
                if let Err(err) = result {
                    warn!(?err, player_id = %op.player, "group create rejected");
                }
            }
            GroupOpKind::Join => {
                let Some(group_id) = op.group_id else {
                    warn!(player_id = %op.player, "join op missing group id");
                    return;
                };
                if let Err(err) = self.state.groups.join(op.player, group_id, op.password.as_deref()) {
                    warn!(?err, player_id = %op.player, "group join rejected");
                }
            }
            GroupOpKind::Leave => {
                if let Err(err) = self.state.groups.leave(op.player) {
                    warn!(?err, player_id = %op.player, "group leave rejected");
                }
            }
        }
    }

    async fn handle_group_list_query(&self, src_addr: SocketAddr) {
        let response = UdpPacket::GroupList(GroupListPacket::Response(self.state.groups.list()));
        self.send(&response, src_addr).await;
    }

    async fn send(&self, packet: &UdpPacket, addr: SocketAddr) {
        let bytes = packet.to_bytes();
        if let Err(err) = self.socket.send_to(&bytes, addr).await {
            warn!(%addr, %err, "UDP send failed");
        }
    }
}

fn player_id_hex(id: PlayerId) -> String {
    id.to_bytes().iter().map(|b| format!("{:02x}", b)).collect()
}

fn pcm_from_le_payload(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use voice_protocol::position::PlayerPosition;

    use super::*;
    use crate::credential::InMemoryCredentialStore;
    use crate::settings::ServerSettings;

    async fn loopback_socket() -> Arc<UdpSocket> {
        Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap())
    }

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState::new(Box::new(InMemoryCredentialStore::new()), ServerSettings::default()))
    }

    fn active_session(state: &AppState, username: &str) -> PlayerId {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = state.sessions.new_session(username.into(), tx);
        let player_id = PlayerId::new_random();
        state.sessions.bind_player(session_id, player_id);
        player_id
    }

    #[tokio::test]
    async fn auth_binds_address_for_already_authenticated_player() {
        let state = app_state();
        let player_id = active_session(&state, "alice");
        let server_socket = loopback_socket().await;
        let server_addr = server_socket.local_addr().unwrap();
        let transport = Arc::new(UdpTransport::new(server_socket, state.clone()));

        let client_socket = loopback_socket().await;
        let auth = UdpPacket::Auth(AuthPacket {
            sender: player_id,
            username: "alice".into(),
            requested_sample_rate: 48000,
        });
        client_socket.send_to(&auth.to_bytes(), server_addr).await.unwrap();

        let mut buf = vec![0u8; 1500];
        let (len, src) = transport.socket.recv_from(&mut buf).await.unwrap();
        let packet = UdpPacket::from_bytes(&buf[..len]).unwrap();
        if let UdpPacket::Auth(auth) = packet {
            transport.handle_auth(auth, src).await;
        }

        assert_eq!(transport.addr_by_player.get(&player_id).map(|e| *e.value()), client_socket.local_addr().ok());

        let mut ack_buf = vec![0u8; 1500];
        let (ack_len, _) = client_socket.recv_from(&mut ack_buf).await.unwrap();
        let ack = UdpPacket::from_bytes(&ack_buf[..ack_len]).unwrap();
        assert!(matches!(ack, UdpPacket::AuthAck(AuthAckPacket { reason: AuthAckReason::Accepted, .. })));
    }

    #[tokio::test]
    async fn auth_rejects_player_without_session() {
        let state = app_state();
        let server_socket = loopback_socket().await;
        let transport = Arc::new(UdpTransport::new(server_socket, state));

        let client_socket = loopback_socket().await;
        let stranger = PlayerId::new_random();
        transport
            .handle_auth(
                AuthPacket {
                    sender: stranger,
                    username: "ghost".into(),
                    requested_sample_rate: 48000,
                },
                client_socket.local_addr().unwrap(),
            )
            .await;

        let mut ack_buf = vec![0u8; 1500];
        let (ack_len, _) = client_socket.recv_from(&mut ack_buf).await.unwrap();
        let ack = UdpPacket::from_bytes(&ack_buf[..ack_len]).unwrap();
        assert!(matches!(ack, UdpPacket::AuthAck(AuthAckPacket { reason: AuthAckReason::PlayerNotFound, .. })));
    }

    #[tokio::test]
    async fn audio_routes_to_nearby_recipient_with_learned_address() {
        let state = app_state();
        let sender = active_session(&state, "a");
        let recipient = active_session(&state, "b");
        state.positions.upsert(sender, "a".into(), PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        state
            .positions
            .upsert(recipient, "b".into(), PlayerPosition::new(5.0, 64.0, 0.0, 0.0, 0.0, "overworld"));

        let server_socket = loopback_socket().await;
        let transport = Arc::new(UdpTransport::new(server_socket, state.clone()));
        let recipient_socket = loopback_socket().await;
        let sender_socket = loopback_socket().await;
        transport.bind_address(recipient, recipient_socket.local_addr().unwrap());
        let recipient_session_id = state.sessions.session_for_player(recipient).unwrap();
        state.sessions.set_audio_egress(
            recipient_session_id,
            AudioEgress::spawn(AudioSink::Udp {
                socket: transport.socket.clone(),
                addr_by_player: transport.addr_by_player.clone(),
                recipient_player_id: recipient,
            }),
        );

        transport
            .handle_audio(
                AudioPacket {
                    sender,
                    codec: AudioCodec::PcmS16Le,
                    sequence: 1,
                    payload: pcm_to_le_bytes(&[100, -100, 200]),
                    source_pos: None,
                },
                sender_socket.local_addr().unwrap(),
                false,
            )
            .await;

        let mut buf = vec![0u8; 1500];
        let (len, _) = recipient_socket.recv_from(&mut buf).await.unwrap();
        let packet = UdpPacket::from_bytes(&buf[..len]).unwrap();
        assert!(matches!(packet, UdpPacket::Audio(_)));
    }
}
