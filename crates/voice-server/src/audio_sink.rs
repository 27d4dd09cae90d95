//! Where a recipient's audio frames actually go out, independent of which
//! transport the *sender* arrived on. The router only ever deals in
//! `SessionId`s; this module is what lets a UDP sender reach a browser
//! recipient (and vice versa) without either transport knowing about the
//! other's wire format.
//!
//! Every sink is wrapped in an [`AudioEgress`], whose `push` is synchronous
//! and never blocks — a dedicated drain task performs the real write, and a
//! saturated queue drops its oldest frame rather than stalling the router
//! (see `head_drop.rs`; this is the "never block on one slow recipient"
//! requirement).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use base64::Engine;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::warn;
use voice_protocol::audio_frame::AudioFrame;
use voice_protocol::ids::{ObfuscatedId, PlayerId};
use voice_protocol::session::AudioCodec;
use voice_protocol::signaling::{AudioFallbackData, ServerMessage};
use voice_protocol::udp_packet::{AudioPacket, UdpPacket};
use webrtc::data_channel::RTCDataChannel;

use crate::head_drop::HeadDropQueue;

const AUDIO_QUEUE_CAPACITY: usize = 32;

/// One outbound frame plus the identity of whoever spoke it, captured at
/// routing time so the egress task can re-stamp `sender_id` in whatever form
/// the destination wire format expects (raw `PlayerId` for UDP, obfuscated
/// hex for anything a peer can see).
pub struct EgressFrame {
    pub frame: AudioFrame,
    pub sender_player_id: PlayerId,
    pub sender_obfuscated_id: ObfuscatedId,
}

#[derive(Clone)]
pub enum AudioSink {
    /// Re-resolved at send time against the transport's address-learning
    /// table, so a NAT rebind between push and drain is picked up for free.
    Udp {
        socket: Arc<UdpSocket>,
        addr_by_player: Arc<DashMap<PlayerId, SocketAddr>>,
        recipient_player_id: PlayerId,
    },
    DataChannel(Arc<RTCDataChannel>),
    WebSocketFallback(mpsc::UnboundedSender<ServerMessage>),
}

/// Bounded, head-dropping egress queue for one recipient.
pub struct AudioEgress {
    queue: Arc<Mutex<HeadDropQueue<EgressFrame>>>,
    notify: Arc<Notify>,
}

impl AudioEgress {
    pub fn spawn(sink: AudioSink) -> Self {
        let queue: Arc<Mutex<HeadDropQueue<EgressFrame>>> =
            Arc::new(Mutex::new(HeadDropQueue::new(AUDIO_QUEUE_CAPACITY)));
        let notify = Arc::new(Notify::new());
        let drain_queue = queue.clone();
        let drain_notify = notify.clone();
        let mut seq: u32 = 0;
        tokio::spawn(async move {
            loop {
                drain_notify.notified().await;
                loop {
                    let next = drain_queue.lock().unwrap().pop();
                    let Some(egress_frame) = next else { break };
                    seq = seq.wrapping_add(1);
                    write(&sink, &egress_frame, seq).await;
                }
            }
        });
        Self { queue, notify }
    }

    /// Never blocks: drops the oldest queued frame on overflow.
    pub fn push(&self, frame: EgressFrame) {
        let dropped = self.queue.lock().unwrap().push(frame);
        if dropped {
            warn!("audio egress queue saturated, dropped oldest frame");
        }
        self.notify.notify_one();
    }
}

async fn write(sink: &AudioSink, egress_frame: &EgressFrame, seq: u32) {
    match sink {
        AudioSink::Udp { socket, addr_by_player, recipient_player_id } => {
            let Some(addr) = addr_by_player.get(recipient_player_id).map(|e| *e.value()) else {
                return;
            };
            let packet = UdpPacket::Audio(to_audio_packet(egress_frame, seq));
            if let Err(err) = socket.send_to(&packet.to_bytes(), addr).await {
                warn!(%addr, %err, "UDP audio egress send failed");
            }
        }
        AudioSink::DataChannel(dc) => {
            let wire_frame = rewrite_sender_id(&egress_frame.frame, &egress_frame.sender_obfuscated_id.to_string());
            let Ok(bytes) = wire_frame.to_bytes() else {
                warn!("dropped oversize audio frame on datachannel egress");
                return;
            };
            if let Err(err) = dc.send(&bytes.into()).await {
                warn!(%err, "datachannel send failed");
            }
        }
        AudioSink::WebSocketFallback(tx) => {
            let samples: &[i16] = match &egress_frame.frame {
                AudioFrame::PcmPlain { samples, .. } => samples,
                AudioFrame::PcmWithProximity { samples, .. } => samples,
                AudioFrame::Opus { .. } => {
                    warn!("websocket fallback carries PCM only, dropping opus frame");
                    return;
                }
            };
            let mut bytes = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            let audio_data = base64::engine::general_purpose::STANDARD.encode(&bytes);
            let _ = tx.send(ServerMessage::Audio(AudioFallbackData { audio_data }));
        }
    }
}

fn rewrite_sender_id(frame: &AudioFrame, obfuscated_hex: &str) -> AudioFrame {
    match frame {
        AudioFrame::PcmPlain { samples, .. } => AudioFrame::PcmPlain {
            sender_id: obfuscated_hex.to_string(),
            samples: samples.clone(),
        },
        AudioFrame::PcmWithProximity { proximity, samples, .. } => AudioFrame::PcmWithProximity {
            sender_id: obfuscated_hex.to_string(),
            proximity: proximity.clone(),
            samples: samples.clone(),
        },
        AudioFrame::Opus { proximity, gain, payload, .. } => AudioFrame::Opus {
            sender_id: obfuscated_hex.to_string(),
            proximity: proximity.clone(),
            gain: *gain,
            payload: payload.clone(),
        },
    }
}

fn to_audio_packet(egress_frame: &EgressFrame, seq: u32) -> AudioPacket {
    match &egress_frame.frame {
        AudioFrame::PcmPlain { samples, .. } | AudioFrame::PcmWithProximity { samples, .. } => AudioPacket {
            sender: egress_frame.sender_player_id,
            codec: AudioCodec::PcmS16Le,
            sequence: seq,
            payload: pcm_to_le_bytes(samples),
            source_pos: None,
        },
        AudioFrame::Opus { payload, .. } => AudioPacket {
            sender: egress_frame.sender_player_id,
            codec: AudioCodec::Opus,
            sequence: seq,
            payload: payload.clone(),
            source_pos: None,
        },
    }
}

fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
