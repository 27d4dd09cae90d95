//! Audio payload framing carried over the WebRTC DataChannel (and, as a
//! degraded fallback, base64-in-JSON over the signalling WebSocket).
//!
//! PCM samples are little-endian; metadata floats are big-endian — matching
//! the mixed endianness the browser's `DataView` conventions settled on.

use crate::error::FrameError;

/// Hard cap matching the DataChannel MTU budget (spec: 900 bytes per frame).
pub const MAX_FRAME_LEN: usize = 900;

const FLAG_PROXIMITY: u8 = 0b01;
const FLAG_GAIN: u8 = 0b10;

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityMeta {
    pub distance: f32,
    pub max_range: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioFrame {
    /// Version 1: plain PCM, no metadata.
    PcmPlain { sender_id: String, samples: Vec<i16> },
    /// Version 2: PCM with proximity metadata attached by the sender.
    PcmWithProximity {
        sender_id: String,
        proximity: ProximityMeta,
        samples: Vec<i16>,
    },
    /// Version 3: Opus payload with optional proximity and/or gain metadata.
    Opus {
        sender_id: String,
        proximity: Option<ProximityMeta>,
        gain: Option<f32>,
        payload: Vec<u8>,
    },
}

impl AudioFrame {
    pub fn version(&self) -> u8 {
        match self {
            AudioFrame::PcmPlain { .. } => 1,
            AudioFrame::PcmWithProximity { .. } => 2,
            AudioFrame::Opus { .. } => 3,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            AudioFrame::PcmPlain { sender_id, .. } => sender_id,
            AudioFrame::PcmWithProximity { sender_id, .. } => sender_id,
            AudioFrame::Opus { sender_id, .. } => sender_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        match self {
            AudioFrame::PcmPlain { sender_id, samples } => {
                buf.push(1);
                push_sender_id(&mut buf, sender_id)?;
                push_pcm_samples(&mut buf, samples);
            }
            AudioFrame::PcmWithProximity {
                sender_id,
                proximity,
                samples,
            } => {
                buf.push(2);
                push_sender_id(&mut buf, sender_id)?;
                buf.extend_from_slice(&proximity.distance.to_be_bytes());
                buf.extend_from_slice(&proximity.max_range.to_be_bytes());
                push_pcm_samples(&mut buf, samples);
            }
            AudioFrame::Opus {
                sender_id,
                proximity,
                gain,
                payload,
            } => {
                buf.push(3);
                let mut flags = 0u8;
                if proximity.is_some() {
                    flags |= FLAG_PROXIMITY;
                }
                if gain.is_some() {
                    flags |= FLAG_GAIN;
                }
                let sender_bytes = sender_id.as_bytes();
                if sender_bytes.len() > u8::MAX as usize {
                    return Err(FrameError::LengthCapExceeded {
                        field: "sender_id",
                        got: sender_bytes.len(),
                        max: u8::MAX as usize,
                    });
                }
                buf.push(flags);
                buf.push(sender_bytes.len() as u8);
                buf.extend_from_slice(sender_bytes);
                if let Some(p) = proximity {
                    buf.extend_from_slice(&p.distance.to_be_bytes());
                    buf.extend_from_slice(&p.max_range.to_be_bytes());
                }
                if let Some(g) = gain {
                    buf.extend_from_slice(&g.to_be_bytes());
                }
                buf.extend_from_slice(payload);
            }
        }
        if buf.len() > MAX_FRAME_LEN {
            return Err(FrameError::LengthCapExceeded {
                field: "audio_frame",
                got: buf.len(),
                max: MAX_FRAME_LEN,
            });
        }
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_FRAME_LEN {
            return Err(FrameError::LengthCapExceeded {
                field: "audio_frame",
                got: data.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let version = *data.first().ok_or(FrameError::PacketTooShort { expected: 1, got: 0 })?;
        match version {
            1 => {
                let (sender_id, rest) = read_sender_id_v1_v2(data, 1)?;
                let samples = read_pcm_samples(rest)?;
                Ok(AudioFrame::PcmPlain { sender_id, samples })
            }
            2 => {
                let (sender_id, rest) = read_sender_id_v1_v2(data, 1)?;
                let distance = read_f32(rest, 0)?;
                let max_range = read_f32(rest, 4)?;
                let samples = read_pcm_samples(&rest[8..])?;
                Ok(AudioFrame::PcmWithProximity {
                    sender_id,
                    proximity: ProximityMeta { distance, max_range },
                    samples,
                })
            }
            3 => {
                let flags = *data.get(1).ok_or(FrameError::PacketTooShort { expected: 2, got: data.len() })?;
                let sender_len = *data.get(2).ok_or(FrameError::PacketTooShort { expected: 3, got: data.len() })? as usize;
                let sender_id = read_string(data, 3, sender_len)?;
                let mut at = 3 + sender_len;
                let proximity = if flags & FLAG_PROXIMITY != 0 {
                    let p = ProximityMeta {
                        distance: read_f32(data, at)?,
                        max_range: read_f32(data, at + 4)?,
                    };
                    at += 8;
                    Some(p)
                } else {
                    None
                };
                let gain = if flags & FLAG_GAIN != 0 {
                    let g = read_f32(data, at)?;
                    at += 4;
                    Some(g)
                } else {
                    None
                };
                let payload = data.get(at..).unwrap_or(&[]).to_vec();
                Ok(AudioFrame::Opus {
                    sender_id,
                    proximity,
                    gain,
                    payload,
                })
            }
            other => Err(FrameError::UnknownFrameVersion(other)),
        }
    }
}

fn push_sender_id(buf: &mut Vec<u8>, sender_id: &str) -> Result<(), FrameError> {
    let bytes = sender_id.as_bytes();
    if bytes.len() > u8::MAX as usize {
        return Err(FrameError::LengthCapExceeded {
            field: "sender_id",
            got: bytes.len(),
            max: u8::MAX as usize,
        });
    }
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn push_pcm_samples(buf: &mut Vec<u8>, samples: &[i16]) {
    for s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
}

fn read_sender_id_v1_v2(data: &[u8], at: usize) -> Result<(String, &[u8]), FrameError> {
    let len = *data.get(at).ok_or(FrameError::PacketTooShort {
        expected: at + 1,
        got: data.len(),
    })? as usize;
    let id = read_string(data, at + 1, len)?;
    let rest_at = at + 1 + len;
    Ok((id, data.get(rest_at..).unwrap_or(&[])))
}

fn read_string(data: &[u8], at: usize, len: usize) -> Result<String, FrameError> {
    let bytes = data.get(at..at + len).ok_or(FrameError::PacketTooShort {
        expected: at + len,
        got: data.len(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8("sender_id"))
}

fn read_f32(data: &[u8], at: usize) -> Result<f32, FrameError> {
    data.get(at..at + 4)
        .map(|s| f32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or(FrameError::PacketTooShort {
            expected: at + 4,
            got: data.len(),
        })
}

fn read_pcm_samples(data: &[u8]) -> Result<Vec<i16>, FrameError> {
    if data.len() % 2 != 0 {
        return Err(FrameError::PacketTooShort {
            expected: data.len() + 1,
            got: data.len(),
        });
    }
    Ok(data.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect())
}
