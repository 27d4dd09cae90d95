//! Binary framing for the native UDP voice protocol (spec §4.6).
//!
//! All multi-byte integers are big-endian except audio sample payloads,
//! which stay in whatever format the codec produces (PCM is little-endian,
//! handled one layer up by `audio_frame`). Every length field is checked
//! against a hard cap before any allocation.

use crate::error::FrameError;
use crate::group::GroupSummary;
use crate::ids::{GroupId, ObfuscatedId, PlayerId};
use crate::session::AudioCodec;

pub const TYPE_AUTH: u8 = 0x01;
pub const TYPE_AUDIO: u8 = 0x02;
pub const TYPE_AUTH_ACK: u8 = 0x03;
pub const TYPE_DISCONNECT: u8 = 0x04;
pub const TYPE_TEST_AUDIO: u8 = 0x05;
pub const TYPE_GROUP_OP: u8 = 0x06;
pub const TYPE_GROUP_STATE: u8 = 0x07;
pub const TYPE_GROUP_LIST: u8 = 0x08;
pub const TYPE_SERVER_SHUTDOWN: u8 = 0x09;
pub const TYPE_PLAYER_NAME: u8 = 0x0B;

/// Hard caps checked before allocation, well above any legitimate payload.
const MAX_USERNAME_LEN: usize = 256;
const MAX_AUDIO_PAYLOAD_LEN: usize = 4096;
const MAX_MESSAGE_LEN: usize = 4096;
const MAX_GROUP_NAME_LEN: usize = 256;
const MAX_GROUP_COUNT: usize = 4096;
const MAX_GROUP_MEMBERS: usize = 4096;
const MAX_PASSWORD_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthAckReason {
    Accepted = 0,
    PlayerNotFound = 1,
    ServerNotReady = 2,
    InvalidCredentials = 3,
}

impl AuthAckReason {
    pub fn from_byte(b: u8) -> Result<Self, FrameError> {
        match b {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::PlayerNotFound),
            2 => Ok(Self::ServerNotReady),
            3 => Ok(Self::InvalidCredentials),
            other => Err(FrameError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GroupOpKind {
    Create = 0,
    Join = 1,
    Leave = 2,
}

impl GroupOpKind {
    fn from_byte(b: u8) -> Result<Self, FrameError> {
        match b {
            0 => Ok(Self::Create),
            1 => Ok(Self::Join),
            2 => Ok(Self::Leave),
            other => Err(FrameError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthPacket {
    pub sender: PlayerId,
    pub username: String,
    pub requested_sample_rate: u32,
}

#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub sender: PlayerId,
    pub codec: AudioCodec,
    pub sequence: u32,
    pub payload: Vec<u8>,
    /// Present when the sender's client attaches its own position hint.
    /// Not authoritative — the router always consults `PositionTracker`.
    pub source_pos: Option<(f32, f32, f32)>,
}

#[derive(Debug, Clone)]
pub struct AuthAckPacket {
    pub client: ObfuscatedId,
    pub reason: AuthAckReason,
    pub message: String,
    pub selected_sample_rate: u32,
}

#[derive(Debug, Clone)]
pub struct DisconnectPacket {
    pub client: ObfuscatedId,
}

#[derive(Debug, Clone)]
pub struct GroupOpPacket {
    pub player: PlayerId,
    pub op: GroupOpKind,
    pub group_id: Option<GroupId>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub permanent_requested: bool,
}

#[derive(Debug, Clone)]
pub struct GroupStatePacket {
    pub group_id: GroupId,
    pub name: String,
    pub members: Vec<PlayerId>,
}

#[derive(Debug, Clone)]
pub enum GroupListPacket {
    Query,
    Response(Vec<GroupSummary>),
}

#[derive(Debug, Clone)]
pub struct ServerShutdownPacket {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PlayerNamePacket {
    pub hash_id: u32,
    pub username: String,
}

#[derive(Debug, Clone)]
pub enum UdpPacket {
    Auth(AuthPacket),
    Audio(AudioPacket),
    AuthAck(AuthAckPacket),
    Disconnect(DisconnectPacket),
    TestAudio(AudioPacket),
    GroupOp(GroupOpPacket),
    GroupState(GroupStatePacket),
    GroupList(GroupListPacket),
    ServerShutdown(ServerShutdownPacket),
    PlayerName(PlayerNamePacket),
}

fn check_len(field: &'static str, got: usize, max: usize) -> Result<(), FrameError> {
    if got > max {
        Err(FrameError::LengthCapExceeded { field, got, max })
    } else {
        Ok(())
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, FrameError> {
    data.get(at..at + 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or(FrameError::PacketTooShort {
            expected: at + 4,
            got: data.len(),
        })
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, FrameError> {
    data.get(at..at + 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
        .ok_or(FrameError::PacketTooShort {
            expected: at + 2,
            got: data.len(),
        })
}

fn read_u8(data: &[u8], at: usize) -> Result<u8, FrameError> {
    data.get(at).copied().ok_or(FrameError::PacketTooShort {
        expected: at + 1,
        got: data.len(),
    })
}

fn read_f32(data: &[u8], at: usize) -> Result<f32, FrameError> {
    data.get(at..at + 4)
        .map(|s| f32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or(FrameError::PacketTooShort {
            expected: at + 4,
            got: data.len(),
        })
}

fn read_string(data: &[u8], at: usize, len: usize, field: &'static str) -> Result<String, FrameError> {
    let bytes = data
        .get(at..at + len)
        .ok_or(FrameError::PacketTooShort {
            expected: at + len,
            got: data.len(),
        })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8(field))
}

impl UdpPacket {
    pub fn type_byte(&self) -> u8 {
        match self {
            UdpPacket::Auth(_) => TYPE_AUTH,
            UdpPacket::Audio(_) => TYPE_AUDIO,
            UdpPacket::AuthAck(_) => TYPE_AUTH_ACK,
            UdpPacket::Disconnect(_) => TYPE_DISCONNECT,
            UdpPacket::TestAudio(_) => TYPE_TEST_AUDIO,
            UdpPacket::GroupOp(_) => TYPE_GROUP_OP,
            UdpPacket::GroupState(_) => TYPE_GROUP_STATE,
            UdpPacket::GroupList(_) => TYPE_GROUP_LIST,
            UdpPacket::ServerShutdown(_) => TYPE_SERVER_SHUTDOWN,
            UdpPacket::PlayerName(_) => TYPE_PLAYER_NAME,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![self.type_byte()];
        match self {
            UdpPacket::Auth(p) => {
                buf.extend_from_slice(&p.sender.to_bytes());
                let name = p.username.as_bytes();
                buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
                buf.extend_from_slice(name);
                buf.extend_from_slice(&p.requested_sample_rate.to_be_bytes());
            }
            UdpPacket::Audio(p) | UdpPacket::TestAudio(p) => {
                buf.extend_from_slice(&p.sender.to_bytes());
                buf.push(p.codec.wire_byte());
                buf.extend_from_slice(&p.sequence.to_be_bytes());
                buf.extend_from_slice(&(p.payload.len() as u32).to_be_bytes());
                buf.extend_from_slice(&p.payload);
                if let Some((x, y, z)) = p.source_pos {
                    buf.extend_from_slice(&x.to_be_bytes());
                    buf.extend_from_slice(&y.to_be_bytes());
                    buf.extend_from_slice(&z.to_be_bytes());
                }
            }
            UdpPacket::AuthAck(p) => {
                buf.extend_from_slice(&p.client.0);
                buf.push(p.reason as u8);
                let msg = p.message.as_bytes();
                buf.extend_from_slice(&(msg.len() as u16).to_be_bytes());
                buf.extend_from_slice(msg);
                buf.extend_from_slice(&p.selected_sample_rate.to_be_bytes());
            }
            UdpPacket::Disconnect(p) => {
                buf.extend_from_slice(&p.client.0);
            }
            UdpPacket::GroupOp(p) => {
                buf.extend_from_slice(&p.player.to_bytes());
                buf.push(p.op as u8);
                match p.op {
                    GroupOpKind::Create => {
                        let name = p.name.as_deref().unwrap_or("");
                        let name_bytes = name.as_bytes();
                        buf.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
                        buf.extend_from_slice(name_bytes);
                        let pw = p.password.as_deref().unwrap_or("");
                        let pw_bytes = pw.as_bytes();
                        buf.extend_from_slice(&(pw_bytes.len() as u16).to_be_bytes());
                        buf.extend_from_slice(pw_bytes);
                        buf.push(p.permanent_requested as u8);
                    }
                    GroupOpKind::Join => {
                        buf.extend_from_slice(&p.group_id.expect("join requires group_id").to_bytes());
                        let pw = p.password.as_deref().unwrap_or("");
                        let pw_bytes = pw.as_bytes();
                        buf.extend_from_slice(&(pw_bytes.len() as u16).to_be_bytes());
                        buf.extend_from_slice(pw_bytes);
                    }
                    GroupOpKind::Leave => {}
                }
            }
            UdpPacket::GroupState(p) => {
                buf.extend_from_slice(&[0u8; 16]); // reserved server marker
                buf.extend_from_slice(&p.group_id.to_bytes());
                let name = p.name.as_bytes();
                buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
                buf.extend_from_slice(name);
                buf.extend_from_slice(&(p.members.len() as u32).to_be_bytes());
                for member in &p.members {
                    buf.extend_from_slice(&member.to_bytes());
                }
            }
            UdpPacket::GroupList(GroupListPacket::Query) => {
                buf.push(1);
            }
            UdpPacket::GroupList(GroupListPacket::Response(groups)) => {
                buf.push(0);
                buf.extend_from_slice(&(groups.len() as u32).to_be_bytes());
                for g in groups {
                    buf.extend_from_slice(&g.group_id.to_bytes());
                    let name = g.name.as_bytes();
                    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
                    buf.extend_from_slice(name);
                    buf.extend_from_slice(&g.member_count.to_be_bytes());
                    buf.extend_from_slice(&g.max_members.to_be_bytes());
                    buf.push(g.permanent as u8);
                    buf.push(g.isolated as u8);
                    buf.push(g.has_password as u8);
                }
            }
            UdpPacket::ServerShutdown(p) => {
                let reason = p.reason.as_bytes();
                buf.extend_from_slice(&(reason.len() as u16).to_be_bytes());
                buf.extend_from_slice(reason);
            }
            UdpPacket::PlayerName(p) => {
                buf.extend_from_slice(&[0u8; 16]); // reserved server marker
                buf.extend_from_slice(&p.hash_id.to_be_bytes());
                let name = p.username.as_bytes();
                buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
                buf.extend_from_slice(name);
            }
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let type_byte = read_u8(data, 0)?;
        match type_byte {
            TYPE_AUTH => {
                let sender = PlayerId::parse_slice(&data[1..])?;
                let name_len = read_u32(data, 17)? as usize;
                check_len("username", name_len, MAX_USERNAME_LEN)?;
                let username = read_string(data, 21, name_len, "username")?;
                let requested_sample_rate = read_u32(data, 21 + name_len)?;
                Ok(UdpPacket::Auth(AuthPacket {
                    sender,
                    username,
                    requested_sample_rate,
                }))
            }
            TYPE_AUDIO | TYPE_TEST_AUDIO => {
                let packet = parse_audio_body(data)?;
                Ok(if type_byte == TYPE_AUDIO {
                    UdpPacket::Audio(packet)
                } else {
                    UdpPacket::TestAudio(packet)
                })
            }
            TYPE_AUTH_ACK => {
                let client = ObfuscatedId::from_bytes(slice_12(data, 1)?);
                let reason = AuthAckReason::from_byte(read_u8(data, 13)?)?;
                let msg_len = read_u16(data, 14)? as usize;
                check_len("message", msg_len, MAX_MESSAGE_LEN)?;
                let message = read_string(data, 16, msg_len, "message")?;
                // Tolerant parse: older peers may omit the trailing sample rate.
                let selected_sample_rate = read_u32(data, 16 + msg_len).unwrap_or(0);
                Ok(UdpPacket::AuthAck(AuthAckPacket {
                    client,
                    reason,
                    message,
                    selected_sample_rate,
                }))
            }
            TYPE_DISCONNECT => {
                let client = ObfuscatedId::from_bytes(slice_12(data, 1)?);
                Ok(UdpPacket::Disconnect(DisconnectPacket { client }))
            }
            TYPE_GROUP_OP => {
                let player = PlayerId::parse_slice(&data[1..])?;
                let op = GroupOpKind::from_byte(read_u8(data, 17)?)?;
                match op {
                    GroupOpKind::Create => {
                        let name_len = read_u16(data, 18)? as usize;
                        check_len("group_name", name_len, MAX_GROUP_NAME_LEN)?;
                        let name = read_string(data, 20, name_len, "group_name")?;
                        let pw_at = 20 + name_len;
                        let pw_len = read_u16(data, pw_at)? as usize;
                        check_len("group_password", pw_len, MAX_PASSWORD_LEN)?;
                        let password = read_string(data, pw_at + 2, pw_len, "group_password")?;
                        let permanent_requested = read_u8(data, pw_at + 2 + pw_len)? != 0;
                        Ok(UdpPacket::GroupOp(GroupOpPacket {
                            player,
                            op,
                            group_id: None,
                            name: Some(name),
                            password: if pw_len == 0 { None } else { Some(password) },
                            permanent_requested,
                        }))
                    }
                    GroupOpKind::Join => {
                        let group_id = GroupId::parse_slice(&data[18..])?;
                        let pw_at = 34;
                        let pw_len = read_u16(data, pw_at)? as usize;
                        check_len("group_password", pw_len, MAX_PASSWORD_LEN)?;
                        let password = read_string(data, pw_at + 2, pw_len, "group_password")?;
                        Ok(UdpPacket::GroupOp(GroupOpPacket {
                            player,
                            op,
                            group_id: Some(group_id),
                            name: None,
                            password: if pw_len == 0 { None } else { Some(password) },
                            permanent_requested: false,
                        }))
                    }
                    GroupOpKind::Leave => Ok(UdpPacket::GroupOp(GroupOpPacket {
                        player,
                        op,
                        group_id: None,
                        name: None,
                        password: None,
                        permanent_requested: false,
                    })),
                }
            }
            TYPE_GROUP_STATE => {
                let group_id = GroupId::parse_slice(&data[17..])?;
                let name_len = read_u16(data, 33)? as usize;
                check_len("group_name", name_len, MAX_GROUP_NAME_LEN)?;
                let name = read_string(data, 35, name_len, "group_name")?;
                let count_at = 35 + name_len;
                let count = read_u32(data, count_at)? as usize;
                check_len("group_members", count, MAX_GROUP_MEMBERS)?;
                let mut members = Vec::with_capacity(count);
                let mut at = count_at + 4;
                for _ in 0..count {
                    members.push(PlayerId::parse_slice(&data[at..])?);
                    at += 16;
                }
                Ok(UdpPacket::GroupState(GroupStatePacket {
                    group_id,
                    name,
                    members,
                }))
            }
            TYPE_GROUP_LIST => {
                let flag = read_u8(data, 1)?;
                if flag == 1 {
                    Ok(UdpPacket::GroupList(GroupListPacket::Query))
                } else {
                    let count = read_u32(data, 2)? as usize;
                    check_len("group_count", count, MAX_GROUP_COUNT)?;
                    let mut groups = Vec::with_capacity(count);
                    let mut at = 6;
                    for _ in 0..count {
                        let group_id = GroupId::parse_slice(&data[at..])?;
                        at += 16;
                        let name_len = read_u16(data, at)? as usize;
                        check_len("group_name", name_len, MAX_GROUP_NAME_LEN)?;
                        at += 2;
                        let name = read_string(data, at, name_len, "group_name")?;
                        at += name_len;
                        let member_count = read_u32(data, at)?;
                        at += 4;
                        let max_members = read_u32(data, at)?;
                        at += 4;
                        let permanent = read_u8(data, at)? != 0;
                        at += 1;
                        let isolated = read_u8(data, at)? != 0;
                        at += 1;
                        let has_password = read_u8(data, at)? != 0;
                        at += 1;
                        groups.push(GroupSummary {
                            group_id,
                            name,
                            member_count,
                            max_members,
                            permanent,
                            isolated,
                            has_password,
                        });
                    }
                    Ok(UdpPacket::GroupList(GroupListPacket::Response(groups)))
                }
            }
            TYPE_SERVER_SHUTDOWN => {
                let reason_len = read_u16(data, 1)? as usize;
                check_len("reason", reason_len, MAX_MESSAGE_LEN)?;
                let reason = read_string(data, 3, reason_len, "reason")?;
                Ok(UdpPacket::ServerShutdown(ServerShutdownPacket { reason }))
            }
            TYPE_PLAYER_NAME => {
                let hash_id = read_u32(data, 17)?;
                let name_len = read_u32(data, 21)? as usize;
                check_len("username", name_len, MAX_USERNAME_LEN)?;
                let username = read_string(data, 25, name_len, "username")?;
                Ok(UdpPacket::PlayerName(PlayerNamePacket { hash_id, username }))
            }
            other => Err(FrameError::UnknownPacketType(other)),
        }
    }
}

fn slice_12(data: &[u8], at: usize) -> Result<[u8; 12], FrameError> {
    let s = data.get(at..at + 12).ok_or(FrameError::PacketTooShort {
        expected: at + 12,
        got: data.len(),
    })?;
    let mut out = [0u8; 12];
    out.copy_from_slice(s);
    Ok(out)
}

fn parse_audio_body(data: &[u8]) -> Result<AudioPacket, FrameError> {
    let sender = PlayerId::parse_slice(&data[1..])?;
    let codec_byte = read_u8(data, 17)?;
    let codec = AudioCodec::from_wire_byte(codec_byte).ok_or(FrameError::UnknownPacketType(codec_byte))?;
    let sequence = read_u32(data, 18)?;
    let payload_len = read_u32(data, 22)? as usize;
    check_len("audio_payload", payload_len, MAX_AUDIO_PAYLOAD_LEN)?;
    let payload_at = 26;
    let payload = data
        .get(payload_at..payload_at + payload_len)
        .ok_or(FrameError::PacketTooShort {
            expected: payload_at + payload_len,
            got: data.len(),
        })?
        .to_vec();
    let pos_at = payload_at + payload_len;
    let source_pos = if data.len() >= pos_at + 12 {
        Some((
            read_f32(data, pos_at)?,
            read_f32(data, pos_at + 4)?,
            read_f32(data, pos_at + 8)?,
        ))
    } else {
        None
    };
    Ok(AudioPacket {
        sender,
        codec,
        sequence,
        payload,
        source_pos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_auth_packet() {
        let packet = UdpPacket::Auth(AuthPacket {
            sender: PlayerId::new_random(),
            username: "alice".into(),
            requested_sample_rate: 48000,
        });
        let bytes = packet.to_bytes();
        let decoded = UdpPacket::from_bytes(&bytes).unwrap();
        match decoded {
            UdpPacket::Auth(p) => {
                assert_eq!(p.username, "alice");
                assert_eq!(p.requested_sample_rate, 48000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_audio_packet_with_position() {
        let packet = AudioPacket {
            sender: PlayerId::new_random(),
            codec: AudioCodec::Opus,
            sequence: 7,
            payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
            source_pos: Some((1.0, 2.0, 3.0)),
        };
        let bytes = UdpPacket::Audio(packet.clone()).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::Audio(decoded) => {
                assert_eq!(decoded.sequence, 7);
                assert_eq!(decoded.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
                assert_eq!(decoded.codec, AudioCodec::Opus);
                assert_eq!(decoded.source_pos, Some((1.0, 2.0, 3.0)));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_audio_packet_without_position() {
        let packet = AudioPacket {
            sender: PlayerId::new_random(),
            codec: AudioCodec::PcmS16Le,
            sequence: 1,
            payload: vec![1, 2, 3],
            source_pos: None,
        };
        let bytes = UdpPacket::Audio(packet).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::Audio(decoded) => assert_eq!(decoded.source_pos, None),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_audio_bypasses_as_distinct_variant() {
        let packet = AudioPacket {
            sender: PlayerId::new_random(),
            codec: AudioCodec::Opus,
            sequence: 1,
            payload: vec![9],
            source_pos: None,
        };
        let bytes = UdpPacket::TestAudio(packet).to_bytes();
        assert!(matches!(UdpPacket::from_bytes(&bytes).unwrap(), UdpPacket::TestAudio(_)));
    }

    #[test]
    fn auth_ack_tolerates_missing_sample_rate_tail() {
        let mut buf = vec![TYPE_AUTH_ACK];
        buf.extend_from_slice(&[0u8; 12]); // client id
        buf.push(AuthAckReason::Accepted as u8);
        let msg = b"ok";
        buf.extend_from_slice(&(msg.len() as u16).to_be_bytes());
        buf.extend_from_slice(msg);
        // no trailing sample rate field
        let decoded = UdpPacket::from_bytes(&buf).unwrap();
        match decoded {
            UdpPacket::AuthAck(p) => {
                assert_eq!(p.message, "ok");
                assert_eq!(p.selected_sample_rate, 0);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_auth_ack_with_sample_rate() {
        let packet = AuthAckPacket {
            client: ObfuscatedId::from_bytes([1; 12]),
            reason: AuthAckReason::InvalidCredentials,
            message: "bad code".into(),
            selected_sample_rate: 48000,
        };
        let bytes = UdpPacket::AuthAck(packet).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::AuthAck(p) => {
                assert_eq!(p.reason, AuthAckReason::InvalidCredentials);
                assert_eq!(p.selected_sample_rate, 48000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_disconnect() {
        let packet = DisconnectPacket {
            client: ObfuscatedId::from_bytes([2; 12]),
        };
        let bytes = UdpPacket::Disconnect(packet).to_bytes();
        assert!(matches!(UdpPacket::from_bytes(&bytes).unwrap(), UdpPacket::Disconnect(_)));
    }

    #[test]
    fn roundtrip_group_op_create() {
        let packet = GroupOpPacket {
            player: PlayerId::new_random(),
            op: GroupOpKind::Create,
            group_id: None,
            name: Some("Alpha Squad".into()),
            password: Some("secret".into()),
            permanent_requested: true,
        };
        let bytes = UdpPacket::GroupOp(packet).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::GroupOp(p) => {
                assert_eq!(p.name.as_deref(), Some("Alpha Squad"));
                assert_eq!(p.password.as_deref(), Some("secret"));
                assert!(p.permanent_requested);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_group_op_join() {
        let packet = GroupOpPacket {
            player: PlayerId::new_random(),
            op: GroupOpKind::Join,
            group_id: Some(GroupId::new_random()),
            name: None,
            password: None,
            permanent_requested: false,
        };
        let bytes = UdpPacket::GroupOp(packet.clone()).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::GroupOp(p) => {
                assert_eq!(p.group_id, packet.group_id);
                assert_eq!(p.password, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_group_op_leave() {
        let packet = GroupOpPacket {
            player: PlayerId::new_random(),
            op: GroupOpKind::Leave,
            group_id: None,
            name: None,
            password: None,
            permanent_requested: false,
        };
        let bytes = UdpPacket::GroupOp(packet).to_bytes();
        assert!(matches!(
            UdpPacket::from_bytes(&bytes).unwrap(),
            UdpPacket::GroupOp(GroupOpPacket { op: GroupOpKind::Leave, .. })
        ));
    }

    #[test]
    fn roundtrip_group_state() {
        let packet = GroupStatePacket {
            group_id: GroupId::new_random(),
            name: "Party".into(),
            members: vec![PlayerId::new_random(), PlayerId::new_random()],
        };
        let bytes = UdpPacket::GroupState(packet.clone()).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::GroupState(p) => {
                assert_eq!(p.name, "Party");
                assert_eq!(p.members, packet.members);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_group_list_query() {
        let bytes = UdpPacket::GroupList(GroupListPacket::Query).to_bytes();
        assert!(matches!(
            UdpPacket::from_bytes(&bytes).unwrap(),
            UdpPacket::GroupList(GroupListPacket::Query)
        ));
    }

    #[test]
    fn roundtrip_group_list_response() {
        let summary = GroupSummary {
            group_id: GroupId::new_random(),
            name: "Alpha".into(),
            member_count: 2,
            max_members: 10,
            permanent: false,
            isolated: true,
            has_password: false,
        };
        let bytes = UdpPacket::GroupList(GroupListPacket::Response(vec![summary])).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::GroupList(GroupListPacket::Response(groups)) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].name, "Alpha");
                assert!(groups[0].isolated);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_server_shutdown() {
        let packet = ServerShutdownPacket {
            reason: "maintenance".into(),
        };
        let bytes = UdpPacket::ServerShutdown(packet).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::ServerShutdown(p) => assert_eq!(p.reason, "maintenance"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_player_name() {
        let packet = PlayerNamePacket {
            hash_id: 42,
            username: "bob".into(),
        };
        let bytes = UdpPacket::PlayerName(packet).to_bytes();
        match UdpPacket::from_bytes(&bytes).unwrap() {
            UdpPacket::PlayerName(p) => {
                assert_eq!(p.hash_id, 42);
                assert_eq!(p.username, "bob");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        let data = [0xFFu8, 0, 0, 0];
        assert!(matches!(
            UdpPacket::from_bytes(&data),
            Err(FrameError::UnknownPacketType(0xFF))
        ));
    }

    #[test]
    fn truncated_auth_packet_is_rejected() {
        let data = [TYPE_AUTH, 0, 0];
        assert!(UdpPacket::from_bytes(&data).is_err());
    }

    #[test]
    fn oversize_payload_length_is_rejected_before_allocation() {
        let mut buf = vec![TYPE_AUDIO];
        buf.extend_from_slice(&[0u8; 16]); // sender
        buf.push(AudioCodec::Opus.wire_byte());
        buf.extend_from_slice(&1u32.to_be_bytes()); // seq
        buf.extend_from_slice(&(MAX_AUDIO_PAYLOAD_LEN as u32 + 1).to_be_bytes());
        let result = UdpPacket::from_bytes(&buf);
        assert!(matches!(result, Err(FrameError::LengthCapExceeded { .. })));
    }
}
