//! JSON message shapes exchanged over the `/voice` WebSocket signalling
//! channel. Every message serializes as `{"type": "...", "data": {...}}`;
//! `type` selects the variant, `data` is the variant's payload.

use serde::{Deserialize, Serialize};

use crate::ids::ObfuscatedId;
use crate::session::AudioCodec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloData {
    pub heartbeat_interval_ms: u64,
    pub resume_window_ms: u64,
    pub audio_codecs: Vec<AudioCodec>,
    pub use_proximity_radar: bool,
    pub use_proximity_radar_speaking_only: bool,
    pub group_spatial_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateData {
    pub username: String,
    pub auth_code: String,
    pub audio_codecs: Vec<AudioCodec>,
    pub preferred_audio_codec: Option<AudioCodec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeData {
    pub session_id: String,
    pub resume_token: String,
    pub audio_codecs: Vec<AudioCodec>,
    pub preferred_audio_codec: Option<AudioCodec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccessData {
    pub client_id: ObfuscatedId,
    pub transport_mode: TransportMode,
    pub stun_servers: Vec<String>,
    pub session_id: String,
    pub resume_token: String,
    pub heartbeat_interval_ms: u64,
    pub resume_window_ms: u64,
    pub audio_codec: AudioCodec,
    pub audio_codecs: Vec<AudioCodec>,
    pub use_proximity_radar: bool,
    pub group_spatial_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Webrtc,
    Websocket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumedData {
    pub client_id: ObfuscatedId,
    pub session_id: String,
    pub resume_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthErrorData {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingGameSessionData {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSessionReadyData {
    pub client_id: ObfuscatedId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatData {
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpData {
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateData {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupData {
    pub name: String,
    pub permanent: bool,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupData {
    pub group_id: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupIdData {
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupPasswordData {
    pub group_id: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGroupPermanentData {
    pub group_id: String,
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpeakingData {
    pub speaking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMuteData {
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFallbackData {
    pub audio_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummaryWire {
    pub group_id: String,
    pub name: String,
    pub member_count: u32,
    pub max_members: u32,
    pub permanent: bool,
    pub isolated: bool,
    pub has_password: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreatedData {
    pub group: GroupSummaryWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinedData {
    pub group: GroupSummaryWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListData {
    pub groups: Vec<GroupSummaryWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembersUpdatedData {
    pub group_id: String,
    pub member_ids: Vec<ObfuscatedId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSummaryWire {
    pub id: ObfuscatedId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerListData {
    pub players: Vec<PlayerSummaryWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpeakingStatusData {
    pub player_id: ObfuscatedId,
    pub speaking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMuteStatusData {
    pub player_id: ObfuscatedId,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMicMuteData {
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectData {
    pub reason: String,
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate(AuthenticateData),
    Resume(ResumeData),
    Heartbeat(HeartbeatData),
    Disconnect(DisconnectData),
    Offer(SdpData),
    Answer(SdpData),
    IceCandidate(IceCandidateData),
    StartDatachannel,
    CreateGroup(CreateGroupData),
    JoinGroup(JoinGroupData),
    LeaveGroup,
    ListGroups,
    ListPlayers,
    GetGroupMembers(GroupIdData),
    UpdateGroupPassword(UpdateGroupPasswordData),
    SetGroupPermanent(SetGroupPermanentData),
    UserSpeaking(UserSpeakingData),
    UserMute(UserMuteData),
    Audio(AudioFallbackData),
    Ping,
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello(HelloData),
    AuthSuccess(AuthSuccessData),
    AuthError(AuthErrorData),
    Resumed(ResumedData),
    HeartbeatAck(HeartbeatData),
    PendingGameSession(PendingGameSessionData),
    GameSessionReady(GameSessionReadyData),
    Offer(SdpData),
    Answer(SdpData),
    IceCandidate(IceCandidateData),
    Audio(AudioFallbackData),
    GroupCreated(GroupCreatedData),
    GroupJoined(GroupJoinedData),
    GroupLeft,
    GroupList(GroupListData),
    GroupMembersUpdated(GroupMembersUpdatedData),
    PlayerList(PlayerListData),
    UserSpeakingStatus(UserSpeakingStatusData),
    UserMuteStatus(UserMuteStatusData),
    SetMicMute(SetMicMuteData),
    Error(ErrorData),
    Pong,
    Disconnect(DisconnectData),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_authenticate_wraps_in_type_data_shape() {
        let msg = ClientMessage::Authenticate(AuthenticateData {
            username: "alice".into(),
            auth_code: "1234".into(),
            audio_codecs: vec![AudioCodec::Opus],
            preferred_audio_codec: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "authenticate");
        assert_eq!(json["data"]["username"], "alice");
        assert_eq!(json["data"]["audioCodecs"][0], "opus");
    }

    #[test]
    fn client_message_without_payload_has_null_data() {
        let msg = ClientMessage::ListGroups;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "list_groups");
        assert!(json["data"].is_null());
    }

    #[test]
    fn server_auth_success_roundtrips_camel_case_fields() {
        let msg = ServerMessage::AuthSuccess(AuthSuccessData {
            client_id: ObfuscatedId::from_bytes([1; 12]),
            transport_mode: TransportMode::Webrtc,
            stun_servers: vec!["stun:stun.l.google.com:19302".into()],
            session_id: "s1".into(),
            resume_token: "t1".into(),
            heartbeat_interval_ms: 15000,
            resume_window_ms: 30000,
            audio_codec: AudioCodec::Opus,
            audio_codecs: vec![AudioCodec::Opus, AudioCodec::PcmS16Le],
            use_proximity_radar: true,
            group_spatial_audio: true,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"transportMode\":\"webrtc\""));
        let decoded: ServerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ServerMessage::AuthSuccess(d) => assert_eq!(d.session_id, "s1"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ice_candidate_parses_from_client_shape() {
        let raw = r#"{"type":"ice_candidate","data":{"candidate":"candidate:1 1 UDP 1 1.2.3.4 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::IceCandidate(d) => {
                assert_eq!(d.sdp_mid.as_deref(), Some("0"));
                assert_eq!(d.sdp_m_line_index, Some(0));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn audio_fallback_message_shape_matches_wire_contract() {
        let raw = r#"{"type":"audio","data":{"audioData":"AAEC"}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ServerMessage::Audio(d) => assert_eq!(d.audio_data, "AAEC"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn error_message_roundtrips() {
        let msg = ServerMessage::Error(ErrorData {
            code: "resume_failed".into(),
            message: "token expired".into(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ServerMessage::Error(d) => assert_eq!(d.code, "resume_failed"),
            _ => panic!("wrong variant"),
        }
    }
}
