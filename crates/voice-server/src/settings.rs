use std::path::Path;

use serde::{Deserialize, Serialize};

/// Runtime server settings, loaded from a JSON file and expected to change
/// without a restart (an operator edits the file and the server picks the
/// new values up on the next reload, see `main.rs`'s settings-watch task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Default proximity range in blocks, used when a group doesn't override it.
    #[serde(default = "default_proximity_distance")]
    pub default_proximity_distance: f32,

    /// Hard ceiling on proximity range regardless of group settings.
    #[serde(default = "default_max_voice_distance")]
    pub max_voice_distance: f32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_frame_size_samples")]
    pub frame_size_samples: u32,

    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_resume_window_ms")]
    pub resume_window_ms: u64,
    #[serde(default = "default_pending_game_join_timeout_seconds")]
    pub pending_game_join_timeout_seconds: u64,
    #[serde(default = "default_game_quit_grace_seconds")]
    pub game_quit_grace_seconds: u64,

    #[serde(default = "default_max_group_count")]
    pub max_group_count: u32,
    #[serde(default = "default_max_group_member_count")]
    pub max_group_member_count: u32,
    #[serde(default = "default_max_group_name_length")]
    pub max_group_name_length: usize,

    #[serde(default = "default_opus_datachannel_enabled")]
    pub opus_datachannel_enabled: bool,
    #[serde(default = "default_use_proximity_radar")]
    pub use_proximity_radar: bool,
    #[serde(default = "default_use_proximity_radar_speaking_only")]
    pub use_proximity_radar_speaking_only: bool,
    #[serde(default = "default_group_spatial_audio")]
    pub group_spatial_audio: bool,

    /// When set, the router scales 16-bit PCM payloads by a per-recipient
    /// distance gain before egress. Opus is never scaled server-side.
    #[serde(default = "default_server_side_pcm_gain")]
    pub server_side_pcm_gain: bool,
}

fn default_proximity_distance() -> f32 {
    30.0
}
fn default_max_voice_distance() -> f32 {
    64.0
}
fn default_sample_rate() -> u32 {
    48000
}
fn default_frame_size_samples() -> u32 {
    960
}
fn default_max_packet_size() -> usize {
    4096
}
fn default_stun_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".into()]
}
fn default_heartbeat_interval_ms() -> u64 {
    15000
}
fn default_resume_window_ms() -> u64 {
    30000
}
fn default_pending_game_join_timeout_seconds() -> u64 {
    60
}
fn default_game_quit_grace_seconds() -> u64 {
    30
}
fn default_max_group_count() -> u32 {
    256
}
fn default_max_group_member_count() -> u32 {
    16
}
fn default_max_group_name_length() -> usize {
    32
}
fn default_opus_datachannel_enabled() -> bool {
    true
}
fn default_use_proximity_radar() -> bool {
    true
}
fn default_use_proximity_radar_speaking_only() -> bool {
    false
}
fn default_group_spatial_audio() -> bool {
    true
}
fn default_server_side_pcm_gain() -> bool {
    false
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_proximity_distance: default_proximity_distance(),
            max_voice_distance: default_max_voice_distance(),
            sample_rate: default_sample_rate(),
            frame_size_samples: default_frame_size_samples(),
            max_packet_size: default_max_packet_size(),
            stun_servers: default_stun_servers(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            resume_window_ms: default_resume_window_ms(),
            pending_game_join_timeout_seconds: default_pending_game_join_timeout_seconds(),
            game_quit_grace_seconds: default_game_quit_grace_seconds(),
            max_group_count: default_max_group_count(),
            max_group_member_count: default_max_group_member_count(),
            max_group_name_length: default_max_group_name_length(),
            opus_datachannel_enabled: default_opus_datachannel_enabled(),
            use_proximity_radar: default_use_proximity_radar(),
            use_proximity_radar_speaking_only: default_use_proximity_radar_speaking_only(),
            group_spatial_audio: default_group_spatial_audio(),
            server_side_pcm_gain: default_server_side_pcm_gain(),
        }
    }
}

impl ServerSettings {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
