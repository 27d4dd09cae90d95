pub mod audio_frame;
pub mod error;
pub mod group;
pub mod ids;
pub mod position;
pub mod session;
pub mod signaling;
pub mod spatial;
pub mod udp_packet;
