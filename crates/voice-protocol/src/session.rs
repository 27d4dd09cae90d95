use serde::{Deserialize, Serialize};

/// Which transport a session's audio currently flows over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    UdpNative,
    WebrtcDatachannel,
    WebsocketFallback,
}

/// Audio codecs the engine is codec-agnostic about; it forwards payloads
/// tagged with one of these without ever decoding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioCodec {
    PcmS16Le,
    Opus,
}

impl AudioCodec {
    /// Codec byte used in the UDP `AUDIO` packet and in DataChannel v3 framing.
    pub fn wire_byte(self) -> u8 {
        match self {
            AudioCodec::PcmS16Le => 0x00,
            AudioCodec::Opus => 0x01,
        }
    }

    pub fn from_wire_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(AudioCodec::PcmS16Le),
            0x01 => Some(AudioCodec::Opus),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::PcmS16Le => "pcm-s16le",
            AudioCodec::Opus => "opus",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "pcm-s16le" => Some(AudioCodec::PcmS16Le),
            "opus" => Some(AudioCodec::Opus),
            _ => None,
        }
    }

    /// Server's codec preference order, highest-ranked first.
    pub fn server_ranking() -> &'static [AudioCodec] {
        &[AudioCodec::Opus, AudioCodec::PcmS16Le]
    }
}

/// Negotiate a codec from a client's requested list and optional preference.
///
/// Deterministic: depends only on set membership, never on the order of
/// `client_codecs`, so repeated negotiation over the same sets always agrees.
pub fn negotiate_codec(client_codecs: &[AudioCodec], preferred: Option<AudioCodec>) -> AudioCodec {
    let intersects = |c: AudioCodec| client_codecs.contains(&c);

    if let Some(p) = preferred {
        if intersects(p) {
            return p;
        }
    }

    for &ranked in AudioCodec::server_ranking() {
        if intersects(ranked) {
            return ranked;
        }
    }

    AudioCodec::PcmS16Le
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_prefers_client_preference_when_supported() {
        let codec = negotiate_codec(&[AudioCodec::Opus, AudioCodec::PcmS16Le], Some(AudioCodec::PcmS16Le));
        assert_eq!(codec, AudioCodec::PcmS16Le);
    }

    #[test]
    fn negotiate_falls_back_to_server_ranking() {
        let codec = negotiate_codec(&[AudioCodec::Opus, AudioCodec::PcmS16Le], None);
        assert_eq!(codec, AudioCodec::Opus);
    }

    #[test]
    fn negotiate_falls_back_to_pcm_on_empty_intersection() {
        let codec = negotiate_codec(&[], Some(AudioCodec::Opus));
        assert_eq!(codec, AudioCodec::PcmS16Le);
    }

    #[test]
    fn negotiate_is_order_independent() {
        let a = negotiate_codec(&[AudioCodec::Opus, AudioCodec::PcmS16Le], None);
        let b = negotiate_codec(&[AudioCodec::PcmS16Le, AudioCodec::Opus], None);
        assert_eq!(a, b);
    }

    #[test]
    fn wire_byte_roundtrip() {
        for codec in [AudioCodec::PcmS16Le, AudioCodec::Opus] {
            assert_eq!(AudioCodec::from_wire_byte(codec.wire_byte()), Some(codec));
        }
    }
}
