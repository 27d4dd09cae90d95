use thiserror::Error;

/// Errors raised while framing or parsing wire data. Total and exhaustively
/// matched by callers; a frame error always closes the session that produced it.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("packet too short: expected at least {expected} bytes, got {got}")]
    PacketTooShort { expected: usize, got: usize },

    #[error("unknown UDP packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("unknown audio frame version: {0}")]
    UnknownFrameVersion(u8),

    #[error("length field {field} exceeds hard cap: {got} > {max}")]
    LengthCapExceeded {
        field: &'static str,
        got: usize,
        max: usize,
    },

    #[error("invalid UTF-8 in field {0}")]
    InvalidUtf8(&'static str),

    #[error("message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_too_short_display() {
        let e = FrameError::PacketTooShort {
            expected: 16,
            got: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("5"));
    }

    #[test]
    fn unknown_packet_type_display() {
        let e = FrameError::UnknownPacketType(0xAB);
        assert!(e.to_string().contains("0xab"));
    }

    #[test]
    fn length_cap_display() {
        let e = FrameError::LengthCapExceeded {
            field: "username",
            got: 9000,
            max: 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("username"));
        assert!(msg.contains("9000"));
    }
}
