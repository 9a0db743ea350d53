//! Wire codec
//!
//! One text WebSocket message carries one frame. Inbound frames address a
//! named parameter stream; outbound frames carry the single response
//! stream, so they have no name.
//!
//! ```text
//! Inbound:  <kind><name>.<payload>     kind ∈ {n, e, c, f}
//! Outbound: <kind><payload>            kind ∈ {n, e, c}
//! ```
//!
//! Everything is UTF-8 text. If an inbound message contains no `.`, the
//! whole tail is the name and the payload is empty.

/// Reason text sent with the normal-closure handshake after the final
/// outbound `c` frame.
pub const CLOSE_REASON: &str = "onCompleted";

/// Frame kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Value frame: deliver the payload as the next item.
    Next,
    /// Error frame: terminate the stream with an error.
    Error,
    /// Completion frame: terminate the stream normally.
    Complete,
    /// Final frame: deliver the payload, then terminate normally.
    Final,
}

impl FrameKind {
    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'n' => Some(FrameKind::Next),
            'e' => Some(FrameKind::Error),
            'c' => Some(FrameKind::Complete),
            'f' => Some(FrameKind::Final),
            _ => None,
        }
    }
}

/// A parsed inbound frame, borrowing from the raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame<'a> {
    pub kind: FrameKind,
    pub name: &'a str,
    pub payload: &'a str,
}

impl<'a> InboundFrame<'a> {
    /// Parse one text message into a frame.
    ///
    /// Returns `None` for malformed messages (empty, or unknown kind tag);
    /// the caller drops those without closing the connection.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let mut chars = raw.chars();
        let kind = FrameKind::from_tag(chars.next()?)?;
        let tail = chars.as_str();

        let (name, payload) = match tail.find('.') {
            Some(dot) => (&tail[..dot], &tail[dot + 1..]),
            None => (tail, ""),
        };

        Some(InboundFrame { kind, name, payload })
    }
}

/// Encode an outbound value frame: `n` + the already-serialized payload.
pub fn encode_next(payload: &str) -> String {
    format!("n{}", payload)
}

/// Encode an outbound error frame: `e` + the JSON-encoded message.
pub fn encode_error(message: &str) -> String {
    // A string always serializes; fall back to a bare quoted form if not.
    let encoded = serde_json::to_string(message)
        .unwrap_or_else(|_| format!("\"{}\"", message));
    format!("e{}", encoded)
}

/// Encode the outbound completion frame.
pub fn encode_complete() -> String {
    "c".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_frame() {
        let frame = InboundFrame::parse("nleft.42").unwrap();
        assert_eq!(frame.kind, FrameKind::Next);
        assert_eq!(frame.name, "left");
        assert_eq!(frame.payload, "42");
    }

    #[test]
    fn test_parse_without_separator() {
        let frame = InboundFrame::parse("cleft").unwrap();
        assert_eq!(frame.kind, FrameKind::Complete);
        assert_eq!(frame.name, "left");
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn test_parse_final_frame() {
        let frame = InboundFrame::parse("fpayloadX.v1").unwrap();
        assert_eq!(frame.kind, FrameKind::Final);
        assert_eq!(frame.name, "payloadX");
        assert_eq!(frame.payload, "v1");
    }

    #[test]
    fn test_payload_may_contain_dots() {
        let frame = InboundFrame::parse("nx.{\"a\":1.5}").unwrap();
        assert_eq!(frame.name, "x");
        assert_eq!(frame.payload, "{\"a\":1.5}");
    }

    #[test]
    fn test_empty_name_and_payload() {
        let frame = InboundFrame::parse("n").unwrap();
        assert_eq!(frame.name, "");
        assert_eq!(frame.payload, "");

        let frame = InboundFrame::parse("n.").unwrap();
        assert_eq!(frame.name, "");
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(InboundFrame::parse("").is_none());
        assert!(InboundFrame::parse("x1.2").is_none());
        assert!(InboundFrame::parse("Nleft.1").is_none());
    }

    #[test]
    fn test_encode_outbound() {
        assert_eq!(encode_next("{\"a\":1}"), "n{\"a\":1}");
        assert_eq!(encode_error("nope"), "e\"nope\"");
        assert_eq!(encode_complete(), "c");
    }
}
