//! Length-prefixed frame codec (§4.1). A frame on the wire is
//! `[4-byte BE length][tag byte][body]`; on a domain socket the length prefix is explicit,
//! on WebSocket the transport already supplies message boundaries so only `tag + body`
//! (the "payload") crosses the wire.

/// Closed enumeration of protocol message kinds (§6). Values are the wire tag bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x00,
    Resize = 0x01,
    Exit = 0x02,
    BufferReplay = 0x03,
    Title = 0x04,
    Notification = 0x05,
    Resume = 0x10,
    Sync = 0x11,
    SessionState = 0x12,
    BufferReplayGz = 0x13,
    SessionMetrics = 0x14,
}

impl FrameType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        use FrameType::*;
        Some(match tag {
            0x00 => Data,
            0x01 => Resize,
            0x02 => Exit,
            0x03 => BufferReplay,
            0x04 => Title,
            0x05 => Notification,
            0x10 => Resume,
            0x11 => Sync,
            0x12 => SessionState,
            0x13 => BufferReplayGz,
            0x14 => SessionMetrics,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A parsed frame: the tag byte plus the body that followed it. Owns its bytes so it can
/// outlive the stream buffer it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(tag: u8, body: impl Into<Vec<u8>>) -> Self {
        Self { tag, body: body.into() }
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_tag(self.tag)
    }
}

/// Build a WebSocket-transport payload: `[tag][body]`, no length prefix.
pub fn payload(tag: FrameType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag.tag());
    out.extend_from_slice(body);
    out
}

/// Encode a domain-socket frame: `[4-byte BE length][tag][body]`.
pub fn encode(tag: FrameType, body: &[u8]) -> Vec<u8> {
    encode_payload(&payload(tag, body))
}

/// Length-prefix an already-built payload (tag + body). Used when re-framing a WebSocket
/// payload onto a domain socket, or vice versa.
pub fn encode_payload(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incrementally accumulates bytes from a domain socket and yields complete frames.
/// Reentrant across reads: partial frames are preserved in `buf` for the next `feed`.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read bytes and greedily parse as many complete frames as are present,
    /// invoking `visit` for each. A length of 0 yields no invocation (§4.1).
    pub fn feed(&mut self, chunk: &[u8], mut visit: impl FnMut(Frame)) {
        self.buf.extend_from_slice(chunk);
        loop {
            if self.buf.len() < 4 {
                return;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if self.buf.len() < 4 + len {
                return;
            }
            let frame_end = 4 + len;
            let payload = &self.buf[4..frame_end];
            if !payload.is_empty() {
                visit(Frame::new(payload[0], &payload[1..]));
            }
            self.buf.drain(..frame_end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_single_frame() {
        let mut parser = FrameParser::new();
        let encoded = encode(FrameType::Data, b"HELLO");
        let mut seen = Vec::new();
        parser.feed(&encoded, |f| seen.push(f));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].tag, FrameType::Data.tag());
        assert_eq!(seen[0].body, b"HELLO");
    }

    #[test]
    fn zero_length_frame_yields_no_invocation() {
        let mut parser = FrameParser::new();
        let mut seen = Vec::new();
        parser.feed(&0u32.to_be_bytes(), |f| seen.push(f));
        assert!(seen.is_empty());
    }

    #[test]
    fn straddled_frame_is_not_mis_split() {
        let encoded = encode(FrameType::Data, b"HELLO");
        for split in 0..=encoded.len() {
            let mut parser = FrameParser::new();
            let mut seen = Vec::new();
            parser.feed(&encoded[..split], |f| seen.push(f));
            parser.feed(&encoded[split..], |f| seen.push(f));
            assert_eq!(seen.len(), 1, "split at {split} produced {} frames", seen.len());
            assert_eq!(seen[0].body, b"HELLO");
        }
    }

    #[test]
    fn preserves_unconsumed_trailing_bytes_across_feeds() {
        let mut parser = FrameParser::new();
        let f1 = encode(FrameType::Data, b"one");
        let f2 = encode(FrameType::Title, b"two");
        let mut combined = f1.clone();
        combined.extend_from_slice(&f2);

        let mut seen = Vec::new();
        // Feed byte-by-byte to stress the reentrancy of the parser.
        for byte in &combined {
            parser.feed(&[*byte], |f| seen.push(f));
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].body, b"one");
        assert_eq!(seen[1].body, b"two");
    }

    proptest! {
        #[test]
        fn arbitrary_payloads_round_trip_under_arbitrary_chunking(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..8),
            chunk_size in 1usize..37,
        ) {
            let mut stream = Vec::new();
            for p in &payloads {
                stream.extend_from_slice(&encode_payload(p));
            }

            let mut parser = FrameParser::new();
            let mut seen: Vec<Vec<u8>> = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                parser.feed(chunk, |f| {
                    let mut full = vec![f.tag];
                    full.extend_from_slice(&f.body);
                    seen.push(full);
                });
            }

            let non_empty: Vec<_> = payloads.iter().filter(|p| !p.is_empty()).cloned().collect();
            prop_assert_eq!(seen, non_empty);
        }
    }
}
