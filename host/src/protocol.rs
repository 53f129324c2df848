//! Body codecs for each frame kind (§6). `core::frame` only knows about tag + raw bytes;
//! this module knows what those bytes mean.

use ttyrelay_core::frame::{encode, Frame, FrameType};

pub fn encode_data(body: &[u8]) -> Vec<u8> {
    encode(FrameType::Data, body)
}

pub fn encode_exit(code: i32) -> Vec<u8> {
    encode(FrameType::Exit, &code.to_be_bytes())
}

pub fn encode_buffer_replay(body: &[u8]) -> Vec<u8> {
    encode(FrameType::BufferReplay, body)
}

pub fn encode_buffer_replay_gz(gzipped: &[u8]) -> Vec<u8> {
    encode(FrameType::BufferReplayGz, gzipped)
}

pub fn encode_title(title: &str) -> Vec<u8> {
    encode(FrameType::Title, title.as_bytes())
}

pub fn encode_notification(text: &str) -> Vec<u8> {
    encode(FrameType::Notification, text.as_bytes())
}

pub fn encode_sync(total_written: u64) -> Vec<u8> {
    encode(FrameType::Sync, &(total_written as f64).to_be_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionActivityState {
    Idle = 0,
    Active = 1,
}

pub fn encode_session_state(state: SessionActivityState) -> Vec<u8> {
    encode(FrameType::SessionState, &[state as u8])
}

pub fn encode_session_metrics(bps1: f64, bps5: f64, bps15: f64, total_bytes: u64) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    body.extend_from_slice(&bps1.to_be_bytes());
    body.extend_from_slice(&bps5.to_be_bytes());
    body.extend_from_slice(&bps15.to_be_bytes());
    body.extend_from_slice(&(total_bytes as f64).to_be_bytes());
    encode(FrameType::SessionMetrics, &body)
}

/// Parse a `RESIZE` body: 2x uint16 BE (cols, rows).
pub fn decode_resize(body: &[u8]) -> Option<(u16, u16)> {
    if body.len() != 4 {
        return None;
    }
    let cols = u16::from_be_bytes([body[0], body[1]]);
    let rows = u16::from_be_bytes([body[2], body[3]]);
    Some((cols, rows))
}

/// Parse a `RESUME` body: float64 BE offset.
pub fn decode_resume(body: &[u8]) -> Option<f64> {
    if body.len() != 8 {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(body);
    Some(f64::from_be_bytes(bytes))
}

/// True if `frame` is a `RESUME` frame, per its tag.
pub fn is_resume(frame: &Frame) -> bool {
    frame.frame_type() == Some(FrameType::Resume)
}

/// True if `frame` is a `DATA` frame (viewer input to forward to the PTY).
pub fn is_data(frame: &Frame) -> bool {
    frame.frame_type() == Some(FrameType::Data)
}

/// True if `frame` is a `RESIZE` frame.
pub fn is_resize(frame: &Frame) -> bool {
    frame.frame_type() == Some(FrameType::Resize)
}
