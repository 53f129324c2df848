//! Frame body codecs for the viewer side of the wire protocol (§6) — the mirror image of
//! `ttyrelay-host`'s `protocol` module.

use ttyrelay_core::frame::{encode, Frame, FrameType};

pub fn encode_data(body: &[u8]) -> Vec<u8> {
    encode(FrameType::Data, body)
}

pub fn encode_resize(cols: u16, rows: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&cols.to_be_bytes());
    body.extend_from_slice(&rows.to_be_bytes());
    encode(FrameType::Resize, &body)
}

pub fn encode_resume(offset: f64) -> Vec<u8> {
    encode(FrameType::Resume, &offset.to_be_bytes())
}

pub fn decode_exit(body: &[u8]) -> Option<i32> {
    if body.len() != 4 {
        return None;
    }
    Some(i32::from_be_bytes([body[0], body[1], body[2], body[3]]))
}

pub fn decode_sync(body: &[u8]) -> Option<f64> {
    if body.len() != 8 {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(body);
    Some(f64::from_be_bytes(bytes))
}

pub fn decode_session_state(body: &[u8]) -> Option<bool> {
    body.first().map(|&b| b != 0)
}

pub fn payload_is_gzipped_replay(frame: &Frame) -> bool {
    frame.frame_type() == Some(FrameType::BufferReplayGz)
}

pub fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
