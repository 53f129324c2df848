//! WebSocket ↔ host-socket relay (§4.7): one fresh viewer connection to the host's domain
//! socket per WebSocket connection, frames translated 1:1 in both directions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use ttyrelay_core::frame::{Frame, FrameParser, FrameType};

/// A connected viewer's access level: full viewers may send any frame; share-token viewers
/// (§4.6) may only send RESUME — the read-only enforcement lives here, not at the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// Relay `socket` to the host listening at `sock_path` until either side closes. Frames are
/// passed through unchanged; only an `Access::ReadOnly` viewer has its outbound frames
/// filtered to RESUME only.
pub async fn relay(mut socket: WebSocket, sock_path: std::path::PathBuf, access: Access) {
    let stream = match UnixStream::connect(&sock_path).await {
        Ok(s) => s,
        Err(e) => {
            let _ = socket
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: 1011,
                    reason: format!("host unreachable: {e}").into(),
                })))
                .await;
            return;
        }
    };

    let (host_read, host_write) = stream.into_split();
    let host_write = Arc::new(tokio::sync::Mutex::new(host_write));
    let (mut ws_tx, mut ws_rx) = socket.split();

    let last_exit_code = Arc::new(std::sync::Mutex::new(None::<i32>));
    let already_relayed_exit = Arc::new(AtomicBool::new(false));

    let host_to_ws = {
        let last_exit_code = last_exit_code.clone();
        let already_relayed_exit = already_relayed_exit.clone();
        async move {
            let mut host_read = host_read;
            let mut parser = FrameParser::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = match host_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let mut to_send: Vec<Vec<u8>> = Vec::new();
                parser.feed(&buf[..n], |frame: Frame| {
                    if frame.frame_type() == Some(FrameType::Exit) {
                        already_relayed_exit.store(true, Ordering::SeqCst);
                        if let Some(code) = decode_exit(&frame.body) {
                            *last_exit_code.lock().unwrap() = Some(code);
                        }
                    }
                    let mut ws_payload = Vec::with_capacity(1 + frame.body.len());
                    ws_payload.push(frame.tag);
                    ws_payload.extend_from_slice(&frame.body);
                    to_send.push(ws_payload);
                });
                for payload in to_send {
                    if ws_tx.send(Message::Binary(Bytes::from(payload))).await.is_err() {
                        return;
                    }
                }
            }
            // The host closed without ever sending EXIT (killed, crashed); synthesize one
            // from the last code we observed, if any (§4.7). If a real EXIT already went
            // out, the host's own close 1s later must not produce a second one.
            if !already_relayed_exit.load(Ordering::SeqCst) {
                if let Some(code) = *last_exit_code.lock().unwrap() {
                    let payload = ttyrelay_core::frame::payload(FrameType::Exit, &code.to_be_bytes());
                    let _ = ws_tx.send(Message::Binary(Bytes::from(payload))).await;
                }
            }
            let _ = ws_tx.close().await;
        }
    };

    let ws_to_host = async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let bytes = match msg {
                Message::Binary(b) => b.to_vec(),
                Message::Close(_) => break,
                _ => continue,
            };
            if access == Access::ReadOnly && !is_resume_payload(&bytes) {
                continue;
            }
            let framed = ttyrelay_core::frame::encode_payload(&bytes);
            let mut w = host_write.lock().await;
            if w.write_all(&framed).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = host_to_ws => {}
        _ = ws_to_host => {}
    }
}

fn decode_exit(body: &[u8]) -> Option<i32> {
    if body.len() != 4 {
        return None;
    }
    Some(i32::from_be_bytes([body[0], body[1], body[2], body[3]]))
}

/// A WebSocket message carries a single un-length-prefixed `[tag][body]` frame (§6: WS
/// supplies its own message boundaries, so the 4-byte length prefix used on Unix sockets is
/// omitted here).
fn is_resume_payload(bytes: &[u8]) -> bool {
    bytes.first() == Some(&ttyrelay_core::frame::FrameType::Resume.tag())
}
