//! Per-viewer connection handling (§4.3, §5.7): the 100 ms resume handshake, the live
//! fan-out loop, and dispatch of viewer-sent frames (`DATA`, `RESIZE`).

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use ttyrelay_core::frame::{Frame, FrameParser};
use ttyrelay_core::ring::ReadFrom;

use crate::protocol;
use crate::server::{RunState, Shared};

/// Outcome of the handshake window: either a resume offset was honored, or time ran out
/// and a full replay is owed.
enum HandshakeOutcome {
    Resume(f64),
    FullReplay,
    ConnectionClosed,
}

pub async fn handle_viewer(stream: UnixStream, shared: Arc<Shared>) {
    let (read_half, write_half) = stream.into_split();
    let write_half = Arc::new(tokio::sync::Mutex::new(write_half));
    let mut read_half = read_half;
    let mut parser = FrameParser::new();

    let outcome = tokio::time::timeout(
        shared.handshake_timeout,
        wait_for_resume(&mut read_half, &mut parser),
    )
    .await
    .unwrap_or(HandshakeOutcome::FullReplay);

    if matches!(outcome, HandshakeOutcome::ConnectionClosed) {
        return;
    }

    let mut live_rx = shared.live_tx.subscribe();

    if send_handshake_reply(&write_half, &shared, &outcome).await.is_err() {
        return;
    }

    let write_half_live = write_half.clone();
    let live_to_viewer = async move {
        loop {
            match live_rx.recv().await {
                Ok(bytes) => {
                    let mut w = write_half_live.lock().await;
                    if w.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let viewer_to_host = async {
        let mut buf = [0u8; 4096];
        loop {
            let n = match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let shared = shared.clone();
            parser.feed(&buf[..n], |frame| dispatch_viewer_frame(&frame, &shared));
        }
    };

    tokio::select! {
        _ = live_to_viewer => {}
        _ = viewer_to_host => {}
    }
}

/// Wait for a `RESUME` frame to arrive before anything else; ignores any other frame kind
/// received during the window (§5.7 invariant 3 only binds what the *host* sends first).
async fn wait_for_resume(
    read_half: &mut tokio::net::unix::OwnedReadHalf,
    parser: &mut FrameParser,
) -> HandshakeOutcome {
    let mut buf = [0u8; 4096];
    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => return HandshakeOutcome::ConnectionClosed,
            Ok(n) => n,
        };
        let mut resume_offset = None;
        parser.feed(&buf[..n], |frame| {
            if resume_offset.is_none() && protocol::is_resume(&frame) {
                resume_offset = protocol::decode_resume(&frame.body);
            }
        });
        if let Some(offset) = resume_offset {
            return HandshakeOutcome::Resume(offset);
        }
    }
}

fn dispatch_viewer_frame(frame: &Frame, shared: &Arc<Shared>) {
    if protocol::is_data(frame) {
        if let Ok(run_state) = shared.run_state.try_lock() {
            if !run_state.is_running() {
                return;
            }
        }
        let body = frame.body.clone();
        let writer = shared.writer.clone();
        tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = writer.lock() {
                let _ = guard.write_all(&body);
                let _ = guard.flush();
            }
        });
        return;
    }

    if protocol::is_resize(frame) {
        if let Some((cols, rows)) = protocol::decode_resize(&frame.body) {
            let _ = shared.resize_tx.send((cols, rows));
            let shared = shared.clone();
            tokio::spawn(async move {
                let mut meta = shared.metadata.lock().await;
                meta.cols = cols;
                meta.rows = rows;
                shared.metadata_dirty.store(true, std::sync::atomic::Ordering::Relaxed);
            });
        }
    }
}

async fn send_handshake_reply(
    write_half: &Arc<tokio::sync::Mutex<tokio::net::unix::OwnedWriteHalf>>,
    shared: &Shared,
    outcome: &HandshakeOutcome,
) -> std::io::Result<()> {
    let mut w = write_half.lock().await;

    match outcome {
        HandshakeOutcome::Resume(offset) => {
            let read = if *offset <= 0.0 {
                None
            } else {
                let ring = shared.ring.lock().await;
                Some(ring.read_from(*offset as u64))
            };
            match read {
                None | Some(ReadFrom::TooOld) => send_full_replay(&mut w, shared).await?,
                Some(ReadFrom::UpToDate) => {
                    w.write_all(&protocol::encode_buffer_replay(&[])).await?;
                }
                Some(ReadFrom::Delta(bytes)) => {
                    w.write_all(&protocol::encode_buffer_replay(&bytes)).await?;
                }
            }
        }
        HandshakeOutcome::FullReplay => send_full_replay(&mut w, shared).await?,
        HandshakeOutcome::ConnectionClosed => unreachable!("checked by caller"),
    }

    let total_written = shared.ring.lock().await.total_written();
    w.write_all(&protocol::encode_sync(total_written)).await?;

    if let Some(title) = shared.title.lock().await.clone() {
        w.write_all(&protocol::encode_title(&title)).await?;
    }

    let state_tag = shared.current_state_tag().await;
    w.write_all(&protocol::encode_session_state(state_tag)).await?;

    if let RunState::Exited { code } = *shared.run_state.lock().await {
        w.write_all(&protocol::encode_exit(code)).await?;
    }

    Ok(())
}

async fn send_full_replay(
    w: &mut tokio::net::unix::OwnedWriteHalf,
    shared: &Shared,
) -> std::io::Result<()> {
    let bytes = shared.ring.lock().await.read_full();
    if bytes.len() >= shared.gzip_threshold {
        if let Ok(gzipped) = gzip(&bytes) {
            return w.write_all(&protocol::encode_buffer_replay_gz(&gzipped)).await;
        }
    }
    w.write_all(&protocol::encode_buffer_replay(&bytes)).await
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
