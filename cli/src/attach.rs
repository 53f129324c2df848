//! Interactive CLI attach (§4.7): raw TTY mode, Ctrl+] to detach, exponential-backoff
//! reconnect while the session is still alive.

use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use ttyrelay_core::config::Config;
use ttyrelay_core::frame::FrameParser;
use ttyrelay_core::id::SessionId;
use ttyrelay_core::paths::{metadata_path, socket_path};

use crate::protocol;

/// Sentinel byte (Ctrl+]) that detaches the CLI from the session without killing it.
const DETACH_SENTINEL: u8 = 0x1d;

enum StdinMsg {
    Data(Vec<u8>),
    Detach,
}

pub fn attach(config: &Config, id_str: &str) -> Result<()> {
    let id = SessionId::parse(id_str).context("invalid session id")?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    enable_raw_mode().ok();
    let result = rt.block_on(attach_loop(config, &id));
    let _ = disable_raw_mode();

    result
}

async fn attach_loop(config: &Config, id: &SessionId) -> Result<()> {
    let (tx, rx) = mpsc::channel::<StdinMsg>();
    spawn_stdin_reader(tx);

    let mut backoff = Duration::from_millis(500);
    let mut last_offset: f64 = 0.0;

    loop {
        let sock_path = socket_path(&config.data_root, id);
        match UnixStream::connect(&sock_path).await {
            Ok(stream) => {
                backoff = Duration::from_millis(500);
                match run_session(stream, &rx, last_offset).await {
                    SessionOutcome::Exited(code) => {
                        println!("\r\n[ttyrelay] session exited with code {code}");
                        return Ok(());
                    }
                    SessionOutcome::Detached => {
                        eprintln!("\r\n[ttyrelay] detached");
                        return Ok(());
                    }
                    SessionOutcome::Disconnected(offset) => {
                        last_offset = offset;
                    }
                }
            }
            Err(_) => {}
        }

        if !session_still_alive(config, id) {
            eprintln!("\r\n[ttyrelay] session {id} is no longer running");
            return Ok(());
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(5));
    }
}

enum SessionOutcome {
    Exited(i32),
    Detached,
    Disconnected(f64),
}

async fn run_session(stream: UnixStream, rx: &mpsc::Receiver<StdinMsg>, resume_from: f64) -> SessionOutcome {
    let (mut read_half, mut write_half) = stream.into_split();

    if write_half.write_all(&protocol::encode_resume(resume_from)).await.is_err() {
        return SessionOutcome::Disconnected(resume_from);
    }

    let mut parser = FrameParser::new();
    let mut buf = [0u8; 8192];
    let mut stdout = std::io::stdout();
    let mut offset = resume_from;

    loop {
        while let Ok(msg) = rx.try_recv() {
            match msg {
                StdinMsg::Data(bytes) => {
                    if write_half.write_all(&protocol::encode_data(&bytes)).await.is_err() {
                        return SessionOutcome::Disconnected(offset);
                    }
                }
                StdinMsg::Detach => return SessionOutcome::Detached,
            }
        }

        let n = tokio::select! {
            result = read_half.read(&mut buf) => match result {
                Ok(0) | Err(_) => return SessionOutcome::Disconnected(offset),
                Ok(n) => n,
            },
            _ = tokio::time::sleep(Duration::from_millis(10)) => continue,
        };

        let mut exit_code = None;
        parser.feed(&buf[..n], |frame| {
            use ttyrelay_core::frame::FrameType;
            match frame.frame_type() {
                Some(FrameType::Data) | Some(FrameType::BufferReplay) => {
                    let _ = stdout.write_all(&frame.body);
                    let _ = stdout.flush();
                }
                Some(FrameType::BufferReplayGz) => {
                    if let Ok(decompressed) = protocol::decompress_gzip(&frame.body) {
                        let _ = stdout.write_all(&decompressed);
                        let _ = stdout.flush();
                    }
                }
                Some(FrameType::Sync) => {
                    if let Some(total) = protocol::decode_sync(&frame.body) {
                        offset = total;
                    }
                }
                Some(FrameType::Exit) => {
                    if let Some(code) = protocol::decode_exit(&frame.body) {
                        exit_code = Some(code);
                    }
                }
                _ => {}
            }
        });

        if let Some(code) = exit_code {
            return SessionOutcome::Exited(code);
        }
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<StdinMsg>) {
    std::thread::spawn(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut byte = [0u8; 1];
        loop {
            match stdin.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if byte[0] == DETACH_SENTINEL {
                        let _ = tx.send(StdinMsg::Detach);
                        break;
                    }
                    if tx.send(StdinMsg::Data(vec![byte[0]])).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

fn session_still_alive(config: &Config, id: &SessionId) -> bool {
    if socket_path(&config.data_root, id).exists() {
        return true;
    }
    match ttyrelay_core::metadata::SessionMetadata::load(&metadata_path(&config.data_root, id)) {
        Ok(meta) => meta.status == ttyrelay_core::metadata::SessionStatus::Running,
        Err(_) => false,
    }
}
