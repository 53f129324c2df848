//! Spawn supervisor (§4.5): launches a detached `ttyrelay-host` process for a new session,
//! then attaches to it interactively.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ttyrelay_core::config::Config;
use ttyrelay_core::id::SessionId;
use ttyrelay_core::paths::socket_path;

pub fn new_session(config: &Config, command: String, args: Vec<String>, cwd: Option<String>) -> Result<()> {
    let id = SessionId::generate();
    let cwd = cwd
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));

    let host_bin = sibling_host_binary()?;

    let mut cmd = std::process::Command::new(&host_bin);
    cmd.arg(id.to_string())
        .arg(cols.to_string())
        .arg(rows.to_string())
        .arg(cwd.to_string_lossy().into_owned())
        .arg(&command);
    for a in &args {
        cmd.arg(a);
    }
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    cmd.spawn().context("spawning ttyrelay-host")?;

    wait_for_socket(&config.data_root, &id, Duration::from_secs(5))?;
    println!("[ttyrelay] started session {id}");

    crate::attach::attach(config, id.as_str())
}

fn wait_for_socket(data_root: &std::path::Path, id: &SessionId, timeout: Duration) -> Result<()> {
    let path = socket_path(data_root, id);
    let deadline = Instant::now() + timeout;
    while !path.exists() {
        if Instant::now() > deadline {
            bail!("session {id} did not start within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// The host binary ships alongside the CLI binary in the same target directory (§2).
fn sibling_host_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("resolving current executable")?;
    let dir = exe.parent().context("executable has no parent directory")?;
    let name = if cfg!(windows) { "ttyrelay-host.exe" } else { "ttyrelay-host" };
    let candidate = dir.join(name);
    if candidate.exists() {
        return Ok(candidate);
    }
    Ok(PathBuf::from(name)) // fall back to PATH lookup
}
