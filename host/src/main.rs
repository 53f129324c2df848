//! Per-session PTY host process (§4.3). Invocation: `ttyrelay-host <id> <cols> <rows>
//! <cwd> <command> [args...]`. A spawn supervisor may instead set `RELAY_ORIG_COMMAND` /
//! `RELAY_ORIG_ARGS` in the environment and pass a placeholder command on argv, so the
//! user-visible process title doesn't leak the wrapper's own argv-splitting rules.

mod osc;
mod protocol;
mod pty;
mod server;
mod viewer;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use ttyrelay_core::id::SessionId;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 6 {
        eprintln!("[ttyrelay-host] usage: {} <id> <cols> <rows> <cwd> <command> [args...]", args[0]);
        std::process::exit(2);
    }

    let id = SessionId::parse(&args[1]).context("invalid session id")?;
    let cols: u16 = args[2].parse().context("invalid cols")?;
    let rows: u16 = args[3].parse().context("invalid rows")?;
    let cwd = PathBuf::from(&args[4]);

    let (command, command_args) = resolve_command(&args[5], &args[6..]);

    let config = ttyrelay_core::config::ensure_loaded();
    ttyrelay_core::paths::ensure_data_dirs(&config.data_root)?;

    println!("[ttyrelay-host] starting session {id} pid={}", std::process::id());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let exit_code = runtime.block_on(server::run(
        id.clone(),
        config.data_root.clone(),
        command,
        command_args,
        cwd,
        cols,
        rows,
        Duration::from_secs(config.idle_timeout_secs),
        Duration::from_secs(config.flush_interval_secs),
        Duration::from_secs(config.metrics_interval_secs),
        Duration::from_millis(config.handshake_timeout_ms),
        config.ring_capacity,
        config.gzip_threshold_bytes,
    ))?;

    println!("[ttyrelay-host] session {id} exited with code {exit_code}");
    std::process::exit(exit_code);
}

/// A supervisor may pass the real command through the environment so it can exec the host
/// binary under a stable argv (§4.3 step 1).
fn resolve_command(argv_command: &str, argv_rest: &[String]) -> (String, Vec<String>) {
    if let Ok(command) = std::env::var("RELAY_ORIG_COMMAND") {
        let extra_args = std::env::var("RELAY_ORIG_ARGS")
            .ok()
            .and_then(|joined| serde_json::from_str::<Vec<String>>(&joined).ok())
            .unwrap_or_default();
        return (command, extra_args);
    }
    (argv_command.to_string(), argv_rest.to_vec())
}
