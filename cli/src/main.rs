//! Front-end CLI: spawn a session, attach to it, list/stop sessions, and mint share links
//! (§4.5–§4.7).

mod attach;
mod discovery;
mod protocol;
mod spawn;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ttyrelay", about = "Persistent, multiplexed access to terminal sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new session running `command` and attach to it.
    New {
        command: String,
        args: Vec<String>,
        #[arg(long)]
        cwd: Option<String>,
    },
    /// Attach to an existing session by id.
    Attach { id: String },
    /// List known sessions, probing liveness and repairing stale metadata.
    List,
    /// Terminate a running session.
    Stop { id: String },
    /// Mint an HMAC-signed read-only share link for a session.
    Share {
        id: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ttyrelay_core::config::ensure_loaded();
    ttyrelay_core::paths::ensure_data_dirs(&config.data_root).context("preparing data directories")?;

    match cli.command {
        Command::New { command, args, cwd } => spawn::new_session(config, command, args, cwd),
        Command::Attach { id } => attach::attach(config, &id),
        Command::List => discovery::list(config),
        Command::Stop { id } => discovery::stop(config, &id),
        Command::Share { id, ttl_secs } => discovery::share(config, &id, ttl_secs),
    }
}
