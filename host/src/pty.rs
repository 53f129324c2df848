//! PTY spawning and lifecycle (§4.3, §5.1, §5.5). One pseudo-terminal per host process.
//! The child is wrapped in a `Mutex` so a poll thread can watch `try_wait()` independently
//! of the blocking reader thread.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{self, Arc, Mutex};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::mpsc;

/// Build the command to run in the PTY. `RELAY_ORIG_COMMAND`/`RELAY_ORIG_ARGS` let a
/// supervisor pass through the user-intended program without the host needing its own
/// argv-splitting rules (§4.3 step 1).
pub fn command_for(command: &str, args: &[String], cwd: &Path) -> CommandBuilder {
    let mut c = CommandBuilder::new(command);
    for arg in args {
        c.arg(arg);
    }
    c.cwd(cwd);
    c.env("TERM", "xterm-256color");
    c.env("COLORTERM", "truecolor");
    c.env_remove("RELAY_ORIG_COMMAND");
    c.env_remove("RELAY_ORIG_ARGS");
    c
}

/// Final state of the PTY child, reported once by the poll thread.
#[derive(Debug, Clone, Copy)]
pub enum PtyRunState {
    Exited { exit_code: i32 },
}

/// Sender used to request a PTY resize (cols, rows); consumed by a dedicated thread that
/// calls `master.resize()`.
pub type ResizeSender = sync::mpsc::Sender<(u16, u16)>;

#[derive(Clone)]
pub struct PtyBridge {
    pub writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
}

impl PtyBridge {
    pub fn kill(&self) -> std::io::Result<()> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| std::io::Error::other("pty child mutex poisoned"))?;
        guard.kill()
    }
}

/// Spawn `command` with `args` in `cwd`, inside a PTY of size `cols`x`rows`. Returns the
/// bridge, a receiver for raw PTY output, a resize sender, and a receiver that fires once
/// with the final run state when the child exits.
pub fn spawn_pty(
    command: &str,
    args: &[String],
    cwd: &Path,
    cols: u16,
    rows: u16,
) -> anyhow::Result<(
    PtyBridge,
    mpsc::Receiver<Vec<u8>>,
    ResizeSender,
    mpsc::Receiver<PtyRunState>,
)> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    })?;

    let cmd = command_for(command, args, cwd);
    let child = pair.slave.spawn_command(cmd)?;

    let mut reader = pair.master.try_clone_reader()?;
    let writer = pair.master.take_writer()?;
    let master = pair.master;

    let (tx, rx) = mpsc::channel::<Vec<u8>>(256);
    let (resize_tx, resize_rx) = sync::mpsc::channel::<(u16, u16)>();
    let (state_tx, state_rx) = mpsc::channel::<PtyRunState>(1);

    let child = Arc::new(Mutex::new(child));

    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    std::thread::spawn(move || {
        while let Ok((cols, rows)) = resize_rx.recv() {
            let _ = master.resize(PtySize {
                cols,
                rows,
                pixel_width: 0,
                pixel_height: 0,
            });
        }
    });

    let child_poll = Arc::clone(&child);
    std::thread::spawn(move || loop {
        let exit_status = {
            let mut guard = match child_poll.lock() {
                Ok(g) => g,
                Err(_) => break,
            };
            match guard.try_wait() {
                Ok(None) => None,
                Ok(Some(status)) => Some(status.exit_code()),
                Err(_) => break,
            }
        };
        if let Some(code) = exit_status {
            // portable-pty reports signal deaths as 128+signum on Unix already.
            let _ = state_tx.blocking_send(PtyRunState::Exited {
                exit_code: code as i32,
            });
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(200));
    });

    let bridge = PtyBridge {
        writer: Arc::new(Mutex::new(writer)),
        child,
    };
    Ok((bridge, rx, resize_tx, state_rx))
}
