//! The session engine: one instance per host process. Owns the PTY, the ring buffer, the
//! viewer set (via a broadcast channel), and the periodic timers (§4.3, §5.7).

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use ttyrelay_core::metrics::ActivityTracker;
use ttyrelay_core::paths::socket_path;
use ttyrelay_core::ring::RingBuffer;
use ttyrelay_core::{SessionId, SessionMetadata};

use crate::osc::{self, OscEvent};
use crate::protocol::{self, SessionActivityState};
use crate::pty::{self, PtyRunState, ResizeSender};
use crate::viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Exited { code: i32 },
}

impl RunState {
    pub fn is_running(self) -> bool {
        matches!(self, RunState::Running)
    }
}

/// Everything a per-viewer task needs to read and write session state. Shared via `Arc`.
pub struct Shared {
    pub id: SessionId,
    pub data_root: PathBuf,
    pub ring: AsyncMutex<RingBuffer>,
    pub live_tx: broadcast::Sender<Bytes>,
    pub writer: Arc<std::sync::Mutex<Box<dyn Write + Send>>>,
    pub resize_tx: ResizeSender,
    pub title: AsyncMutex<Option<String>>,
    pub activity: AsyncMutex<ActivityTracker>,
    pub metadata: AsyncMutex<SessionMetadata>,
    pub metadata_dirty: AtomicBool,
    pub run_state: AsyncMutex<RunState>,
    pub handshake_timeout: Duration,
    pub gzip_threshold: usize,
}

impl Shared {
    pub async fn current_state_tag(&self) -> SessionActivityState {
        match self.activity.lock().await.state() {
            ttyrelay_core::metrics::ActivityState::Active => SessionActivityState::Active,
            ttyrelay_core::metrics::ActivityState::Idle => SessionActivityState::Idle,
        }
    }
}

const LIVE_BROADCAST_CAP: usize = 256;

/// Drive one session for the lifetime of the host process: spawn the PTY, accept viewer
/// connections, run the PTY output path, and the metrics/flush timers. Returns the PTY's
/// exit code.
pub async fn run(
    id: SessionId,
    data_root: PathBuf,
    command: String,
    args: Vec<String>,
    cwd: PathBuf,
    cols: u16,
    rows: u16,
    idle_timeout: Duration,
    flush_interval: Duration,
    metrics_interval: Duration,
    handshake_timeout: Duration,
    ring_capacity: usize,
    gzip_threshold: usize,
) -> anyhow::Result<i32> {
    let started_at_iso = chrono_like_now_iso();
    let now_ms = now_ms();

    let (bridge, mut pty_rx, resize_tx, mut state_rx) =
        match pty::spawn_pty(&command, &args, &cwd, cols, rows) {
            Ok(parts) => parts,
            Err(err) => {
                let meta = SessionMetadata::spawn_failure(
                    &id,
                    command.clone(),
                    args.clone(),
                    cwd.to_string_lossy().into_owned(),
                    now_ms,
                    started_at_iso,
                    err.to_string(),
                );
                let _ = meta.save(&data_root, &id);
                return Ok(127);
            }
        };

    let pid = bridge_pid(&bridge);
    let metadata = SessionMetadata::new_running(
        &id,
        command,
        args,
        cwd.to_string_lossy().into_owned(),
        cols,
        rows,
        pid,
        now_ms,
        started_at_iso,
    );
    metadata.save(&data_root, &id)?;

    let (live_tx, _) = broadcast::channel::<Bytes>(LIVE_BROADCAST_CAP);

    let shared = Arc::new(Shared {
        id: id.clone(),
        data_root: data_root.clone(),
        ring: AsyncMutex::new(RingBuffer::new(ring_capacity)),
        live_tx,
        writer: bridge.writer.clone(),
        resize_tx,
        title: AsyncMutex::new(None),
        activity: AsyncMutex::new(ActivityTracker::new(idle_timeout)),
        metadata: AsyncMutex::new(metadata),
        metadata_dirty: AtomicBool::new(false),
        run_state: AsyncMutex::new(RunState::Running),
        handshake_timeout,
        gzip_threshold,
    });

    let sock_path = socket_path(&data_root, &id);
    let _ = std::fs::remove_file(&sock_path);
    let listener = UnixListener::bind(&sock_path)?;

    spawn_sigterm_task(shared.clone(), bridge.clone(), sock_path.clone());
    spawn_sighup_task();

    let accept_shared = shared.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let shared = accept_shared.clone();
                    tokio::spawn(async move {
                        viewer::handle_viewer(stream, shared).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    let pty_output_shared = shared.clone();
    let pty_output_task = tokio::spawn(async move {
        let mut last_observed = Instant::now();
        while let Some(chunk) = pty_rx.recv().await {
            let elapsed = last_observed.elapsed();
            last_observed = Instant::now();

            let was_idle = {
                let mut activity = pty_output_shared.activity.lock().await;
                let was_idle = activity.state() == ttyrelay_core::metrics::ActivityState::Idle;
                activity.observe(chunk.len() as u64, elapsed.max(Duration::from_millis(1)));
                was_idle
            };

            let (events, clean) = osc::extract(&chunk);
            let mut title_changed = None;
            for event in events {
                match event {
                    OscEvent::Title(t) => {
                        *pty_output_shared.title.lock().await = Some(t.clone());
                        title_changed = Some(t);
                    }
                    OscEvent::Notification(text) => {
                        let _ = pty_output_shared
                            .live_tx
                            .send(Bytes::from(protocol::encode_notification(&text)));
                    }
                }
            }

            if !clean.is_empty() {
                let mut ring = pty_output_shared.ring.lock().await;
                ring.write(&clean);
                drop(ring);
                let _ = pty_output_shared
                    .live_tx
                    .send(Bytes::from(protocol::encode_data(&clean)));
            }

            {
                let mut meta = pty_output_shared.metadata.lock().await;
                meta.last_activity = now_ms();
                if let Some(title) = &title_changed {
                    meta.title = Some(title.clone());
                }
            }
            pty_output_shared.metadata_dirty.store(true, Ordering::Relaxed);

            if let Some(title) = title_changed {
                let _ = pty_output_shared
                    .live_tx
                    .send(Bytes::from(protocol::encode_title(&title)));
                flush_metadata(&pty_output_shared).await;
            }

            if was_idle {
                let _ = pty_output_shared.live_tx.send(Bytes::from(protocol::encode_session_state(
                    SessionActivityState::Active,
                )));
            }
        }
    });

    let flush_shared = shared.clone();
    let flush_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        loop {
            ticker.tick().await;
            if flush_shared.metadata_dirty.swap(false, Ordering::Relaxed) {
                flush_metadata(&flush_shared).await;
            }
            let idle_now = {
                let mut activity = flush_shared.activity.lock().await;
                activity.tick(flush_interval);
                activity.state() == ttyrelay_core::metrics::ActivityState::Idle
            };
            if idle_now {
                let _ = flush_shared
                    .live_tx
                    .send(Bytes::from(protocol::encode_session_state(SessionActivityState::Idle)));
            }
        }
    });

    let metrics_shared = shared.clone();
    let metrics_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(metrics_interval);
        loop {
            ticker.tick().await;
            let (rates, total) = {
                let activity = metrics_shared.activity.lock().await;
                let ring = metrics_shared.ring.lock().await;
                (activity.rates(), ring.total_written())
            };
            let _ = metrics_shared.live_tx.send(Bytes::from(protocol::encode_session_metrics(
                rates.rate_1m,
                rates.rate_5m,
                rates.rate_15m,
                total,
            )));
        }
    });

    let exit_code = match state_rx.recv().await {
        Some(PtyRunState::Exited { exit_code }) => exit_code,
        None => -1,
    };

    {
        let mut run_state = shared.run_state.lock().await;
        *run_state = RunState::Exited { code: exit_code };
    }
    {
        let mut meta = shared.metadata.lock().await;
        meta.mark_exited(exit_code, now_ms());
    }
    flush_metadata(&shared).await;
    let _ = shared.live_tx.send(Bytes::from(protocol::encode_exit(exit_code)));

    tokio::time::sleep(Duration::from_secs(1)).await;

    metrics_task.abort();
    flush_task.abort();
    pty_output_task.abort();
    accept_task.abort();
    let _ = std::fs::remove_file(&sock_path);

    Ok(exit_code)
}

/// SIGTERM (§5.5): kill the PTY, flush metadata with status=exited and exitCode=-1, unlink
/// the socket, exit 0. Runs independently of the normal PTY-exit path above since a killed
/// child may report an unrelated signal-death code through `state_rx`.
fn spawn_sigterm_task(shared: Arc<Shared>, bridge: pty::PtyBridge, sock_path: PathBuf) {
    tokio::spawn(async move {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        term.recv().await;

        let _ = bridge.kill();
        {
            let mut run_state = shared.run_state.lock().await;
            *run_state = RunState::Exited { code: -1 };
        }
        {
            let mut meta = shared.metadata.lock().await;
            meta.mark_exited(-1, now_ms());
        }
        flush_metadata(&shared).await;
        let _ = shared.live_tx.send(Bytes::from(protocol::encode_exit(-1)));
        let _ = std::fs::remove_file(&sock_path);
        std::process::exit(0);
    });
}

/// SIGHUP (§4.3): a hangup on the controlling terminal must not kill the host — just drain
/// and ignore it, since the session is meant to outlive the terminal that started it.
fn spawn_sighup_task() {
    tokio::spawn(async move {
        let mut hup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(_) => return,
        };
        loop {
            hup.recv().await;
        }
    });
}

async fn flush_metadata(shared: &Shared) {
    let meta = shared.metadata.lock().await.clone();
    let _ = meta.save(&shared.data_root, &shared.id);
}

fn bridge_pid(_bridge: &pty::PtyBridge) -> u32 {
    // portable-pty's Child trait exposes process_id() on the concrete type, not the trait
    // object; the host process's own pid is what front-ends actually use for liveness
    // probing (§5.4), since the PTY child is reparented away from the host on some
    // platforms. Using our own pid matches that use.
    std::process::id()
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn chrono_like_now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
