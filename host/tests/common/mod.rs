//! Reusable harness for host integration tests: spawns the compiled `ttyrelay-host`
//! binary against an isolated `HOME`, and speaks the length-prefixed frame protocol over
//! its domain socket.

use std::fs;
use std::io;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

pub const TAG_DATA: u8 = 0x00;
pub const TAG_RESIZE: u8 = 0x01;
pub const TAG_EXIT: u8 = 0x02;
pub const TAG_BUFFER_REPLAY: u8 = 0x03;
pub const TAG_TITLE: u8 = 0x04;
#[allow(dead_code)]
pub const TAG_NOTIFICATION: u8 = 0x05;
pub const TAG_RESUME: u8 = 0x10;
pub const TAG_SYNC: u8 = 0x11;
pub const TAG_SESSION_STATE: u8 = 0x12;
#[allow(dead_code)]
pub const TAG_BUFFER_REPLAY_GZ: u8 = 0x13;
#[allow(dead_code)]
pub const TAG_SESSION_METRICS: u8 = 0x14;

pub struct Frame {
    pub tag: u8,
    pub data: Vec<u8>,
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub struct SocketClient {
    stream: UnixStream,
    read_buf: Vec<u8>,
}

impl SocketClient {
    pub fn new(stream: UnixStream) -> Self {
        stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
        Self { stream, read_buf: Vec::new() }
    }

    pub fn send_frame(&mut self, tag: u8, data: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(tag);
        payload.extend_from_slice(data);
        self.stream.write_all(&encode_frame(&payload))
    }

    pub fn send_resume(&mut self, offset: f64) -> io::Result<()> {
        self.send_frame(TAG_RESUME, &offset.to_be_bytes())
    }

    pub fn send_resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&cols.to_be_bytes());
        data.extend_from_slice(&rows.to_be_bytes());
        self.send_frame(TAG_RESIZE, &data)
    }

    pub fn send_data(&mut self, data: &[u8]) -> io::Result<()> {
        self.send_frame(TAG_DATA, data)
    }

    pub fn recv_frame(&mut self) -> Option<Frame> {
        use std::io::Read;
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if self.read_buf.len() >= 4 {
                let len = u32::from_be_bytes([
                    self.read_buf[0],
                    self.read_buf[1],
                    self.read_buf[2],
                    self.read_buf[3],
                ]) as usize;
                if self.read_buf.len() >= 4 + len && len > 0 {
                    let payload: Vec<u8> = self.read_buf[4..4 + len].to_vec();
                    self.read_buf = self.read_buf[4 + len..].to_vec();
                    return Some(Frame { tag: payload[0], data: payload[1..].to_vec() });
                }
                if self.read_buf.len() >= 4 + len {
                    // zero-length frame: drain and keep looking
                    self.read_buf = self.read_buf[4 + len..].to_vec();
                    continue;
                }
            }
            if Instant::now() > deadline {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.stream.set_read_timeout(Some(remaining.max(Duration::from_millis(50)))).ok();
            let mut buf = [0u8; 65536];
            match self.stream.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn wait_for(&mut self, target_tag: u8, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                return None;
            }
            match self.recv_frame() {
                Some(frame) if frame.tag == target_tag => return Some(frame),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    pub fn collect_for(&mut self, timeout: Duration) -> Vec<Frame> {
        let deadline = Instant::now() + timeout;
        let mut frames = Vec::new();
        loop {
            if Instant::now() > deadline {
                break;
            }
            match self.recv_frame() {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }
}

pub struct HostHandle {
    pub child: Child,
    pub socket_path: PathBuf,
    pub session_path: PathBuf,
    pub home_dir: PathBuf,
    pub session_id: String,
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = fs::remove_dir_all(&self.home_dir);
    }
}

fn binary_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // workspace root
    path.push("target");
    path.push("debug");
    path.push("ttyrelay-host");
    path
}

pub fn spawn_host(command: &str, args: &[&str]) -> io::Result<HostHandle> {
    let bin = binary_path();
    if !bin.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("binary not found at {bin:?}; run `cargo build` first"),
        ));
    }

    #[allow(deprecated)]
    let home_dir = tempfile::tempdir()?.into_path();
    let data_dir = home_dir.join(".ttyrelay");
    let session_id = format!("{:08x}", rand_u32());

    let socket_dir = data_dir.join("sockets");
    let session_dir = data_dir.join("sessions");
    fs::create_dir_all(&socket_dir)?;
    fs::create_dir_all(&session_dir)?;

    let socket_path = socket_dir.join(format!("{session_id}.sock"));
    let session_path = session_dir.join(format!("{session_id}.json"));

    let mut cmd = Command::new(&bin);
    cmd.arg(&session_id).arg("80").arg("24").arg("/tmp").arg(command);
    for arg in args {
        cmd.arg(arg);
    }
    cmd.env("HOME", &home_dir);

    let child = cmd.spawn()?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while !socket_path.exists() {
        if Instant::now() > deadline {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "socket did not appear"));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(50));

    Ok(HostHandle { child, socket_path, session_path, home_dir, session_id })
}

/// Spawn a host whose command cannot start at all (§5.1). The host writes a spawn-failure
/// metadata record and exits without ever binding a socket, so callers must poll the
/// metadata file directly instead of waiting on `socket_path.exists()`.
pub fn spawn_host_expecting_no_socket(command: &str) -> PathBuf {
    let bin = binary_path();
    assert!(bin.exists(), "binary not found at {bin:?}; run `cargo build` first");

    #[allow(deprecated)]
    let home_dir = tempfile::tempdir().unwrap().into_path();
    let data_dir = home_dir.join(".ttyrelay");
    let session_id = format!("{:08x}", rand_u32());
    fs::create_dir_all(data_dir.join("sockets")).unwrap();
    fs::create_dir_all(data_dir.join("sessions")).unwrap();
    let session_path = data_dir.join("sessions").join(format!("{session_id}.json"));

    let mut cmd = Command::new(&bin);
    cmd.arg(&session_id).arg("80").arg("24").arg("/tmp").arg(command);
    cmd.env("HOME", &home_dir);
    let _child = cmd.spawn().expect("spawn ttyrelay-host");

    session_path
}

pub fn connect(socket_path: &Path) -> io::Result<SocketClient> {
    Ok(SocketClient::new(UnixStream::connect(socket_path)?))
}

pub fn read_session_json(session_path: &Path) -> io::Result<serde_json::Value> {
    let content = fs::read_to_string(session_path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn rand_u32() -> u32 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    hasher.finish() as u32
}
