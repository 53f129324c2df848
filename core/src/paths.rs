//! Well-known on-disk layout: `sessions/<id>.json` and `sockets/<id>.sock` under a data root.

use std::path::{Path, PathBuf};

use crate::id::SessionId;

const SESSIONS_DIR: &str = "sessions";
const SOCKETS_DIR: &str = "sockets";

/// Default data root: `~/.ttyrelay` (or `$USERPROFILE/.ttyrelay` on Windows).
pub fn default_data_root() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".ttyrelay")
}

/// Ensure `sessions/` and `sockets/` exist under `data_root`.
pub fn ensure_data_dirs(data_root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(sessions_dir(data_root))?;
    std::fs::create_dir_all(sockets_dir(data_root))
}

pub fn sessions_dir(data_root: &Path) -> PathBuf {
    data_root.join(SESSIONS_DIR)
}

pub fn sockets_dir(data_root: &Path) -> PathBuf {
    data_root.join(SOCKETS_DIR)
}

pub fn metadata_path(data_root: &Path, id: &SessionId) -> PathBuf {
    sessions_dir(data_root).join(format!("{id}.json"))
}

pub fn metadata_tmp_path(data_root: &Path, id: &SessionId) -> PathBuf {
    sessions_dir(data_root).join(format!("{id}.json.tmp"))
}

pub fn socket_path(data_root: &Path, id: &SessionId) -> PathBuf {
    sockets_dir(data_root).join(format!("{id}.sock"))
}
