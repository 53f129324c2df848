//! Crash-safe on-disk session metadata (§6): `sessions/<id>.json`, written atomically via
//! `<id>.json.tmp` + rename.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::id::SessionId;
use crate::paths::{metadata_path, metadata_tmp_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Exited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "lastActivity")]
    pub last_activity: i64,
    pub status: SessionStatus,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(rename = "exitedAt", skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<i64>,
    pub cols: u16,
    pub rows: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "totalBytesWritten", skip_serializing_if = "Option::is_none")]
    pub total_bytes_written: Option<u64>,
    #[serde(rename = "lastActiveAt", skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<String>,
    #[serde(rename = "bytesPerSecond", skip_serializing_if = "Option::is_none")]
    pub bytes_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps15: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionMetadata {
    pub fn new_running(
        id: &SessionId,
        command: String,
        args: Vec<String>,
        cwd: String,
        cols: u16,
        rows: u16,
        pid: u32,
        now_ms: i64,
        started_at_iso: String,
    ) -> Self {
        Self {
            id: id.to_string(),
            command,
            args,
            cwd,
            created_at: now_ms,
            last_activity: now_ms,
            status: SessionStatus::Running,
            exit_code: None,
            exited_at: None,
            cols,
            rows,
            pid: Some(pid),
            title: None,
            started_at: started_at_iso,
            total_bytes_written: Some(0),
            last_active_at: None,
            bytes_per_second: None,
            bps1: None,
            bps5: None,
            bps15: None,
            error: None,
        }
    }

    /// Build a stillborn record for a spawn that failed before the PTY came up (§5.1).
    pub fn spawn_failure(
        id: &SessionId,
        command: String,
        args: Vec<String>,
        cwd: String,
        now_ms: i64,
        started_at_iso: String,
        error: String,
    ) -> Self {
        Self {
            id: id.to_string(),
            command,
            args,
            cwd,
            created_at: now_ms,
            last_activity: now_ms,
            status: SessionStatus::Exited,
            exit_code: Some(127),
            exited_at: Some(now_ms),
            cols: 80,
            rows: 24,
            pid: None,
            title: None,
            started_at: started_at_iso,
            total_bytes_written: Some(0),
            last_active_at: None,
            bytes_per_second: None,
            bps1: None,
            bps5: None,
            bps15: None,
            error: Some(error),
        }
    }

    pub fn mark_exited(&mut self, exit_code: i32, now_ms: i64) {
        self.status = SessionStatus::Exited;
        self.exit_code = Some(exit_code);
        self.exited_at = Some(now_ms);
    }

    /// Read and parse a metadata file. A corrupt file yields `CoreError::MetadataCorrupt`;
    /// callers that scan the directory (§5.4) treat this as "delete and move on".
    pub fn load(path: &Path) -> CoreResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CoreError::MetadataCorrupt {
            path: path.to_path_buf(),
            source: serde_json::Error::from(e),
        })?;
        serde_json::from_str(&data).map_err(|source| CoreError::MetadataCorrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Atomically write `<id>.json`: serialize to `<id>.json.tmp`, then rename over the
    /// final path. Falls back to a direct (non-atomic) write if the rename step fails.
    pub fn save(&self, data_root: &Path, id: &SessionId) -> std::io::Result<()> {
        let final_path = metadata_path(data_root, id);
        let tmp_path = metadata_tmp_path(data_root, id);
        let body = serde_json::to_vec_pretty(self).expect("SessionMetadata always serializes");

        match std::fs::write(&tmp_path, &body).and_then(|_| std::fs::rename(&tmp_path, &final_path)) {
            Ok(()) => Ok(()),
            Err(_) => std::fs::write(&final_path, &body),
        }
    }
}
