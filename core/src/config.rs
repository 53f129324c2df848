//! Global config singleton. Loads `settings.json` from the data root once; every caller
//! (host, cli, bridge) hits `ensure_loaded()` so the first one does the work and later
//! callers get the same instance.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::paths::default_data_root;
use crate::ring::DEFAULT_RING_CAPACITY;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Cached config from `<data_root>/settings.json`.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    /// Ring buffer capacity in bytes (default 10 MiB).
    pub ring_capacity: usize,
    /// Seconds of PTY silence before a session transitions active→idle.
    pub idle_timeout_secs: u64,
    /// Seconds between metadata flush checks.
    pub flush_interval_secs: u64,
    /// Seconds between SESSION_METRICS broadcasts.
    pub metrics_interval_secs: u64,
    /// Milliseconds a viewer handshake waits for RESUME before sending a full replay.
    pub handshake_timeout_ms: u64,
    /// Replay payloads at or above this size are sent as BUFFER_REPLAY_GZ instead.
    pub gzip_threshold_bytes: usize,
    /// Hex-encoded HMAC secret for access tokens. Generated and persisted on first use
    /// if `settings.json` doesn't carry one.
    pub token_secret_hex: String,
}

/// Ensure config is loaded (idempotent). Loads `settings.json` on first call; returns the
/// same instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    CONFIG.get_or_init(|| {
        let data_root = default_data_root();
        let path = data_root.join("settings.json");
        load_settings_from(&data_root, &path)
    })
}

fn load_settings_from(data_root: &std::path::Path, path: &std::path::Path) -> Config {
    let root: serde_json::Value = std::fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or(serde_json::Value::Null);

    let ring_capacity = root
        .get("ring_capacity_bytes")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_RING_CAPACITY);

    let idle_timeout_secs = root.get("idle_timeout_secs").and_then(|v| v.as_u64()).unwrap_or(60);

    let flush_interval_secs = root.get("flush_interval_secs").and_then(|v| v.as_u64()).unwrap_or(5);

    let metrics_interval_secs = root.get("metrics_interval_secs").and_then(|v| v.as_u64()).unwrap_or(5);

    let handshake_timeout_ms = root.get("handshake_timeout_ms").and_then(|v| v.as_u64()).unwrap_or(100);

    let gzip_threshold_bytes = root
        .get("gzip_threshold_bytes")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(64 * 1024);

    let token_secret_hex = root
        .get("token_secret_hex")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| ensure_persisted_secret(data_root));

    Config {
        data_root: data_root.to_path_buf(),
        ring_capacity,
        idle_timeout_secs,
        flush_interval_secs,
        metrics_interval_secs,
        handshake_timeout_ms,
        gzip_threshold_bytes,
        token_secret_hex,
    }
}

/// Read or create `<data_root>/token_secret`. Kept out of `settings.json` proper so the
/// secret isn't copy-pasted alongside other, shareable, settings.
fn ensure_persisted_secret(data_root: &std::path::Path) -> String {
    let secret_path = data_root.join("token_secret");
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    let secret = hex::encode(bytes);
    let _ = std::fs::create_dir_all(data_root);
    let _ = std::fs::write(&secret_path, &secret);
    secret
}

impl Default for Config {
    fn default() -> Self {
        let data_root = default_data_root();
        Config {
            token_secret_hex: ensure_persisted_secret(&data_root),
            data_root,
            ring_capacity: DEFAULT_RING_CAPACITY,
            idle_timeout_secs: 60,
            flush_interval_secs: 5,
            metrics_interval_secs: 5,
            handshake_timeout_ms: 100,
            gzip_threshold_bytes: 64 * 1024,
        }
    }
}
