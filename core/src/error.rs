//! Error taxonomy for the handful of operations a caller must branch on (§7).
//! Everything else (I/O, best-effort metadata writes) stays a plain `std::io::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session metadata at {path} is not valid JSON: {source}")]
    MetadataCorrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("access token signature does not match")]
    TokenSignatureMismatch,

    #[error("access token expired at {expiry}")]
    TokenExpired { expiry: i64 },

    #[error("access token issuer {found:?} does not match expected {expected:?}")]
    TokenIssuerMismatch { expected: String, found: String },

    #[error("access token is malformed: {0}")]
    TokenMalformed(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;
