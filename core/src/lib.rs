//! Shared types for the ttyrelay workspace: wire framing, the replay ring buffer, on-disk
//! session metadata, activity tracking, and share-token verification. No networking or PTY
//! code lives here — that's `host`, `cli`, and `bridge`.

pub mod config;
pub mod error;
pub mod frame;
pub mod id;
pub mod metadata;
pub mod metrics;
pub mod paths;
pub mod ring;
pub mod token;

pub use config::{ensure_loaded, Config};
pub use error::{CoreError, CoreResult};
pub use frame::{Frame, FrameParser, FrameType};
pub use id::SessionId;
pub use metadata::{SessionMetadata, SessionStatus};
pub use metrics::{ActivityState, ActivityTracker, RateSnapshot};
pub use ring::{ReadFrom, RingBuffer};
