//! Error types.
//!
//! Two families: `EngineError` for configuration and lifecycle failures that
//! callers must handle, and `SampleRejection` for input that the ingestion
//! gate discards. Rejections are never fatal; they are counted, logged and
//! dropped.

use thiserror::Error;

use crate::types::TrackingQuality;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session already running")]
    SessionAlreadyRunning,

    #[error("no session running")]
    SessionNotRunning,

    #[error("session worker disconnected")]
    WorkerDisconnected,

    #[error("session worker panicked")]
    WorkerPanicked,
}

/// Reason a sample was discarded at the ingestion gate.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SampleRejection {
    #[error("sample has non-finite timestamp or coordinates")]
    NonFinite,

    #[error("timestamp {current} does not advance past {previous}")]
    NonMonotonic { previous: f64, current: f64 },

    #[error("tracking quality is {0:?}")]
    TrackingQuality(TrackingQuality),

    #[error("session is stopping")]
    SessionStopped,
}

pub type Result<T> = std::result::Result<T, EngineError>;
