//! Error types for the host adapter.

/// All errors that can occur while hosting an engagement session.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Engine error: {0}")]
    Engine(#[from] engagement_engine::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HostResult<T> = Result<T, HostError>;
