//! Error types, one enum per concern.

use std::io;

use crate::worker::protocol::Kind;

/// Failures surfaced by the correlation layer.
///
/// Each variant is a fault that would otherwise leave the caller waiting
/// on a reply that never comes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver worker disconnected")]
    Disconnected,
    /// No `READY` arrived within the request deadline.
    #[error("solver worker did not report ready in time")]
    NotReady,
    #[error("{kind} request timed out")]
    Timeout { kind: Kind },
    #[error("expected {expected} reply, got {got}")]
    UnexpectedReply { expected: Kind, got: Kind },
    #[error("solver worker failed: {0}")]
    Worker(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum GameError {
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("no solver worker attached")]
    SolverUnavailable,
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("autorun task failed: {0}")]
    Autorun(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("file too short or malformed")]
    Malformed,
    #[error("checksum mismatch")]
    Checksum,
    #[error("replay diverged at step {step}: {reason}")]
    Diverged { step: usize, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
