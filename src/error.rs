//! Error types for the sync engine and its transport boundary.

use thiserror::Error;

use crate::sync::traits::ReadinessKind;

/// Failure reported by a [`Transport`](crate::sync::Transport) implementation.
///
/// Cloneable so the same failure can be logged and surfaced without
/// moving it out of the task that observed it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broadcast medium is switched off or not reachable.
    #[error("broadcast medium unavailable: {0}")]
    Unavailable(String),

    /// The sender side was refused (e.g. advertising not permitted).
    #[error("send rejected: {0}")]
    SendRejected(String),

    /// The receive stream ended; subscriptions are expected to be infinite.
    #[error("receive stream closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    #[error("readiness check unsatisfied: {0}")]
    ReadinessUnsatisfied(ReadinessKind),

    #[error("payload kind {0} is reserved by the surrounding protocol (0-9)")]
    ReservedPayloadKind(u8),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sync session is not running")]
    NotRunning,

    #[error("no Tokio runtime available to spawn sync tasks")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, SyncError>;
