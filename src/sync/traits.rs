//! Collaborator interfaces the sync engine depends on.
//!
//! The engine is composed from a [`Transport`], a [`PresentationSink`] and a
//! [`Readiness`] set by explicit construction. None of them are implemented
//! by the core except the in-process [`LoopbackBus`](super::LoopbackBus).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::codec::PayloadKind;
use super::record::{OriginHint, Provenance, StateRecord};
use crate::error::{SyncError, TransportError};

// ── Transport ────────────────────────────────────────────────────

/// One datagram heard on the broadcast medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub kind: PayloadKind,
    pub payload: Vec<u8>,
    /// Sender identity as reported by the transport.
    pub origin: OriginHint,
}

/// Lazy, infinite, cancellable sequence of received datagrams.
///
/// Dropping the stream cancels the subscription.
pub type DatagramStream = BoxStream<'static, Result<Datagram, TransportError>>;

/// Connectionless broadcast medium.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcast `payload` tagged with `kind`. Resolves once the transport
    /// considers the send finished; dropping the future cancels it.
    async fn broadcast(&self, kind: PayloadKind, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to datagrams. Implementations may pre-filter by `kind`, but
    /// the engine filters again and ignores anything else.
    fn subscribe(&self, kind: PayloadKind) -> DatagramStream;
}

// ── Readiness ────────────────────────────────────────────────────

/// Which environment precondition a check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessKind {
    /// Runtime permissions needed to send and receive.
    Permission,
    /// The broadcast medium (radio) is switched on.
    Medium,
    /// Positioning services, required by some platforms for scanning.
    Positioning,
}

impl ReadinessKind {
    pub const ALL: [ReadinessKind; 3] = [Self::Permission, Self::Medium, Self::Positioning];

    /// The alert shown while this check fails.
    pub fn alert(self) -> Alert {
        match self {
            Self::Permission => Alert::MissingPermission,
            Self::Medium => Alert::MediumDisabled,
            Self::Positioning => Alert::PositioningDisabled,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Medium => "medium",
            Self::Positioning => "positioning",
        }
    }
}

impl std::fmt::Display for ReadinessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Externally implemented boolean precondition.
pub trait ReadinessCheck: Send + Sync {
    fn is_satisfied(&self) -> bool;

    /// Ask the user or platform to fix the precondition. Fire-and-forget:
    /// the outcome is observed through a later [`is_satisfied`](Self::is_satisfied).
    fn request_remediation(&self);
}

/// The three readiness checks the engine consults.
#[derive(Clone)]
pub struct Readiness {
    pub permission: Arc<dyn ReadinessCheck>,
    pub medium: Arc<dyn ReadinessCheck>,
    pub positioning: Arc<dyn ReadinessCheck>,
}

impl Readiness {
    pub fn new(
        permission: Arc<dyn ReadinessCheck>,
        medium: Arc<dyn ReadinessCheck>,
        positioning: Arc<dyn ReadinessCheck>,
    ) -> Self {
        Self {
            permission,
            medium,
            positioning,
        }
    }

    pub fn check(&self, kind: ReadinessKind) -> &Arc<dyn ReadinessCheck> {
        match kind {
            ReadinessKind::Permission => &self.permission,
            ReadinessKind::Medium => &self.medium,
            ReadinessKind::Positioning => &self.positioning,
        }
    }

    /// Evaluate the check behind `kind`.
    pub fn verify(&self, kind: ReadinessKind) -> Result<(), SyncError> {
        if self.check(kind).is_satisfied() {
            Ok(())
        } else {
            Err(SyncError::ReadinessUnsatisfied(kind))
        }
    }
}

// ── Presentation ─────────────────────────────────────────────────

/// User-visible error conditions the engine raises and clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    MissingPermission,
    MediumDisabled,
    PositioningDisabled,
    SendFailed,
    ReceiveFailed,
}

impl Alert {
    pub fn label(self) -> &'static str {
        match self {
            Self::MissingPermission => "missing-permission",
            Self::MediumDisabled => "medium-disabled",
            Self::PositioningDisabled => "positioning-disabled",
            Self::SendFailed => "send-failed",
            Self::ReceiveFailed => "receive-failed",
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Sink for the engine's side effects.
///
/// Calls are serialized by the engine's session lock. Implementations must
/// return promptly and must not call back into the engine from inside a
/// callback.
pub trait PresentationSink: Send + Sync {
    fn show_state(&self, record: &StateRecord, provenance: Provenance);

    fn show_error(&self, alert: Alert);

    fn hide_error(&self, alert: Alert);
}
