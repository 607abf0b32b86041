//! Sync engine. Owns the outbound/inbound task lifecycle of one session.
//!
//! ## Responsibilities
//!
//! - Run readiness checks on start and after every transport failure
//! - Keep exactly one inbound receive task alive while started,
//!   resubscribing after transport failures
//! - Keep at most one outbound send task alive; a newer local edit aborts
//!   the older send, and a newer remote record aborts a pending local send
//! - Resolve every incoming record against the current `last_known` with
//!   last-writer-wins
//!
//! ## Serialization
//!
//! All session state and every presentation call sit behind one
//! [`parking_lot::Mutex`]. Spawned tasks carry the session epoch plus their
//! own task id and re-check both under the lock before they touch state, so
//! an aborted or superseded task is inert even if it was already waiting on
//! the lock when it was cancelled.
//!
//! `JoinHandle::abort` only schedules cancellation, so each task kind also
//! holds a single-permit [`Semaphore`] for as long as it talks to the
//! transport. A replacement task waits for that permit and cannot reach
//! `broadcast` or `subscribe` before its predecessor's future is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::codec::{self, PayloadKind};
use super::conflict::is_newer;
use super::record::{now_millis, Provenance, StateRecord};
use super::selection::pick_distinct_index;
use super::traits::{
    Alert, Datagram, PresentationSink, Readiness, ReadinessKind, Transport,
};
use crate::error::{Result, SyncError, TransportError};

/// Default delay before the inbound task resubscribes after a failure.
const DEFAULT_RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound (inclusive) for icon and color indices.
const DEFAULT_INDEX_RANGE: u32 = 100;

// ── Settings ─────────────────────────────────────────────────────

/// Validated engine parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Payload kind this session sends and listens for.
    pub payload_kind: PayloadKind,
    /// Icon indices are drawn from `0..=icon_range`.
    pub icon_range: u32,
    /// Color indices are drawn from `0..=color_range`.
    pub color_range: u32,
    /// Pause between a receive failure and the next subscription.
    pub receive_retry_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            payload_kind: PayloadKind::STATE,
            icon_range: DEFAULT_INDEX_RANGE,
            color_range: DEFAULT_INDEX_RANGE,
            receive_retry_delay: DEFAULT_RECEIVE_RETRY_DELAY,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.icon_range == 0 {
            return Err(SyncError::InvalidConfig(
                "icon_range must be at least 1".into(),
            ));
        }
        if self.color_range == 0 {
            return Err(SyncError::InvalidConfig(
                "color_range must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Session state ────────────────────────────────────────────────

/// Lifecycle phase of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Stopped,
    /// Readiness checks running; inbound task not yet spawned.
    Starting,
    /// Inbound task running, no send in flight.
    Listening,
    /// Inbound task running and one send in flight.
    SendingAndListening,
}

struct OutboundSlot {
    id: u64,
    handle: JoinHandle<()>,
}

struct Session {
    phase: SessionPhase,
    /// Bumped on every start and stop; tasks from older epochs do nothing.
    epoch: u64,
    next_outbound_id: u64,
    /// Id of the receive task currently allowed to act.
    inbound_id: u64,
    last_known: Option<StateRecord>,
    outbound: Option<OutboundSlot>,
    inbound: Option<JoinHandle<()>>,
    runtime: Option<Handle>,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Stopped,
            epoch: 0,
            next_outbound_id: 0,
            inbound_id: 0,
            last_known: None,
            outbound: None,
            inbound: None,
            runtime: None,
        }
    }

    fn is_running(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Listening | SessionPhase::SendingAndListening
        )
    }

    fn owns_inbound(&self, epoch: u64, id: u64) -> bool {
        self.epoch == epoch && self.inbound_id == id
    }

    fn owns_outbound(&self, epoch: u64, id: u64) -> bool {
        self.epoch == epoch && self.outbound.as_ref().is_some_and(|slot| slot.id == id)
    }

    /// Abort the in-flight send, if any. Returns whether one was cancelled.
    fn cancel_outbound(&mut self) -> bool {
        let cancelled = match self.outbound.take() {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        };
        if self.phase == SessionPhase::SendingAndListening {
            self.phase = SessionPhase::Listening;
        }
        cancelled
    }
}

// ── Engine ───────────────────────────────────────────────────────

struct EngineInner {
    transport: Arc<dyn Transport>,
    presentation: Arc<dyn PresentationSink>,
    readiness: Readiness,
    settings: EngineSettings,
    session: Mutex<Session>,
    /// Held by the send task while its broadcast future is alive.
    send_gate: Semaphore,
    /// Held by the receive task while any subscription of it is alive.
    receive_gate: Semaphore,
}

/// Synchronizes one icon/color state with peers on a broadcast transport.
///
/// Cheap to clone; clones share the same session. Running tasks keep the
/// engine alive, so a started engine must be [`stop`](Self::stop)ped to
/// release them.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Compose an engine from its collaborators.
    pub fn new(
        transport: Arc<dyn Transport>,
        presentation: Arc<dyn PresentationSink>,
        readiness: Readiness,
        settings: EngineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                transport,
                presentation,
                readiness,
                settings,
                session: Mutex::new(Session::new()),
                send_gate: Semaphore::new(1),
                receive_gate: Semaphore::new(1),
            }),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.session.lock().phase
    }

    /// Newest record observed from any source during this session.
    pub fn last_known(&self) -> Option<StateRecord> {
        self.inner.session.lock().last_known
    }

    /// Whether a send task is currently registered.
    pub fn has_pending_send(&self) -> bool {
        self.inner.session.lock().outbound.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the session: run readiness checks, then start listening.
    ///
    /// Must be called from within a Tokio runtime. Starting an already
    /// started session does nothing.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let mut session = self.inner.session.lock();
        if session.phase != SessionPhase::Stopped {
            tracing::debug!(phase = ?session.phase, "Sync session already started");
            return Ok(());
        }

        session.phase = SessionPhase::Starting;
        session.epoch += 1;
        session.runtime = Some(runtime);
        tracing::info!(
            epoch = session.epoch,
            kind = %self.inner.settings.payload_kind,
            "Starting sync session"
        );

        // Failing checks stay visible but do not block listening: the
        // transport may still receive with partial readiness.
        self.inner.run_readiness_checks();
        self.spawn_inbound(&mut session);
        session.phase = SessionPhase::Listening;
        Ok(())
    }

    /// Stop the session, cancelling both tasks. Idempotent.
    ///
    /// Once this returns, no further presentation calls are made for the
    /// stopped session.
    pub fn stop(&self) {
        let mut session = self.inner.session.lock();
        if session.phase == SessionPhase::Stopped {
            return;
        }
        session.epoch += 1;
        session.cancel_outbound();
        if let Some(inbound) = session.inbound.take() {
            inbound.abort();
        }
        session.last_known = None;
        session.runtime = None;
        session.phase = SessionPhase::Stopped;
        tracing::info!("Sync session stopped");
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Build the next local record from the last known one and publish it.
    ///
    /// The base handed to `mutator` is `last_known` restamped with the
    /// current time, or a zeroed record stamped now when nothing is known
    /// yet. The base is read and the result published under one lock, so
    /// no remote record can slip in between.
    ///
    /// `mutator` runs while the session lock is held. It must not call any
    /// method of this engine (including [`last_known`](Self::last_known)),
    /// or it deadlocks; everything it needs is in the base record.
    pub fn request_local_update<F>(&self, mutator: F) -> Result<StateRecord>
    where
        F: FnOnce(StateRecord) -> StateRecord,
    {
        let mut session = self.inner.session.lock();
        if !session.is_running() {
            return Err(SyncError::NotRunning);
        }
        let now = now_millis();
        let base = match session.last_known {
            Some(last) => last.restamped(now),
            None => StateRecord::at(0, 0, now),
        };
        let record = mutator(base);
        self.publish_locked(&mut session, record)?;
        Ok(record)
    }

    /// Local edit that switches to a different, randomly chosen icon.
    pub fn change_icon(&self) -> Result<StateRecord> {
        let range = self.inner.settings.icon_range;
        self.request_local_update(|base| {
            base.with_icon(pick_distinct_index(base.icon_index(), range))
        })
    }

    /// Local edit that switches to a different, randomly chosen color.
    pub fn change_color(&self) -> Result<StateRecord> {
        let range = self.inner.settings.color_range;
        self.request_local_update(|base| {
            base.with_color(pick_distinct_index(base.color_index(), range))
        })
    }

    /// Adopt `record` locally and broadcast it, replacing any send in flight.
    pub fn publish(&self, record: StateRecord) -> Result<()> {
        let mut session = self.inner.session.lock();
        if !session.is_running() {
            return Err(SyncError::NotRunning);
        }
        self.publish_locked(&mut session, record)
    }

    fn publish_locked(&self, session: &mut Session, record: StateRecord) -> Result<()> {
        let runtime = session.runtime.clone().ok_or(SyncError::NotRunning)?;

        if session.cancel_outbound() {
            tracing::debug!("Superseded pending send with newer local record");
        }
        session.last_known = Some(record);

        let presentation = &self.inner.presentation;
        presentation.hide_error(Alert::SendFailed);
        presentation.show_state(&record, Provenance::Local);

        let payload = codec::encode(&record).to_vec();
        session.next_outbound_id += 1;
        let id = session.next_outbound_id;
        let epoch = session.epoch;
        let inner = Arc::clone(&self.inner);
        // Spawned while holding the lock: the task cannot observe the
        // session before its slot is registered below.
        let handle = runtime.spawn(async move {
            inner.send_task(epoch, id, payload).await;
        });
        session.outbound = Some(OutboundSlot { id, handle });
        session.phase = SessionPhase::SendingAndListening;

        tracing::info!(%record, send_id = id, "Publishing local record");
        Ok(())
    }

    // ── Troubleshooting & remediation ────────────────────────────

    /// Re-run all readiness checks and refresh their alerts.
    pub fn troubleshoot(&self) {
        let session = self.inner.session.lock();
        if session.phase == SessionPhase::Stopped {
            return;
        }
        self.inner.run_readiness_checks();
    }

    /// Ask the collaborator behind `kind` to fix its precondition.
    pub fn request_remediation(&self, kind: ReadinessKind) {
        tracing::debug!(%kind, "Requesting remediation");
        self.inner.readiness.check(kind).request_remediation();
    }

    /// Called once a remediation flow has finished (e.g. the user returned
    /// from a settings screen). Refreshes that check's alert; after the
    /// medium or positioning flow the receive task is restarted as well.
    pub fn on_remediation_result(&self, kind: ReadinessKind) {
        let mut session = self.inner.session.lock();
        if !session.is_running() {
            return;
        }
        self.inner.run_readiness_check(kind);
        if matches!(kind, ReadinessKind::Medium | ReadinessKind::Positioning) {
            self.restart_inbound(&mut session);
        }
    }

    /// Replace the receive task with a fresh subscription.
    pub fn restart_receiving(&self) {
        let mut session = self.inner.session.lock();
        if !session.is_running() {
            return;
        }
        self.restart_inbound(&mut session);
    }

    fn restart_inbound(&self, session: &mut Session) {
        if let Some(inbound) = session.inbound.take() {
            inbound.abort();
        }
        tracing::debug!("Restarting receive task");
        self.spawn_inbound(session);
    }

    fn spawn_inbound(&self, session: &mut Session) {
        let Some(runtime) = session.runtime.clone() else {
            return;
        };
        // A fresh id makes any previous loop inert, even one already
        // waiting on the lock when it was aborted.
        session.inbound_id += 1;
        let (epoch, id) = (session.epoch, session.inbound_id);
        let inner = Arc::clone(&self.inner);
        session.inbound = Some(runtime.spawn(async move {
            inner.receive_loop(epoch, id).await;
        }));
    }
}

impl EngineInner {
    /// Call with the session lock held.
    fn run_readiness_checks(&self) {
        for kind in ReadinessKind::ALL {
            self.run_readiness_check(kind);
        }
    }

    /// Call with the session lock held.
    fn run_readiness_check(&self, kind: ReadinessKind) {
        let alert = kind.alert();
        match self.readiness.verify(kind) {
            Ok(()) => self.presentation.hide_error(alert),
            Err(err) => {
                tracing::warn!(error = %err, "Readiness check failed");
                self.presentation.show_error(alert);
            }
        }
    }

    async fn send_task(&self, epoch: u64, id: u64, payload: Vec<u8>) {
        let Ok(_permit) = self.send_gate.acquire().await else {
            return;
        };
        if !self.session.lock().owns_outbound(epoch, id) {
            return;
        }

        let outcome = self
            .transport
            .broadcast(self.settings.payload_kind, payload)
            .await;

        let mut session = self.session.lock();
        if !session.owns_outbound(epoch, id) {
            return;
        }
        session.outbound = None;
        session.phase = SessionPhase::Listening;

        match outcome {
            Ok(()) => tracing::debug!(send_id = id, "Send completed"),
            Err(err) => {
                tracing::warn!(send_id = id, error = %err, "Unable to send state payload");
                self.presentation.show_error(Alert::SendFailed);
                self.run_readiness_checks();
            }
        }
    }

    async fn receive_loop(&self, epoch: u64, id: u64) {
        let Ok(_permit) = self.receive_gate.acquire().await else {
            return;
        };
        loop {
            let mut datagrams = self.transport.subscribe(self.settings.payload_kind);
            {
                let session = self.session.lock();
                if !session.owns_inbound(epoch, id) {
                    return;
                }
                self.presentation.hide_error(Alert::ReceiveFailed);
            }
            tracing::debug!(epoch, receive_id = id, "Receiving state payloads");

            let failure = loop {
                match datagrams.next().await {
                    Some(Ok(datagram)) => {
                        if !self.absorb(epoch, id, datagram) {
                            return;
                        }
                    }
                    Some(Err(err)) => break err,
                    None => break TransportError::Closed,
                }
            };
            drop(datagrams);

            {
                let session = self.session.lock();
                if !session.owns_inbound(epoch, id) {
                    return;
                }
                tracing::warn!(error = %failure, "Unable to receive state payloads");
                self.presentation.show_error(Alert::ReceiveFailed);
                self.run_readiness_checks();
            }

            tokio::time::sleep(self.settings.receive_retry_delay).await;
        }
    }

    /// Handle one datagram. Returns `false` once the session has moved on
    /// and the receive loop should exit.
    fn absorb(&self, epoch: u64, id: u64, datagram: Datagram) -> bool {
        if datagram.kind != self.settings.payload_kind {
            tracing::trace!(kind = %datagram.kind, "Ignoring unrelated payload kind");
            return true;
        }
        let record = match codec::decode(&datagram.payload) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(origin = %datagram.origin, error = %err, "Dropping malformed payload");
                return true;
            }
        };
        tracing::trace!(origin = %datagram.origin, %record, "Received state payload");

        let mut session = self.session.lock();
        if !session.owns_inbound(epoch, id) {
            return false;
        }
        if !is_newer(&record, session.last_known.as_ref()) {
            return true;
        }

        tracing::info!(origin = %datagram.origin, %record, "Adopting newer remote record");
        session.last_known = Some(record);
        self.presentation
            .show_state(&record, Provenance::Remote(datagram.origin));
        // The local send would regress peers to an older value.
        if session.cancel_outbound() {
            tracing::debug!("Cancelled stale pending send");
        }
        true
    }
}
