//! Scripted collaborators for engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::codec::PayloadKind;
use super::readiness::FlagCheck;
use super::record::{Provenance, StateRecord};
use super::traits::{
    Alert, Datagram, DatagramStream, PresentationSink, Readiness, Transport,
};
use crate::error::TransportError;

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Transport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum SendBehavior {
    Succeed,
    Fail,
    /// Never resolve; only cancellation ends the send.
    Hang,
}

struct InFlight {
    in_flight: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

struct LiveSubscription {
    live: Arc<AtomicUsize>,
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Increment `counter` and fold the new value into `max`.
fn enter(counter: &AtomicUsize, max: &AtomicUsize) {
    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

type Inbox = mpsc::UnboundedSender<Result<Datagram, TransportError>>;

pub struct ScriptedTransport {
    behavior: SendBehavior,
    sent: Mutex<Vec<Vec<u8>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
    subscriptions: AtomicUsize,
    live_subscriptions: Arc<AtomicUsize>,
    max_live_subscriptions: AtomicUsize,
    inbox: Mutex<Option<Inbox>>,
}

impl ScriptedTransport {
    pub fn new(behavior: SendBehavior) -> Self {
        Self {
            behavior,
            sent: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
            subscriptions: AtomicUsize::new(0),
            live_subscriptions: Arc::new(AtomicUsize::new(0)),
            max_live_subscriptions: AtomicUsize::new(0),
            inbox: Mutex::new(None),
        }
    }

    /// Payloads handed to `broadcast`, in call order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Hanging sends currently alive.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most hanging sends ever alive at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Hanging sends dropped before completing.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Subscription streams not yet dropped.
    pub fn live_subscriptions(&self) -> usize {
        self.live_subscriptions.load(Ordering::SeqCst)
    }

    pub fn max_live_subscriptions(&self) -> usize {
        self.max_live_subscriptions.load(Ordering::SeqCst)
    }

    /// Push a datagram into the newest subscription.
    pub fn deliver(&self, datagram: Datagram) {
        if let Some(inbox) = self.inbox.lock().as_ref() {
            let _ = inbox.send(Ok(datagram));
        }
    }

    /// Make the newest subscription yield an error.
    pub fn fail_receive(&self, err: TransportError) {
        if let Some(inbox) = self.inbox.lock().as_ref() {
            let _ = inbox.send(Err(err));
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn broadcast(&self, _kind: PayloadKind, payload: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().push(payload);
        match self.behavior {
            SendBehavior::Succeed => Ok(()),
            SendBehavior::Fail => Err(TransportError::SendRejected("scripted".into())),
            SendBehavior::Hang => {
                enter(&self.in_flight, &self.max_in_flight);
                let _guard = InFlight {
                    in_flight: Arc::clone(&self.in_flight),
                    cancelled: Arc::clone(&self.cancelled),
                };
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn subscribe(&self, _kind: PayloadKind) -> DatagramStream {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        enter(&self.live_subscriptions, &self.max_live_subscriptions);
        let guard = LiveSubscription {
            live: Arc::clone(&self.live_subscriptions),
        };
        UnboundedReceiverStream::new(rx)
            .map(move |item| {
                let _alive = &guard;
                item
            })
            .boxed()
    }
}

// ── Presentation ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    State(StateRecord, Provenance),
    Show(Alert),
    Hide(Alert),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Call>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl PresentationSink for RecordingSink {
    fn show_state(&self, record: &StateRecord, provenance: Provenance) {
        self.calls.lock().push(Call::State(*record, provenance));
    }

    fn show_error(&self, alert: Alert) {
        self.calls.lock().push(Call::Show(alert));
    }

    fn hide_error(&self, alert: Alert) {
        self.calls.lock().push(Call::Hide(alert));
    }
}

// ── Readiness ────────────────────────────────────────────────────

pub struct FixedReadiness {
    pub permission: Arc<FlagCheck>,
    pub medium: Arc<FlagCheck>,
    pub positioning: Arc<FlagCheck>,
}

impl FixedReadiness {
    pub fn all_satisfied() -> Self {
        Self {
            permission: Arc::new(FlagCheck::new("permission", true)),
            medium: Arc::new(FlagCheck::new("medium", true)),
            positioning: Arc::new(FlagCheck::new("positioning", true)),
        }
    }

    pub fn as_readiness(&self) -> Readiness {
        Readiness::new(
            self.permission.clone(),
            self.medium.clone(),
            self.positioning.clone(),
        )
    }

    /// Evaluations of (permission, medium, positioning).
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.permission.evaluations(),
            self.medium.evaluations(),
            self.positioning.evaluations(),
        )
    }

    pub fn reset_counts(&self) {
        self.permission.reset_counts();
        self.medium.reset_counts();
        self.positioning.reset_counts();
    }
}
