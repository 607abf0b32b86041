//! In-process broadcast medium.
//!
//! Every [`LoopbackTransport`] attached to the same [`LoopbackBus`] hears
//! every datagram broadcast by the others, but not its own, the way a radio
//! does not receive its own advertisements. Used by the `demo` command and
//! by multi-peer tests.
//!
//! A broadcast keeps re-advertising its payload on a fixed interval until
//! the future is dropped or a send fails, so peers that subscribe late or
//! lag behind still pick up the current record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::codec::PayloadKind;
use super::record::OriginHint;
use super::traits::{Datagram, DatagramStream, Transport};
use crate::error::TransportError;

/// Datagrams buffered per subscriber before slow receivers start lagging.
const BUS_CAPACITY: usize = 256;

/// Default pause between two advertisements of the same payload.
const DEFAULT_ADVERTISE_INTERVAL: Duration = Duration::from_millis(100);

/// Shared medium that loopback endpoints broadcast on.
#[derive(Clone)]
pub struct LoopbackBus {
    tx: broadcast::Sender<Datagram>,
    advertise_interval: Duration,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::with_advertise_interval(DEFAULT_ADVERTISE_INTERVAL)
    }

    /// A bus whose endpoints re-advertise every `interval` while a
    /// broadcast is pending.
    pub fn with_advertise_interval(interval: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            advertise_interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Attach a new endpoint identified by `origin`.
    pub fn endpoint(&self, origin: OriginHint) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            origin,
            tx: self.tx.clone(),
            advertise_interval: self.advertise_interval,
            fail_sends: AtomicBool::new(false),
        })
    }
}

/// One peer's view of a [`LoopbackBus`].
pub struct LoopbackTransport {
    origin: OriginHint,
    tx: broadcast::Sender<Datagram>,
    advertise_interval: Duration,
    fail_sends: AtomicBool,
}

impl LoopbackTransport {
    /// Make broadcasts fail from their next advertisement on, as if the
    /// medium were switched off.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    /// Advertise until dropped; only resolves on failure.
    async fn broadcast(&self, kind: PayloadKind, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut ticker = tokio::time::interval(self.advertise_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut advertised: u64 = 0;
        loop {
            ticker.tick().await;
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Unavailable(format!(
                    "loopback endpoint {} is switched off after {advertised} advertisements",
                    self.origin
                )));
            }
            // No receivers is not an error on a broadcast medium.
            let _ = self.tx.send(Datagram {
                kind,
                payload: payload.clone(),
                origin: self.origin,
            });
            advertised += 1;
            tracing::trace!(origin = %self.origin, advertised, "Loopback advertisement");
        }
    }

    fn subscribe(&self, kind: PayloadKind) -> DatagramStream {
        let own = self.origin;
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| {
                let out = match item {
                    Ok(d) if d.origin == own || d.kind != kind => None,
                    Ok(d) => Some(Ok(d)),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(origin = %own, skipped, "Loopback receiver lagged");
                        None
                    }
                };
                futures_util::future::ready(out)
            })
            .boxed()
    }
}
