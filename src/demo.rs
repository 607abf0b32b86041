//! Multi-peer demo over the in-process loopback bus.
//!
//! Spawns N engines on one [`LoopbackBus`], lets randomly chosen peers make
//! icon/color edits, then checks that every peer ended up on the same record.

use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use serde::Serialize;

use crate::sync::{
    Alert, EngineSettings, FlagCheck, LoopbackBus, OriginHint, PresentationSink, Provenance,
    Readiness, StateRecord, SyncEngine,
};

/// Base for the origin hints handed to demo peers.
const ORIGIN_BASE: u32 = 0x5B1E_C000;

/// Time given to freshly started peers to subscribe before the first edit.
const SUBSCRIBE_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub peers: usize,
    pub edits: usize,
    /// Pause between consecutive edits.
    pub edit_interval: Duration,
    /// Time allowed for the last edit to propagate.
    pub settle: Duration,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            peers: 3,
            edits: 10,
            edit_interval: Duration::from_millis(50),
            settle: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerReport {
    pub origin: String,
    pub last_known: Option<StateRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub peers: Vec<PeerReport>,
    pub edits: usize,
    pub converged: bool,
}

/// Presentation sink that writes everything to the log.
struct LogSink {
    origin: OriginHint,
}

impl PresentationSink for LogSink {
    fn show_state(&self, record: &StateRecord, provenance: Provenance) {
        let updated_by = match provenance {
            Provenance::Local => self.origin,
            Provenance::Remote(origin) => origin,
        };
        tracing::info!(
            peer = %self.origin,
            updated_by = %updated_by,
            icon = record.icon_index(),
            color = record.color_index(),
            "State shown"
        );
    }

    fn show_error(&self, alert: Alert) {
        tracing::warn!(peer = %self.origin, %alert, "Error shown");
    }

    fn hide_error(&self, alert: Alert) {
        tracing::trace!(peer = %self.origin, %alert, "Error hidden");
    }
}

fn ready_checks() -> Readiness {
    Readiness::new(
        Arc::new(FlagCheck::new("permission", true)),
        Arc::new(FlagCheck::new("medium", true)),
        Arc::new(FlagCheck::new("positioning", true)),
    )
}

pub async fn run(options: &DemoOptions, settings: &EngineSettings) -> anyhow::Result<DemoReport> {
    if options.peers < 2 {
        anyhow::bail!("demo needs at least 2 peers, got {}", options.peers);
    }

    let bus = LoopbackBus::new();
    let mut engines = Vec::with_capacity(options.peers);
    for i in 0..options.peers {
        let offset = u32::try_from(i)?;
        let origin = OriginHint(ORIGIN_BASE + offset);
        let engine = SyncEngine::new(
            bus.endpoint(origin),
            Arc::new(LogSink { origin }),
            ready_checks(),
            settings.clone(),
        )?;
        engine.start()?;
        engines.push((origin, engine));
    }
    tokio::time::sleep(SUBSCRIBE_GRACE).await;

    for n in 0..options.edits {
        let (pick, change_icon) = {
            let mut rng = rand::rng();
            (rng.random_range(0..engines.len()), rng.random_bool(0.5))
        };
        let (origin, engine) = &engines[pick];
        let record = if change_icon {
            engine.change_icon()?
        } else {
            engine.change_color()?
        };
        tracing::info!(edit = n + 1, peer = %origin, %record, "Local edit");
        tokio::time::sleep(options.edit_interval).await;
    }
    tokio::time::sleep(options.settle).await;

    let peers: Vec<PeerReport> = engines
        .iter()
        .map(|(origin, engine)| PeerReport {
            origin: origin.to_string(),
            last_known: engine.last_known(),
        })
        .collect();
    let converged = peers
        .windows(2)
        .all(|pair| pair[0].last_known == pair[1].last_known);

    for (_, engine) in &engines {
        engine.stop();
    }

    Ok(DemoReport {
        peers,
        edits: options.edits,
        converged,
    })
}
