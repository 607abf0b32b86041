//! Peer state synchronization over a connectionless broadcast medium.
//!
//! Every peer broadcasts its newest icon/color record and listens for the
//! records of others; last-writer-wins on the record timestamp makes all
//! peers converge on the most recent edit.
//!
//! - `codec`: 16-byte big-endian wire layout
//! - `conflict`: last-writer-wins comparison
//! - `engine`: session lifecycle, one send task and one receive task
//! - `traits`: transport, readiness and presentation collaborators
//! - `loopback`: in-process broadcast medium for demos and tests

pub mod codec;
pub mod conflict;
pub mod engine;
pub mod loopback;
pub mod readiness;
pub mod record;
pub mod selection;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use codec::{decode, encode, PayloadKind, PAYLOAD_LEN};
pub use conflict::is_newer;
pub use engine::{EngineSettings, SessionPhase, SyncEngine};
pub use loopback::{LoopbackBus, LoopbackTransport};
pub use readiness::FlagCheck;
pub use record::{now_millis, OriginHint, Provenance, StateRecord};
pub use selection::{pick_distinct_index, pick_distinct_index_with};
pub use traits::{
    Alert, Datagram, DatagramStream, PresentationSink, Readiness, ReadinessCheck, ReadinessKind,
    Transport,
};
