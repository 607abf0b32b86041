#![forbid(unsafe_code)]

//! beaconsync: last-writer-wins state sync for peers on a broadcast medium.
//!
//! Peers share one small record (an icon index, a color index and a
//! millisecond timestamp), broadcast it as a 16-byte payload, and adopt any
//! record they hear that is newer than their own. See [`sync::SyncEngine`]
//! for the session lifecycle and [`sync::traits`] for the collaborators a
//! host has to provide.

pub mod config;
pub mod demo;
pub mod error;
pub mod sync;

pub use config::Config;
pub use error::{Result, SyncError, TransportError};
pub use sync::{StateRecord, SyncEngine};
