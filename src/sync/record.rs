//! The synchronized unit of state and its provenance.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as used for [`StateRecord::timestamp`].
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One icon/color choice stamped by the peer that produced it.
///
/// Records are immutable: every "update" yields a new record via
/// [`restamped`](Self::restamped), [`with_icon`](Self::with_icon) or
/// [`with_color`](Self::with_color). Indices are not reduced modulo the
/// icon/color set size here; that is left to whoever renders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRecord {
    icon_index: u32,
    color_index: u32,
    timestamp: i64,
}

impl StateRecord {
    /// Create a record stamped with the current time.
    pub fn new(icon_index: u32, color_index: u32) -> Self {
        Self::at(icon_index, color_index, now_millis())
    }

    /// Create a record with an explicit timestamp (decoding, tests).
    pub const fn at(icon_index: u32, color_index: u32, timestamp: i64) -> Self {
        Self {
            icon_index,
            color_index,
            timestamp,
        }
    }

    pub const fn icon_index(&self) -> u32 {
        self.icon_index
    }

    pub const fn color_index(&self) -> u32 {
        self.color_index
    }

    /// Ordering key for last-write-wins.
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Same icon and color, new timestamp.
    pub const fn restamped(&self, timestamp: i64) -> Self {
        Self::at(self.icon_index, self.color_index, timestamp)
    }

    pub const fn with_icon(&self, icon_index: u32) -> Self {
        Self::at(icon_index, self.color_index, self.timestamp)
    }

    pub const fn with_color(&self, color_index: u32) -> Self {
        Self::at(self.icon_index, color_index, self.timestamp)
    }
}

impl std::fmt::Display for StateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "icon={} color={} ts={}",
            self.icon_index, self.color_index, self.timestamp
        )
    }
}

/// Identity hint of the peer a datagram came from, as reported by the
/// transport. Display only; never serialized into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginHint(pub u32);

impl std::fmt::Display for OriginHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Where the record handed to the presentation sink came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced by this peer.
    Local,
    /// Received from another peer.
    Remote(OriginHint),
}
