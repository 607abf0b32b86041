//! Fixed-layout wire codec for [`StateRecord`].
//!
//! ```text
//! offset  0        4        8                16
//!         ┌────────┬────────┬────────────────┐
//!         │ icon   │ color  │ timestamp      │
//!         │ u32 BE │ u32 BE │ i64 BE (ms)    │
//!         └────────┴────────┴────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::record::StateRecord;
use crate::error::{Result, SyncError};

/// Encoded size of a [`StateRecord`].
pub const PAYLOAD_LEN: usize = 16;

/// Highest payload kind reserved by the surrounding protocol.
const MAX_RESERVED_KIND: u8 = 9;

/// Tag identifying which kind of payload a datagram carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PayloadKind(u8);

impl PayloadKind {
    /// The kind used for icon/color state records.
    pub const STATE: PayloadKind = PayloadKind(11);

    /// Validate a payload kind, rejecting the reserved range 0-9.
    pub fn new(raw: u8) -> Result<Self> {
        if raw <= MAX_RESERVED_KIND {
            return Err(SyncError::ReservedPayloadKind(raw));
        }
        Ok(Self(raw))
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for PayloadKind {
    fn default() -> Self {
        Self::STATE
    }
}

impl TryFrom<u8> for PayloadKind {
    type Error = SyncError;

    fn try_from(raw: u8) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<PayloadKind> for u8 {
    fn from(kind: PayloadKind) -> u8 {
        kind.0
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn encode(record: &StateRecord) -> [u8; PAYLOAD_LEN] {
    let mut out = [0u8; PAYLOAD_LEN];
    out[0..4].copy_from_slice(&record.icon_index().to_be_bytes());
    out[4..8].copy_from_slice(&record.color_index().to_be_bytes());
    out[8..16].copy_from_slice(&record.timestamp().to_be_bytes());
    out
}

/// Decode a payload. Any length other than [`PAYLOAD_LEN`] is rejected as a
/// whole; there is no partial result.
pub fn decode(bytes: &[u8]) -> Result<StateRecord> {
    let buf: &[u8; PAYLOAD_LEN] = bytes
        .try_into()
        .map_err(|_| SyncError::MalformedPayload {
            expected: PAYLOAD_LEN,
            actual: bytes.len(),
        })?;

    let mut icon = [0u8; 4];
    let mut color = [0u8; 4];
    let mut timestamp = [0u8; 8];
    icon.copy_from_slice(&buf[0..4]);
    color.copy_from_slice(&buf[4..8]);
    timestamp.copy_from_slice(&buf[8..16]);

    Ok(StateRecord::at(
        u32::from_be_bytes(icon),
        u32::from_be_bytes(color),
        i64::from_be_bytes(timestamp),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_big_endian_field_order() {
        let record = StateRecord::at(7, 0x0102_0304, 0x0A0B_0C0D_0E0F_1011);
        let bytes = encode(&record);
        assert_eq!(
            bytes,
            [
                0, 0, 0, 7, //
                1, 2, 3, 4, //
                0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11,
            ]
        );
    }

    #[test]
    fn decode_inverts_encode() {
        for record in [
            StateRecord::at(0, 0, 0),
            StateRecord::at(7, 0, 1_700_000_000_000),
            StateRecord::at(u32::MAX, u32::MAX, i64::MAX),
            StateRecord::at(3, 9, -1),
        ] {
            assert_eq!(decode(&encode(&record)).unwrap(), record);
        }
    }

    #[test]
    fn decode_rejects_wrong_lengths() {
        for len in [0usize, 1, 15, 17, 32] {
            let bytes = vec![0u8; len];
            match decode(&bytes) {
                Err(SyncError::MalformedPayload { expected, actual }) => {
                    assert_eq!(expected, PAYLOAD_LEN);
                    assert_eq!(actual, len);
                }
                other => panic!("expected MalformedPayload for len {len}, got {other:?}"),
            }
        }
    }

    #[test]
    fn payload_kind_rejects_reserved_range() {
        for raw in 0..=9u8 {
            assert!(matches!(
                PayloadKind::new(raw),
                Err(SyncError::ReservedPayloadKind(r)) if r == raw
            ));
        }
        assert_eq!(PayloadKind::new(10).unwrap().get(), 10);
        assert_eq!(PayloadKind::STATE.get(), 11);
        assert_eq!(PayloadKind::default(), PayloadKind::STATE);
    }

    #[test]
    fn payload_kind_deserializes_with_validation() {
        #[derive(Deserialize)]
        struct Holder {
            kind: PayloadKind,
        }
        let ok: Holder = toml::from_str("kind = 42").unwrap();
        assert_eq!(ok.kind.get(), 42);
        assert!(toml::from_str::<Holder>("kind = 3").is_err());
    }
}
