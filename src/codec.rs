// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Payload encoding for channels and task arguments.
//
// The channel itself is payload-opaque beyond the length prefix; both
// endpoints of a channel must simply agree on one codec. The reference
// codec is UTF-8 JSON, which is self-describing and matches the task wire
// format. Anything implementing `Codec` can stand in, provided it
// round-trips serde values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Byte encoding used by the typed channel layer and the task dispatcher.
pub trait Codec {
    /// Encode a value to bytes. Fails with [`Error::Serialization`].
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`Codec::encode`]. Fails with
    /// [`Error::Deserialization`].
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

/// UTF-8 JSON, the reference encoding.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Smallest slot budget `estimate_slot_size` will hand out.
pub const MIN_SLOT_SIZE: usize = 64;

/// Deterministic per-slot byte budget for a channel carrying values shaped
/// like `sample`: encoded length doubled for headroom, plus the 4-byte
/// length prefix, rounded up to a power of two and floored at
/// [`MIN_SLOT_SIZE`].
pub fn estimate_slot_size<T: Serialize>(sample: &T) -> Result<usize> {
    let encoded = JsonCodec::encode(sample)?.len();
    let budget = (encoded * 2 + 4).next_power_of_two();
    Ok(budget.max(MIN_SLOT_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let bytes = JsonCodec::encode(&("abc", 42)).unwrap();
        let (s, n): (String, i32) = JsonCodec::decode(&bytes).unwrap();
        assert_eq!(s, "abc");
        assert_eq!(n, 42);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = JsonCodec::decode::<i32>(b"not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn slot_estimate_is_deterministic_and_floored() {
        assert_eq!(estimate_slot_size(&1u8).unwrap(), MIN_SLOT_SIZE);
        let a = estimate_slot_size(&vec![0u32; 100]).unwrap();
        let b = estimate_slot_size(&vec![0u32; 100]).unwrap();
        assert_eq!(a, b);
        assert!(a.is_power_of_two());
        assert!(a >= 100);
    }
}
