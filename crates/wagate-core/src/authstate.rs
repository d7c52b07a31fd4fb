// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tagged-JSON codec for WhatsApp credential blobs.
//!
//! The client library's auth state mixes plain JSON with binary payloads
//! (identity keys, signed pre-keys). Binary fields are encoded as
//! `{"__wag_bytes__": "<base64>"}` objects so the whole bundle survives a
//! text round-trip through storage byte-for-byte.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::{Map, Value};

use crate::WagateError;

/// Key marking a tagged byte-string object.
const BYTES_TAG: &str = "__wag_bytes__";

/// Wraps raw bytes into a tagged JSON value.
pub fn tag_bytes(bytes: &[u8]) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(BYTES_TAG.to_string(), Value::String(B64.encode(bytes)));
    Value::Object(map)
}

/// Extracts raw bytes from a tagged JSON value, if it is one.
pub fn untag_bytes(value: &Value) -> Option<Vec<u8>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let encoded = obj.get(BYTES_TAG)?.as_str()?;
    B64.decode(encoded).ok()
}

/// Serializes an auth-state value to its storage form.
pub fn encode(state: &Value) -> String {
    state.to_string()
}

/// Deserializes an auth-state blob loaded from storage.
pub fn decode(blob: &str) -> Result<Value, WagateError> {
    serde_json::from_str(blob)
        .map_err(|e| WagateError::Validation(format!("corrupt auth state blob: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bytes_round_trip_exactly() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let tagged = tag_bytes(&payload);
        assert_eq!(untag_bytes(&tagged).unwrap(), payload);
    }

    #[test]
    fn untag_rejects_plain_objects() {
        assert!(untag_bytes(&json!({"key": "value"})).is_none());
        assert!(untag_bytes(&json!("just a string")).is_none());
        assert!(untag_bytes(&json!({"__wag_bytes__": "x", "extra": 1})).is_none());
    }

    #[test]
    fn full_state_survives_storage_round_trip() {
        let state = json!({
            "creds": {
                "me": {"id": "5551234567:12@s.whatsapp.net"},
                "noiseKey": tag_bytes(&[1, 2, 3, 4]),
                "signedIdentityKey": tag_bytes(&[0xde, 0xad, 0xbe, 0xef]),
                "registrationId": 729,
            },
            "keys": {
                "preKeys": {"1": tag_bytes(&[9, 9, 9])},
            },
        });
        let blob = encode(&state);
        let restored = decode(&blob).unwrap();
        assert_eq!(restored, state);
        // Re-encoding is byte-stable.
        assert_eq!(encode(&restored), blob);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("{not json").is_err());
    }
}
