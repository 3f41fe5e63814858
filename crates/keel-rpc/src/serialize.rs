//! Body serializers, selected per request by a one-byte code.
//!
//! The trait is object-safe: implementations convert between raw bytes
//! and a self-describing [`serde_json::Value`] tree, and the typed edges
//! ([`encode_message`]/[`decode_message`]) bridge to concrete request and
//! response types. Any format whose data model round-trips through that
//! tree (JSON, MessagePack, CBOR, ...) can be registered.

use crate::RpcError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A pluggable body codec.
pub trait Serializer: Send + Sync {
    /// The code carried in the frame header.
    fn code(&self) -> u8;

    fn name(&self) -> &'static str;

    fn to_bytes(&self, value: &serde_json::Value) -> Result<Vec<u8>, RpcError>;

    fn from_bytes(&self, data: &[u8]) -> Result<serde_json::Value, RpcError>;
}

/// Encodes a typed message with the given serializer.
pub fn encode_message<T: Serialize>(
    serializer: &dyn Serializer,
    value: &T,
) -> Result<Vec<u8>, RpcError> {
    let tree = serde_json::to_value(value).map_err(|err| RpcError::Encode(err.to_string()))?;
    serializer.to_bytes(&tree)
}

/// Decodes a typed message with the given serializer. Empty input decodes
/// as a null tree: that is the wire representation of "the method produced
/// no result".
pub fn decode_message<T: DeserializeOwned>(
    serializer: &dyn Serializer,
    data: &[u8],
) -> Result<T, RpcError> {
    let tree = if data.is_empty() {
        serde_json::Value::Null
    } else {
        serializer.from_bytes(data)?
    };
    serde_json::from_value(tree).map_err(|err| RpcError::Decode(err.to_string()))
}

/// JSON bodies; code 1. Registered on every server by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn code(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "json"
    }

    fn to_bytes(&self, value: &serde_json::Value) -> Result<Vec<u8>, RpcError> {
        serde_json::to_vec(value).map_err(|err| RpcError::Encode(err.to_string()))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<serde_json::Value, RpcError> {
        serde_json::from_slice(data).map_err(|err| RpcError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        note: String,
    }

    #[test]
    fn typed_roundtrip_through_json() {
        let serializer = JsonSerializer;
        let msg = Ping {
            seq: 9,
            note: "hello\nworld".to_string(),
        };
        let bytes = encode_message(&serializer, &msg).unwrap();
        let back: Ping = decode_message(&serializer, &bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn empty_body_decodes_as_absent() {
        let serializer = JsonSerializer;
        let none: Option<Ping> = decode_message(&serializer, &[]).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn garbage_reports_decode_error() {
        let serializer = JsonSerializer;
        let err = decode_message::<Ping>(&serializer, b"not json").unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
