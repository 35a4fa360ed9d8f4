//! Engine payload representation
//!
//! Every typed value crossing into the engine is encoded into a [`Payload`]
//! and decoded back on the way out. The codec is JSON through serde.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque, engine-owned encoding of a single value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    data: Vec<u8>,
}

impl Payload {
    /// Wrap already-encoded bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Encode a typed value
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_vec(value)
            .map(Self::from_bytes)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    /// Decode into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.data).map_err(|e| Error::Decode(e.to_string()))
    }

    /// The payload carrying no value (`()`)
    pub fn unit() -> Self {
        Self::from_bytes(b"null".to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.data) {
            Ok(text) => f.debug_tuple("Payload").field(&text).finish(),
            Err(_) => f.debug_tuple("Payload").field(&self.data.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        name: String,
        times: u32,
    }

    #[test]
    fn test_encode_decode_struct() {
        let payload = Payload::encode(&Greeting { name: "Temporal".into(), times: 2 }).unwrap();
        let back: Greeting = payload.decode().unwrap();
        assert_eq!(back, Greeting { name: "Temporal".into(), times: 2 });
    }

    #[test]
    fn test_decode_mismatch_is_error() {
        let payload = Payload::encode(&"not a number").unwrap();
        let err = payload.decode::<u64>().unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_unit_payload_decodes_as_unit() {
        let () = Payload::unit().decode().unwrap();
    }
}
