//! Payload encoding for port transfers.
//!
//! Payloads cross every transport as CBOR bytes. Encoding at the sender
//! gives by-value handoff semantics (the receiver never aliases the
//! sender's value) and the same bytes work for in-memory, rank and file
//! transports.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A payload could not be encoded or decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecError {
    /// Codec diagnostic.
    pub reason: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for CodecError {}

/// Serialize a payload into a fresh byte buffer.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(payload, &mut buf).map_err(|e| CodecError {
        reason: e.to_string(),
    })?;
    Ok(buf)
}

/// Deserialize a payload of type `T` from `bytes`.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError {
        reason: e.to_string(),
    })
}
