//! Envelope and wire codec
//!
//! What the cluster puts inside a frame: the destination actor path plus
//! the caller's payload bytes. User payloads stay opaque: their
//! serialization belongs to the application, not the cluster.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A routed message as it crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub path: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope encode failed: {0}")]
    Encode(String),
    #[error("envelope decode failed: {0}")]
    Decode(String),
}

/// Symmetric envelope serializer. `decode(encode(e)) == e` must hold for
/// every envelope an implementation encodes.
pub trait WireCodec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError>;
}

/// Default codec. Postcard's VarInt lengths mean a corrupt prefix cannot
/// demand a huge allocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostcardCodec;

impl WireCodec for PostcardCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(envelope).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
