//! Error types for the protocol layer.
//!
//! Each Gatekeep crate defines its own error enum, so a `ProtocolError`
//! always means "the bytes or the message shape were wrong", never
//! "the network failed" or "the password was wrong".

/// Errors that can occur while encoding, decoding, or validating messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (malformed JSON, missing fields, wrong types).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded fine but breaks a protocol rule, e.g. a
    /// `Hello` with an empty name or a `Move` before the handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
