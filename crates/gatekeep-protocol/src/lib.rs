//! Shared vocabulary for Gatekeep.
//!
//! This crate defines the types every other layer talks in:
//!
//! - **Identity and space** ([`IdentityKey`], [`Position`], [`BlockPos`]):
//!   who is acting and where they stand.
//! - **Notices** ([`Notice`], [`Tone`]): the one-line colored replies the
//!   session core sends back to an identity.
//! - **Wire messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`])
//!   and the [`Codec`] that turns them into bytes.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session core (HostEvent / Effect)
//! ```
//!
//! The session core only depends on the identity, position, and notice
//! types. The envelope and codec exist for the networked host.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    BlockPos, ClientMessage, Envelope, IdentityKey, Notice, Payload, Position,
    ServerMessage, Tone,
};
