//! Error types for the session layer.

use gatekeep_protocol::IdentityKey;

use crate::CommandVerb;

/// Why a `register` or `login` command was refused.
///
/// The `Display` text of each variant is exactly the line sent back to the
/// identity, so these double as user-facing messages. None of them change
/// any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Wrong number of arguments.
    #[error("Usage: /{0} <password>")]
    Usage(CommandVerb),

    /// `register` for a name that already has a record.
    #[error("Already registered. Use /login.")]
    AlreadyRegistered,

    /// `login` for a name with no record.
    #[error("You are not registered.")]
    NotRegistered,

    /// `login` with a secret that doesn't match. Not counted, not delayed.
    #[error("Wrong password.")]
    WrongSecret,

    /// A verb the controller doesn't handle.
    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    /// The record changed between checking the secret and committing the
    /// login.
    #[error("Login interrupted. Please try again.")]
    Stale,

    /// A command arrived for an identity with no session (the host sent
    /// it before `Connected` or after `Disconnected`).
    #[error("{0} is not connected")]
    NotConnected(IdentityKey),
}

/// Registry invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Tried to put an authenticated identity back on the challenge.
    #[error("identity {0} is already authenticated")]
    IllegalState(IdentityKey),
}
