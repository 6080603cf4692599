//! What the host tells the controller, and what the controller tells the
//! host to do.

use std::fmt;
use std::str::FromStr;

use gatekeep_protocol::{IdentityKey, Notice, Position};

use crate::AuthError;

/// Something that happened in the host environment.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// An identity joined. `origin` is its textual network address.
    Connected {
        identity: IdentityKey,
        origin: String,
        position: Position,
    },

    /// An identity left.
    Disconnected { identity: IdentityKey },

    /// An identity is trying to move from `from` to `to`.
    MoveAttempt {
        identity: IdentityKey,
        from: Position,
        to: Position,
    },

    /// An identity ran a chat command.
    Command {
        identity: IdentityKey,
        verb: String,
        args: Vec<String>,
    },
}

/// Something the host must do on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Show a line of text to one identity.
    Notify { to: IdentityKey, notice: Notice },

    /// Move an identity to a position right away.
    Teleport { who: IdentityKey, to: Position },

    /// Veto the pending move: the identity stays at `back_to`.
    RejectMove { who: IdentityKey, back_to: Position },

    /// Disconnect an identity.
    Kick { who: IdentityKey, reason: String },
}

impl Effect {
    /// The identity this effect is addressed to.
    pub fn target(&self) -> &IdentityKey {
        match self {
            Self::Notify { to, .. } => to,
            Self::Teleport { who, .. } | Self::RejectMove { who, .. } | Self::Kick { who, .. } => {
                who
            }
        }
    }
}

/// The commands the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerb {
    Register,
    Login,
}

/// Case-insensitive, with or without a leading slash.
impl FromStr for CommandVerb {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let verb = s.strip_prefix('/').unwrap_or(s);
        if verb.eq_ignore_ascii_case("register") {
            Ok(Self::Register)
        } else if verb.eq_ignore_ascii_case("login") {
            Ok(Self::Login)
        } else {
            Err(AuthError::UnknownCommand(verb.to_string()))
        }
    }
}

impl fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => f.write_str("register"),
            Self::Login => f.write_str("login"),
        }
    }
}
