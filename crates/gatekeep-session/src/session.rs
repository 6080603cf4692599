//! Session types: the registry's record of one connected identity.

use gatekeep_protocol::IdentityKey;

/// Where a connected identity is in the challenge.
///
/// ```text
///   (connect) ──→ Pending ──(register / login)──→ Authenticated
///       │                                              ↑
///       └──────────────(trusted origin)────────────────┘
/// ```
///
/// There is no `Disconnected` state: a disconnected identity simply has no
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, held in place, has not answered the challenge yet.
    /// `since` is when the challenge started (ms since epoch).
    Pending { since: u64 },

    /// Answered the challenge, or was trusted on connect.
    Authenticated,
}

/// One connected identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: IdentityKey,

    /// Network address the identity connected from. Commands carry no
    /// address, so this is what register/login stamp on the record.
    pub origin: String,

    pub state: SessionState,
}

impl Session {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, SessionState::Pending { .. })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated)
    }
}
