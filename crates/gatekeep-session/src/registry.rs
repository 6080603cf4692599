//! The session registry: who is connected and how far through the
//! challenge they are.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself; it uses plain
//! `HashMap`s. It is owned by the [`SessionController`](crate::SessionController),
//! and the server puts the whole controller behind one lock so every
//! read-modify-write sequence (check-then-register, check-then-login) is
//! atomic.

use std::collections::HashMap;

use gatekeep_protocol::{IdentityKey, Position};

use crate::{RegistryError, Session, SessionState};

/// In-memory state for every connected identity.
///
/// ## Lifecycle
///
/// ```text
/// mark_pending() ──→ mark_authenticated() ──→ forget()
///       │                                        ↑
///       └────────────────────────────────────────┘
/// ```
///
/// Saved positions live in a separate map because they outlive the
/// session: `forget()` leaves them alone, and the next qualifying connect
/// overwrites them.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// One entry per connected identity. Using a single map with a state
    /// enum (rather than a "pending" set and an "authenticated" set) makes
    /// "in both at once" unrepresentable.
    sessions: HashMap<IdentityKey, Session>,

    /// Where each identity was standing before the challenge moved it.
    saved_positions: HashMap<IdentityKey, Position>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a connected identity on the challenge.
    ///
    /// No-op if it is already pending (the original `since` is kept).
    ///
    /// # Errors
    /// Returns [`RegistryError::IllegalState`] if the identity is already
    /// authenticated. The controller clears stale sessions on connect, so
    /// this only fires on a logic bug.
    pub fn mark_pending(
        &mut self,
        identity: &IdentityKey,
        origin: &str,
        now: u64,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.sessions.get(identity) {
            return match existing.state {
                SessionState::Authenticated => Err(RegistryError::IllegalState(identity.clone())),
                SessionState::Pending { .. } => Ok(()),
            };
        }

        self.sessions.insert(
            identity.clone(),
            Session {
                identity: identity.clone(),
                origin: origin.to_string(),
                state: SessionState::Pending { since: now },
            },
        );
        tracing::debug!(%identity, %origin, "session pending");
        Ok(())
    }

    /// Marks an identity authenticated, leaving the pending state if it was
    /// in it. `origin` replaces the recorded address.
    pub fn mark_authenticated(&mut self, identity: &IdentityKey, origin: &str) {
        let session = self
            .sessions
            .entry(identity.clone())
            .or_insert_with(|| Session {
                identity: identity.clone(),
                origin: origin.to_string(),
                state: SessionState::Authenticated,
            });
        session.origin = origin.to_string();
        session.state = SessionState::Authenticated;
        tracing::debug!(%identity, %origin, "session authenticated");
    }

    pub fn is_authenticated(&self, identity: &IdentityKey) -> bool {
        self.sessions
            .get(identity)
            .is_some_and(Session::is_authenticated)
    }

    pub fn is_pending(&self, identity: &IdentityKey) -> bool {
        self.sessions.get(identity).is_some_and(Session::is_pending)
    }

    pub fn get(&self, identity: &IdentityKey) -> Option<&Session> {
        self.sessions.get(identity)
    }

    /// The address the identity connected from, if it is connected.
    pub fn origin(&self, identity: &IdentityKey) -> Option<&str> {
        self.sessions.get(identity).map(|s| s.origin.as_str())
    }

    /// Drops the identity's session (both markers). Saved positions stay.
    pub fn forget(&mut self, identity: &IdentityKey) -> Option<Session> {
        let removed = self.sessions.remove(identity);
        if removed.is_some() {
            tracing::debug!(%identity, "session forgotten");
        }
        removed
    }

    /// Records where the identity should be returned after authenticating.
    pub fn save_position(&mut self, identity: IdentityKey, position: Position) {
        self.saved_positions.insert(identity, position);
    }

    pub fn saved_position(&self, identity: &IdentityKey) -> Option<&Position> {
        self.saved_positions.get(identity)
    }

    /// Pending identities whose challenge started at least `timeout_millis`
    /// before `now`, sorted by name.
    pub fn expired_pending(&self, now: u64, timeout_millis: u64) -> Vec<IdentityKey> {
        let mut expired: Vec<IdentityKey> = self
            .sessions
            .values()
            .filter_map(|session| match session.state {
                SessionState::Pending { since } if now.saturating_sub(since) >= timeout_millis => {
                    Some(session.identity.clone())
                }
                _ => None,
            })
            .collect();
        expired.sort();
        expired
    }

    /// Number of connected identities.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
