//! Secret hashing and verification, split out of the controller's
//! transitions so it can run without the controller borrowed.
//!
//! A `register` or `login` goes through three steps:
//!
//! 1. [`SessionController::plan_command`] checks everything it can from
//!    current state and returns a [`SecretCheck`].
//! 2. [`SecretCheck::run`] does the CPU-bound key derivation.
//! 3. [`SessionController::finish_command`] re-checks state and commits.
//!
//! [`SessionController::plan_command`]: crate::SessionController::plan_command
//! [`SessionController::finish_command`]: crate::SessionController::finish_command

use std::fmt;

use gatekeep_protocol::IdentityKey;
use gatekeep_store::StoredSecret;

use crate::Effect;

/// What [`plan_command`](crate::SessionController::plan_command) decided.
#[derive(Debug)]
pub enum CommandPlan {
    /// The command was settled without touching a secret (usually a
    /// refusal). Apply these effects.
    Ready(Vec<Effect>),
    /// Run the check, then hand the result to
    /// [`finish_command`](crate::SessionController::finish_command).
    Check(SecretCheck),
}

/// Key derivation work for one command.
pub struct SecretCheck {
    identity: IdentityKey,
    work: Work,
}

enum Work {
    Register {
        secret: String,
        iterations: u32,
    },
    Login {
        attempt: String,
        stored: StoredSecret,
        iterations: u32,
    },
}

impl SecretCheck {
    pub(crate) fn register(identity: IdentityKey, secret: String, iterations: u32) -> Self {
        Self {
            identity,
            work: Work::Register { secret, iterations },
        }
    }

    pub(crate) fn login(
        identity: IdentityKey,
        attempt: String,
        stored: StoredSecret,
        iterations: u32,
    ) -> Self {
        Self {
            identity,
            work: Work::Login {
                attempt,
                stored,
                iterations,
            },
        }
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Hashes or verifies. Takes as long as the configured iteration count
    /// makes it take; the server runs this on a blocking thread.
    pub fn run(self) -> CheckedSecret {
        let outcome = match self.work {
            Work::Register { secret, iterations } => {
                Outcome::Hashed(StoredSecret::hash(&secret, iterations))
            }
            Work::Login {
                attempt,
                stored,
                iterations,
            } => {
                if stored.verify(&attempt) {
                    let upgrade = stored
                        .is_legacy()
                        .then(|| StoredSecret::hash(&attempt, iterations));
                    Outcome::Verified {
                        against: stored,
                        upgrade,
                    }
                } else {
                    Outcome::Rejected
                }
            }
        };
        CheckedSecret {
            identity: self.identity,
            outcome,
        }
    }
}

/// Never prints the secret or the attempt.
impl fmt::Debug for SecretCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.work {
            Work::Register { .. } => "register",
            Work::Login { .. } => "login",
        };
        f.debug_struct("SecretCheck")
            .field("identity", &self.identity)
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

/// The result of [`SecretCheck::run`], ready to commit.
#[derive(Debug)]
pub struct CheckedSecret {
    pub(crate) identity: IdentityKey,
    pub(crate) outcome: Outcome,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    /// A fresh hash for `register`.
    Hashed(StoredSecret),
    /// The attempt matched `against`. `upgrade` replaces a plaintext
    /// secret.
    Verified {
        against: StoredSecret,
        upgrade: Option<StoredSecret>,
    },
    Rejected,
}
