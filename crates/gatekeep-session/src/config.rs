//! Process-level settings for the session controller.
//!
//! The challenge timeout and trust window themselves live in the store
//! file (see [`gatekeep_store::StoreSettings`]) so operators edit them next
//! to the records. This struct holds what the file doesn't.

use gatekeep_protocol::BlockPos;
use gatekeep_store::DEFAULT_HASH_ITERATIONS;

/// The cell unauthenticated identities are held in, in whatever world they
/// connected to.
pub const HOLDING_BLOCK: BlockPos = BlockPos::new(0, 100, 0);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Kick identities that sit at the challenge longer than the store's
    /// `login time out`. Off by default: the timeout value is loaded and
    /// saved either way, but only enforced when this is set.
    pub enforce_challenge_timeout: bool,

    /// PBKDF2 rounds for newly stored secrets.
    pub hash_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enforce_challenge_timeout: false,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
        }
    }
}
