//! Deciding whether a returning identity may skip the challenge.

use gatekeep_store::{CredentialRecord, StoreSettings};

/// "Same address, recently" trust.
///
/// A returning identity skips the challenge iff its record's last origin is
/// exactly the address it connects from now, and its last successful login
/// was less than the trust window ago. There is no prefix or subnet
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    window_millis: u64,
}

impl TrustPolicy {
    pub fn new(window_millis: u64) -> Self {
        Self { window_millis }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.trust_window_millis())
    }

    pub fn window_millis(&self) -> u64 {
        self.window_millis
    }

    /// `true` if `record` exists, was last used from `origin`, and is
    /// still inside the window at `now`.
    ///
    /// A timestamp later than `now` (clock moved backwards) counts as
    /// zero elapsed time.
    pub fn should_auto_login(
        &self,
        record: Option<&CredentialRecord>,
        origin: &str,
        now: u64,
    ) -> bool {
        let Some(record) = record else {
            return false;
        };
        record.last_origin == origin
            && now.saturating_sub(record.last_success_at) < self.window_millis
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::from_settings(&StoreSettings::default())
    }
}
