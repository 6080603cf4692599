//! The data the store keeps: per-identity records and the two settings
//! directives at the top of the file.

use crate::StoredSecret;

const MILLIS_PER_HOUR: u64 = 60 * 60 * 1000;

/// What Gatekeep remembers about a registered identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// The registered secret (hashed unless it came from a legacy file).
    pub secret: StoredSecret,

    /// Textual network address of the last successful login.
    pub last_origin: String,

    /// Milliseconds since the Unix epoch of the last successful login.
    /// A value that could not be parsed from disk is stored as 0.
    pub last_success_at: u64,
}

impl CredentialRecord {
    pub fn new(
        secret: StoredSecret,
        last_origin: impl Into<String>,
        last_success_at: u64,
    ) -> Self {
        Self {
            secret,
            last_origin: last_origin.into(),
            last_success_at,
        }
    }

    /// Stamps a successful login.
    pub fn touch(&mut self, origin: &str, now: u64) {
        self.last_origin = origin.to_string();
        self.last_success_at = now;
    }
}

/// The settings directives stored alongside the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// `login time out:<n>sec`. How long an identity may stay at the
    /// challenge before the (optional) timeout sweep removes it.
    pub challenge_timeout_secs: u64,

    /// `ip cache time:<n>hrs`. How long a successful login keeps its
    /// origin trusted.
    pub trust_window_hours: u64,
}

impl StoreSettings {
    pub fn trust_window_millis(&self) -> u64 {
        self.trust_window_hours.saturating_mul(MILLIS_PER_HOUR)
    }

    pub fn challenge_timeout_millis(&self) -> u64 {
        self.challenge_timeout_secs.saturating_mul(1000)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            challenge_timeout_secs: 120,
            trust_window_hours: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_settings_default_values() {
        let settings = StoreSettings::default();
        assert_eq!(settings.challenge_timeout_secs, 120);
        assert_eq!(settings.trust_window_hours, 12);
        assert_eq!(settings.trust_window_millis(), 43_200_000);
        assert_eq!(settings.challenge_timeout_millis(), 120_000);
    }

    #[test]
    fn test_store_settings_huge_window_saturates() {
        let settings = StoreSettings {
            challenge_timeout_secs: 0,
            trust_window_hours: u64::MAX,
        };
        assert_eq!(settings.trust_window_millis(), u64::MAX);
    }

    #[test]
    fn test_credential_record_touch_updates_origin_and_time() {
        let mut record =
            CredentialRecord::new(StoredSecret::Plain("pw".into()), "1.1.1.1", 10);

        record.touch("2.2.2.2", 99);

        assert_eq!(record.last_origin, "2.2.2.2");
        assert_eq!(record.last_success_at, 99);
    }
}
