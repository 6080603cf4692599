//! Secret storage: salted PBKDF2-HMAC-SHA256 with a plaintext fallback for
//! store files written before hashing existed.
//!
//! The login contract is still "exact match": a login succeeds iff the
//! attempt is byte-identical to what was registered. Hashing changes what
//! sits on disk, not who gets in.

use std::fmt;

use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Marker that starts every hashed secret field.
const HASH_PREFIX: &str = "$pbkdf2-sha256$";

/// Salt length in bytes (hex-encoded on disk).
const SALT_BYTES: usize = 16;

/// Iteration count used for newly hashed secrets.
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

/// A secret as it lives in the credential store.
///
/// The encoded form of a hashed secret is
/// `$pbkdf2-sha256$<iterations>$<salt hex>$<digest hex>`. Anything else is a
/// legacy plaintext secret.
#[derive(Clone, PartialEq, Eq)]
pub enum StoredSecret {
    /// Cleartext inherited from an older store file. Compared exactly and
    /// replaced by a hash on the next successful login.
    Plain(String),

    /// PBKDF2-HMAC-SHA256 digest.
    Hashed {
        iterations: u32,
        salt: String,
        digest: String,
    },
}

impl StoredSecret {
    /// Hashes `secret` with a fresh random salt.
    pub fn hash(secret: &str, iterations: u32) -> Self {
        let bytes: [u8; SALT_BYTES] = rand::rng().random();
        let salt = hex::encode(bytes);
        let iterations = iterations.max(1);
        let digest = digest(secret, &salt, iterations);
        Self::Hashed {
            iterations,
            salt,
            digest,
        }
    }

    /// Returns `true` if `attempt` is exactly the secret that was stored.
    ///
    /// Both branches compare in constant time.
    pub fn verify(&self, attempt: &str) -> bool {
        match self {
            Self::Plain(stored) => stored.as_bytes().ct_eq(attempt.as_bytes()).into(),
            Self::Hashed {
                iterations,
                salt,
                digest: stored,
            } => {
                let candidate = digest(attempt, salt, *iterations);
                stored.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
        }
    }

    /// `true` for cleartext secrets that should be re-hashed.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Plain(_))
    }

    /// Parses the (already unquoted) secret field of a store line.
    ///
    /// Returns `None` when the field claims to be a hash but is not a
    /// well-formed one. Treating a broken hash as plaintext would let its
    /// literal text log in.
    pub fn parse(field: &str) -> Option<Self> {
        let Some(rest) = field.strip_prefix(HASH_PREFIX) else {
            return Some(Self::Plain(field.to_string()));
        };

        let mut parts = rest.split('$');
        let iterations = parts.next()?.parse::<u32>().ok().filter(|n| *n > 0)?;
        let salt = parts.next().filter(|s| is_hex(s))?;
        let digest = parts.next().filter(|s| s.len() == 64 && is_hex(s))?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self::Hashed {
            iterations,
            salt: salt.to_string(),
            digest: digest.to_string(),
        })
    }
}

/// The on-disk encoding (without the surrounding quotes).
impl fmt::Display for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(secret) => f.write_str(secret),
            Self::Hashed {
                iterations,
                salt,
                digest,
            } => write!(f, "{HASH_PREFIX}{iterations}${salt}${digest}"),
        }
    }
}

/// Never prints the secret material.
impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("StoredSecret::Plain(..)"),
            Self::Hashed { iterations, .. } => f
                .debug_struct("StoredSecret::Hashed")
                .field("iterations", iterations)
                .finish_non_exhaustive(),
        }
    }
}

/// PBKDF2-HMAC-SHA256 over the hex salt text, hex-encoded.
fn digest(secret: &str, salt: &str, iterations: u32) -> String {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), iterations, &mut out);
    hex::encode(out)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
