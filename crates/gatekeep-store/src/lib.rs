//! Credential persistence for Gatekeep.
//!
//! The store is a plain text file that a server operator can read and edit
//! by hand:
//!
//! ```text
//! login time out:120sec
//! ip cache time:12hrs
//!
//! registered players
//! bob : "$pbkdf2-sha256$100000$9f..$3a.." : 9.9.9.9 : 1760000000000
//! ```
//!
//! [`CredentialStore`] owns the in-memory map and is the single source of
//! truth for what gets written. Loading never aborts on a bad line, and
//! saving always rewrites the whole file.

mod error;
mod format;
mod record;
mod secret;
mod store;

pub use error::StoreError;
pub use record::{CredentialRecord, StoreSettings};
pub use secret::{DEFAULT_HASH_ITERATIONS, StoredSecret};
pub use store::{CredentialStore, LoadReport, StoreSnapshot, unix_millis};
