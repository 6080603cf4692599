//! Error types for the credential store.

use std::path::PathBuf;

/// Errors that can occur while reading or writing the store file.
///
/// Nothing in Gatekeep treats these as fatal: the session controller logs
/// them and keeps serving from memory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The file exists but could not be read.
    #[error("failed to read credential store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file (or its temporary sibling) could not be written or moved
    /// into place.
    #[error("failed to write credential store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
