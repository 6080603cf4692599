//! Unified error type for the Gatekeep server.

use gatekeep_protocol::ProtocolError;
use gatekeep_store::StoreError;
use gatekeep_transport::TransportError;

/// Top-level error that wraps every crate-specific error the server can
/// hit. The `#[from]` attributes let `?` convert them.
///
/// Refused `register`/`login` commands are not errors at this level: the
/// session controller turns them into notices.
#[derive(Debug, thiserror::Error)]
pub enum GatekeepError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The credential store could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking task (key derivation, store write) panicked or was
    /// cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: GatekeepError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, GatekeepError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: GatekeepError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, GatekeepError::Protocol(_)));
    }

    #[test]
    fn test_from_store_error() {
        let err: GatekeepError = StoreError::Write {
            path: "auth.yml".into(),
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert!(matches!(err, GatekeepError::Store(_)));
    }

    #[tokio::test]
    async fn test_from_join_error() {
        let join = tokio::task::spawn_blocking(|| -> u8 { panic!("boom") }).await;
        let err: GatekeepError = join.expect_err("task panicked").into();
        assert!(matches!(err, GatekeepError::Task(_)));
    }
}
