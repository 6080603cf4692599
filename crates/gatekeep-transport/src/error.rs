use std::io;

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// Binding the listener, accepting a socket, or upgrading it failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// The WebSocket upgrade did not finish in time.
    #[error("handshake from {0} timed out")]
    HandshakeTimeout(std::net::SocketAddr),
}
