//! Transport error types.

use lookout_protocol::ProtocolError;
use thiserror::Error;

/// Errors that end a client connection or the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound byte stream could not be split into frames.
    #[error("framing error: {0}")]
    Framing(#[from] ProtocolError),

    /// Another client already owns the adapter's callbacks.
    #[error("a client is already connected")]
    AlreadyConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_io_display() {
        let err = ServerError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(err.to_string(), "I/O error: reset by peer");
    }

    #[test]
    fn error_framing_display() {
        let err = ServerError::from(ProtocolError::Transport("missing Content-Length".into()));
        assert_eq!(
            err.to_string(),
            "framing error: transport error: missing Content-Length"
        );
    }

    #[test]
    fn error_already_connected_display() {
        assert_eq!(
            ServerError::AlreadyConnected.to_string(),
            "a client is already connected"
        );
    }
}
