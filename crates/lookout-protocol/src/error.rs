//! CDP protocol error types.

use thiserror::Error;

/// Errors produced while decoding inbound CDP traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message was not a JSON object with an integer `id` and a string
    /// `method`. Such messages cannot be answered.
    #[error("unparseable message: {0}")]
    Parse(String),

    /// The method is known but its `params` did not match the expected shape.
    #[error("invalid params for {method}: {message}")]
    InvalidParams {
        /// Id of the offending request, used to answer it.
        id: i64,
        /// Method name of the offending request.
        method: String,
        /// Deserializer diagnostic.
        message: String,
    },

    /// Framing-level failure on the wire.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_parse_display() {
        let err = ProtocolError::Parse("expected value at line 1".into());
        assert_eq!(
            err.to_string(),
            "unparseable message: expected value at line 1"
        );
    }

    #[test]
    fn error_invalid_params_display() {
        let err = ProtocolError::InvalidParams {
            id: 4,
            method: "Debugger.setBreakpoint".into(),
            message: "missing field `location`".into(),
        };
        assert!(err.to_string().contains("Debugger.setBreakpoint"));
        assert!(err.to_string().contains("missing field `location`"));
    }

    #[test]
    fn error_transport_display() {
        let err = ProtocolError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }
}
