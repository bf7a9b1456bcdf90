//! Error types for the control link.
//!
//! Every way a session can end maps onto one [`LinkError`] variant, and all of
//! them are handled identically at the boundary: the session closes, the
//! transport is released, and the link reports a [`DisconnectReason`] so the
//! owning context can fall back to manual control and offer a reconnect.
//! None of these are process-fatal; only a pixel-buffer size mismatch (a
//! programming invariant, not a runtime condition) panics.

use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("failed to connect to controller: {reason}")]
    ConnectFailure {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("protocol violation: {details}")]
    ProtocolViolation { details: String },

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("transport error during {operation}")]
    Transport {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("session cancelled")]
    Cancelled,
}

impl LinkError {
    /// Helper constructor for connect failures without an I/O source.
    pub fn connect_failure(reason: impl Into<String>) -> Self {
        LinkError::ConnectFailure { reason: reason.into(), source: None }
    }

    /// Helper constructor for connect failures caused by an I/O error.
    pub fn connect_failure_with_source(reason: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::ConnectFailure { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol_violation(details: impl Into<String>) -> Self {
        LinkError::ProtocolViolation { details: details.into() }
    }

    /// Helper constructor for mid-session I/O failures.
    pub fn transport(operation: &'static str, source: std::io::Error) -> Self {
        LinkError::Transport { operation, source }
    }

    /// Whether this error represents an orderly end of the session rather
    /// than a fault (peer hangup or an operator-requested teardown).
    pub fn is_clean_close(&self) -> bool {
        matches!(self, LinkError::PeerClosed | LinkError::Cancelled)
    }
}

/// Why the link entered the disconnected state.
///
/// A cloneable, data-free projection of [`LinkError`] suitable for
/// publishing on a status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectFailure,
    ProtocolViolation,
    PeerClosed,
    TransportError,
    Cancelled,
}

impl From<&LinkError> for DisconnectReason {
    fn from(err: &LinkError) -> Self {
        match err {
            LinkError::ConnectFailure { .. } => DisconnectReason::ConnectFailure,
            LinkError::ProtocolViolation { .. } => DisconnectReason::ProtocolViolation,
            LinkError::PeerClosed => DisconnectReason::PeerClosed,
            LinkError::Transport { .. } => DisconnectReason::TransportError,
            LinkError::Cancelled => DisconnectReason::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: LinkError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LinkError>();

        let error = LinkError::connect_failure("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn clean_close_classification() {
        assert!(LinkError::PeerClosed.is_clean_close());
        assert!(LinkError::Cancelled.is_clean_close());
        assert!(!LinkError::connect_failure("refused").is_clean_close());
        assert!(!LinkError::protocol_violation("bad length").is_clean_close());
        assert!(
            !LinkError::transport(
                "recv",
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")
            )
            .is_clean_close()
        );
    }

    #[test]
    fn disconnect_reason_projection() {
        let cases = [
            (LinkError::connect_failure("x"), DisconnectReason::ConnectFailure),
            (LinkError::protocol_violation("x"), DisconnectReason::ProtocolViolation),
            (LinkError::PeerClosed, DisconnectReason::PeerClosed),
            (LinkError::Cancelled, DisconnectReason::Cancelled),
            (
                LinkError::transport("send", std::io::Error::other("boom")),
                DisconnectReason::TransportError,
            ),
        ];
        for (err, reason) in cases {
            assert_eq!(DisconnectReason::from(&err), reason);
        }
    }

    #[test]
    fn messages_contain_context() {
        let err = LinkError::protocol_violation("unexpected 3-byte message");
        assert!(err.to_string().contains("unexpected 3-byte message"));

        let err = LinkError::transport("handshake", std::io::Error::other("boom"));
        assert!(err.to_string().contains("handshake"));
    }
}
