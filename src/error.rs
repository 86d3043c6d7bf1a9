//! Error types for the session engine.

use std::fmt;

use thiserror::Error;

use crate::control_packet::ConnectReturnCode;

/// Error returned by any fallible [`crate::session::Session`] operation.
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct SessionError {
    kind: SessionErrorKind,
}

impl SessionError {
    /// Create a new [`SessionError`]
    #[must_use]
    pub fn new(kind: SessionErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`SessionErrorKind`] for this error
    #[must_use]
    pub fn kind(&self) -> &SessionErrorKind {
        &self.kind
    }
}

impl From<SessionErrorKind> for SessionError {
    fn from(kind: SessionErrorKind) -> Self {
        Self::new(kind)
    }
}

/// An enumeration of categories of [`SessionError`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionErrorKind {
    /// The broker (or an internal component) sent something that violates the expected
    /// packet sequence.
    ProtocolViolation(String),
    /// The broker refused a CONNECT.
    ConnectingFailed(ConnectReturnCode),
    /// The transport adapter failed to send or deliver a packet.
    CommunicationFailed(String),
    /// An operation did not receive its expected response within the configured timeout.
    Timeout,
    /// The operation requires an active connection, but the Session is not connected.
    NotConnected,
    /// The wait was cancelled, typically because the Session disconnected while the
    /// caller was waiting on a response.
    Canceled,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionErrorKind::ProtocolViolation(detail) => {
                write!(f, "protocol violation: {detail}")
            }
            SessionErrorKind::ConnectingFailed(code) => {
                write!(f, "connect failed: broker returned {code:?}")
            }
            SessionErrorKind::CommunicationFailed(detail) => {
                write!(f, "communication with broker failed: {detail}")
            }
            SessionErrorKind::Timeout => write!(f, "timed out waiting for a response"),
            SessionErrorKind::NotConnected => write!(f, "session is not connected"),
            SessionErrorKind::Canceled => write!(f, "wait was canceled"),
        }
    }
}
