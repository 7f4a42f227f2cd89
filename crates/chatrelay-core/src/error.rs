//! Error type shared by the node, the client and the ops tooling.
//!
//! Every failure that can reach a peer or a client carries a [`ClientCode`];
//! the code string is what goes on the wire (`error` events, HTTP bodies),
//! the `Display` text is for logs.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    BadRequest,
    AuthFailed,
    /// No live link to a node.
    NotConnected,
    PayloadTooLarge,
    UnsupportedVersion,
    Internal,
}

impl ClientCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::AuthFailed => "AUTH_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ClientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed frame, relay body or config value.
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("identity could not be resolved")]
    AuthFailed,
    #[error("no live connection to a node")]
    NotConnected,
    #[error("frame exceeds the configured size limit")]
    PayloadTooLarge,
    #[error("unsupported config version")]
    UnsupportedVersion,
    /// I/O, encoding and peer failures.
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn client_code(&self) -> ClientCode {
        match self {
            Self::BadRequest(_) => ClientCode::BadRequest,
            Self::AuthFailed => ClientCode::AuthFailed,
            Self::NotConnected => ClientCode::NotConnected,
            Self::PayloadTooLarge => ClientCode::PayloadTooLarge,
            Self::UnsupportedVersion => ClientCode::UnsupportedVersion,
            Self::Internal(_) => ClientCode::Internal,
        }
    }

    /// Whether the fault lies with whoever sent the input.
    pub fn is_caller_fault(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(RelayError::BadRequest("x".into()).client_code().to_string(), "BAD_REQUEST");
        assert_eq!(RelayError::NotConnected.client_code().as_str(), "NOT_CONNECTED");
        assert_eq!(RelayError::Internal("io".into()).client_code().as_str(), "INTERNAL");
    }

    #[test]
    fn caller_faults() {
        assert!(RelayError::PayloadTooLarge.is_caller_fault());
        assert!(RelayError::AuthFailed.is_caller_fault());
        assert!(!RelayError::Internal("disk".into()).is_caller_fault());
    }
}
