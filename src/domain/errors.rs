//! Domain errors for the control core.
//!
//! Recoverable errors are returned as variants and handled locally; detected
//! invariant breaches surface as loud diagnostics but never tear down the
//! tick loop.

use thiserror::Error;

/// Cap applied to error messages crossing a prompt-facing boundary.
pub const MAX_ERROR_LEN: usize = 200;

/// Truncate an error message for prompt safety.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_LEN).collect()
    }
}

/// Error taxonomy of the control core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invariant check failed; the offending item was dropped.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A horizon, branch, or node cap was reached.
    #[error("bounds exceeded: {0}")]
    BoundsExceeded(String),

    /// An external call or planning budget expired.
    #[error("deadline exceeded after {waited_ms}ms: {operation}")]
    DeadlineExceeded { operation: String, waited_ms: u64 },

    /// An action was inapplicable in the current state.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// The gateway refused a call while a reflex override is active.
    #[error("gateway blocked: {reason}")]
    GatewayBlocked { reason: String },

    /// An external payload failed schema validation.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    /// A network or IPC failure crossed a boundary.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl CoreError {
    /// Transport failure with the original message truncated to 200 chars.
    pub fn transport(message: &str) -> Self {
        Self::TransportFailure(truncate_error(message))
    }

    /// Whether the caller may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }
}

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SchemaInvalid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error() {
        let long = "e".repeat(500);
        assert_eq!(truncate_error(&long).chars().count(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn test_transport_truncates() {
        let err = CoreError::transport(&"x".repeat(500));
        match err {
            CoreError::TransportFailure(msg) => assert_eq!(msg.chars().count(), MAX_ERROR_LEN),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_recoverability() {
        assert!(!CoreError::InvariantViolation("x".to_string()).is_recoverable());
        assert!(CoreError::DeadlineExceeded {
            operation: "solve".to_string(),
            waited_ms: 2000
        }
        .is_recoverable());
    }
}
