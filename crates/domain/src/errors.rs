//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Malformed input to an analytics function (negative or non-finite values,
    /// out-of-range ratios, mismatched series)
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A structural invariant of a domain object does not hold
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create an invalid-parameters error
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// Create an invariant-violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_error_message() {
        let err = DomainError::invalid_parameters("volume must not be negative");
        assert_eq!(
            err.to_string(),
            "Invalid parameters: volume must not be negative"
        );
    }

    #[test]
    fn invariant_error_message() {
        let err = DomainError::invariant("ranks out of order");
        assert_eq!(err.to_string(), "Invariant violated: ranks out of order");
    }

    #[test]
    fn validation_error_message() {
        let err = DomainError::ValidationError("operation is empty".to_string());
        assert_eq!(err.to_string(), "Validation failed: operation is empty");
    }
}
