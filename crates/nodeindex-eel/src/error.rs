//! Expression evaluation errors.

use thiserror::Error;

/// Errors raised while parsing or evaluating an indexing rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// The rule is not a valid expression
    #[error("Syntax error in `{expression}` at offset {position}: {message}")]
    Syntax {
        expression: String,
        position: usize,
        message: String,
    },

    /// The rule calls a helper that does not exist
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A helper was called with arguments it cannot handle
    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },
}

impl EvaluationError {
    pub(crate) fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        EvaluationError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvaluationError::Syntax {
            expression: "${value".to_string(),
            position: 7,
            message: "unterminated expression".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Syntax error in `${value` at offset 7: unterminated expression"
        );

        let err = EvaluationError::UnknownFunction("Date.format".to_string());
        assert_eq!(err.to_string(), "Unknown function: Date.format");

        let err = EvaluationError::invalid_argument("Array.join", "expected an array");
        assert_eq!(err.to_string(), "Invalid argument for Array.join: expected an array");
    }
}
