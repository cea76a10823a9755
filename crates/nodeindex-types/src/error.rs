//! Error types for the node model and configuration.

use thiserror::Error;

/// Errors raised while loading settings or decoding node definitions.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::Config("missing index_name".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing index_name");

        let err = ModelError::InvalidInput("empty node type name".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty node type name");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<u32>("{").unwrap_err();
        let err: ModelError = json_err.into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
