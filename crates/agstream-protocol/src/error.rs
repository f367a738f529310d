//! Error types for protocol decoding.

use thiserror::Error;

/// Errors raised while decoding wire documents.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The document has no string `type` discriminator.
    #[error("Event document has no \"type\" field")]
    MissingType,

    /// The document is not shaped like an event.
    #[error("Invalid event document: {0}")]
    InvalidDocument(String),

    /// The payload is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProtocolError::MissingType.to_string(),
            "Event document has no \"type\" field"
        );
        assert_eq!(
            ProtocolError::InvalidDocument("not an object".into()).to_string(),
            "Invalid event document: not an object"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}
