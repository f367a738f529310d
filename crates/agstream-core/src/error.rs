//! Error types for the core crate.

use agstream_protocol::ProtocolError;
use thiserror::Error;

/// Broad category of an [`AgentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Network,
    Parse,
    Execution,
    Timeout,
    Validation,
    State,
    Cancelled,
    Unknown,
}

/// Stable numeric error codes, grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    ConfigInvalidUrl = 10001,
    ConfigMissingRequired = 10002,
    ConfigInvalidFormat = 10003,
    NetworkError = 20005,
    ParseJsonError = 30001,
    ParseEventError = 30003,
    ExecutionAgentFailed = 40001,
    ExecutionCancelled = 40004,
    TimeoutRequest = 50001,
    ValidationInvalidInput = 60001,
    StatePatchFailed = 70002,
    Unknown = 990000,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Suggested reaction to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Give up.
    None,
    /// Retry the whole run.
    Retry,
    /// Drop the offending payload and keep reading.
    SkipAndContinue,
}

/// Errors raised by the client core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed or untyped event payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Event document rejected by the decoder.
    #[error("parse error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Bad patch path, operation or type mismatch, failed test.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// State store misuse (e.g. rollback without history).
    #[error("state error: {message}")]
    State { message: String },

    /// Transport-originated failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Transport-originated timeout.
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A subscriber or middleware failed.
    #[error("execution error: {message}")]
    Execution { message: String },

    /// The run was cancelled or halted before completion.
    #[error("run cancelled: {reason}")]
    Cancelled { reason: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Parse { .. } | AgentError::Protocol(_) | AgentError::Json(_) => {
                ErrorKind::Parse
            }
            AgentError::Validation { .. } => ErrorKind::Validation,
            AgentError::State { .. } => ErrorKind::State,
            AgentError::Network { .. } => ErrorKind::Network,
            AgentError::Timeout { .. } => ErrorKind::Timeout,
            AgentError::Config(_) => ErrorKind::Config,
            AgentError::Execution { .. } => ErrorKind::Execution,
            AgentError::Cancelled { .. } => ErrorKind::Cancelled,
            AgentError::Io(_) => ErrorKind::Unknown,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AgentError::Parse { .. } | AgentError::Protocol(_) => ErrorCode::ParseEventError,
            AgentError::Json(_) => ErrorCode::ParseJsonError,
            AgentError::Validation { .. } => ErrorCode::ValidationInvalidInput,
            AgentError::State { .. } => ErrorCode::StatePatchFailed,
            AgentError::Network { .. } => ErrorCode::NetworkError,
            AgentError::Timeout { .. } => ErrorCode::TimeoutRequest,
            AgentError::Config(ConfigError::MissingUrl) => ErrorCode::ConfigInvalidUrl,
            AgentError::Config(ConfigError::EnvVarNotFound { .. })
            | AgentError::Config(ConfigError::FileRefNotFound { .. }) => {
                ErrorCode::ConfigMissingRequired
            }
            AgentError::Config(_) => ErrorCode::ConfigInvalidFormat,
            AgentError::Execution { .. } => ErrorCode::ExecutionAgentFailed,
            AgentError::Cancelled { .. } => ErrorCode::ExecutionCancelled,
            AgentError::Io(_) => ErrorCode::Unknown,
        }
    }

    pub fn recovery(&self) -> RecoveryStrategy {
        match self.kind() {
            ErrorKind::Network | ErrorKind::Timeout => RecoveryStrategy::Retry,
            ErrorKind::Parse => RecoveryStrategy::SkipAndContinue,
            _ => RecoveryStrategy::None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.recovery() == RecoveryStrategy::Retry
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// The agent has no endpoint url.
    #[error("agent url is required")]
    MissingUrl,

    /// A setting has an unusable value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },
}

/// Result type for core operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AgentError::validation("path not found: /a").to_string(),
            "validation error: path not found: /a"
        );
        assert_eq!(
            AgentError::Config(ConfigError::MissingUrl).to_string(),
            "config error: agent url is required"
        );
        assert_eq!(
            AgentError::cancelled("user").to_string(),
            "run cancelled: user"
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AgentError::parse("x").kind(), ErrorKind::Parse);
        assert_eq!(
            AgentError::from(ProtocolError::MissingType).kind(),
            ErrorKind::Parse
        );
        assert_eq!(AgentError::state("x").kind(), ErrorKind::State);
        assert_eq!(AgentError::timeout("x").kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_codes_grouped_by_category() {
        assert_eq!(AgentError::network("down").code().as_u32(), 20005);
        assert_eq!(AgentError::validation("bad").code().as_u32(), 60001);
        assert_eq!(
            AgentError::Config(ConfigError::MissingUrl).code(),
            ErrorCode::ConfigInvalidUrl
        );
        let json_err: AgentError = serde_json::from_str::<serde_json::Value>("nope")
            .unwrap_err()
            .into();
        assert_eq!(json_err.code(), ErrorCode::ParseJsonError);
    }

    #[test]
    fn test_recovery() {
        assert!(AgentError::network("reset").is_retryable());
        assert!(AgentError::timeout("slow").is_retryable());
        assert!(!AgentError::validation("bad").is_retryable());
        assert_eq!(
            AgentError::parse("junk").recovery(),
            RecoveryStrategy::SkipAndContinue
        );
    }
}
