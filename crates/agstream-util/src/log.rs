//! Logging setup using tracing.
//!
//! This module provides consistent logging configuration across agstream.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to print logs to stderr.
    pub print: bool,
    /// Log level.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
    /// Log file path (if any). Lines are appended.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            print: false,
            level: LogLevel::Info,
            include_location: false,
            file: None,
        }
    }
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if the log
/// file cannot be opened or a global subscriber is already installed.
pub fn init(config: &LogConfig) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let stderr_layer = config.print.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_level(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
    });

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)
}

/// Get the default log file path.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("agstream").join("logs").join("agstream.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("invalid"), None);
    }

    #[test]
    fn test_log_level_as_str() {
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(!config.print);
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("agstream.log");
        let config = LogConfig {
            file: Some(path.clone()),
            ..Default::default()
        };

        // Another test binary may already own the global subscriber; the file
        // is opened before installation either way.
        let _ = init(&config);
        assert!(path.exists());
    }
}
