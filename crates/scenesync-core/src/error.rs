//! Crate-level error type with categorization:
//!
//! - **Validation errors**: bad input, configuration, parse failures (exit code 1)
//! - **System errors**: IO (exit code 2)
//! - **Not found**: unresolved resources (exit code 3)
//! - **Invalid state**: illegal lifecycle transitions (exit code 4)
//!
//! Command conflicts (`not_found`, `locked`, `revision_mismatch`,
//! `validation_failed`) are response values and never appear here.

use thiserror::Error;

use crate::{scheduler::SchedulerError, tree::TreeError};

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit code scheme:
    /// - 1: User error (validation, invalid input, bad configuration)
    /// - 2: System error (IO)
    /// - 3: Not found
    /// - 4: Invalid state
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::ParseError(_) | Self::ValidationError(_) => 1,
            Self::IoError(_) => 2,
            Self::NotFound(_) => 3,
            Self::InvalidState(_) => 4,
            Self::Tree(err) => err.exit_code(),
            Self::Scheduler(err) => err.exit_code(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::parse_error(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::parse_error(format!("Failed to parse config: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstancePath;

    #[test]
    fn test_error_display_invalid_config() {
        let err = Error::invalid_config("test error");
        assert_eq!(err.to_string(), "Invalid configuration: test error");
    }

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::validation_error("x").exit_code(), 1);
        assert_eq!(Error::io_error("x").exit_code(), 2);
        assert_eq!(Error::not_found("x").exit_code(), 3);
        assert_eq!(Error::invalid_state("x").exit_code(), 4);
        assert_eq!(
            Error::from(TreeError::PathNotFound(InstancePath::root())).exit_code(),
            3
        );
    }

    #[test]
    fn test_from_json_error_is_parse_error() {
        let result: Result<serde_json::Value> = serde_json::from_str("{").map_err(Error::from);
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
}
