//! Error types for Gridline

use std::time::Duration;
use thiserror::Error;

/// Problems with the design-system policy document.
///
/// Always fatal: a run never starts scanning with a policy that failed to load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Missing required policy field: {0}")]
    MissingField(String),

    #[error("Invalid budget for '{field}': {reason}")]
    InvalidBudget { field: String, reason: String },

    #[error("Policy parse error: {0}")]
    Parse(String),

    #[error("Unknown rule in overrides: {0}")]
    UnknownRule(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ConfigError {
    pub fn invalid_budget(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidBudget {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The main error type for Gridline operations
#[derive(Debug, Error)]
pub enum GridlineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Scan root not found: {0}")]
    ScanRootNotFound(String),

    #[error("Aggregation invariant violated: {0}")]
    AggregationInvariant(String),

    #[error("Rewriter dispatch failed: {0}")]
    RewriterDispatch(String),

    #[error("Rewriter timed out after {0:?}")]
    RewriterTimeout(Duration),

    #[error("Rewriter returned a path that is not a scanned file under the root: {0}")]
    RewriterPathRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Gridline operations
pub type Result<T> = std::result::Result<T, GridlineError>;

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for GridlineError {
    fn from(err: toml::de::Error) -> Self {
        GridlineError::Config(err.into())
    }
}

impl GridlineError {
    /// Whether the fix loop may absorb this error as a failed attempt
    /// instead of aborting the run.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            GridlineError::RewriterDispatch(_)
                | GridlineError::RewriterTimeout(_)
                | GridlineError::RewriterPathRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_names_the_field() {
        let err = ConfigError::MissingField("size_tokens".to_string());
        assert_eq!(err.to_string(), "Missing required policy field: size_tokens");
    }

    #[test]
    fn test_config_error_converts_transparently() {
        let err: GridlineError = ConfigError::invalid_budget("spacing_base_unit", "must be > 0").into();
        assert_eq!(
            err.to_string(),
            "Invalid budget for 'spacing_base_unit': must be > 0"
        );
    }

    #[test]
    fn test_timeout_keeps_sub_second_precision() {
        assert_eq!(
            GridlineError::RewriterTimeout(Duration::from_millis(250)).to_string(),
            "Rewriter timed out after 250ms"
        );
        assert_eq!(
            GridlineError::RewriterTimeout(Duration::from_secs(120)).to_string(),
            "Rewriter timed out after 120s"
        );
    }

    #[test]
    fn test_dispatch_failures() {
        assert!(GridlineError::RewriterTimeout(Duration::from_secs(30)).is_dispatch_failure());
        assert!(GridlineError::RewriterDispatch("exit 1".into()).is_dispatch_failure());
        assert!(!GridlineError::AggregationInvariant("x".into()).is_dispatch_failure());
    }
}
