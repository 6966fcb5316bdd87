//! Unified error handling for the sakura-run library.
//!
//! Every fallible operation in the crate returns [`Result`], so configuration
//! problems, routing provider failures and solver limits can be told apart
//! by matching on a single enum.

use std::fmt;
use std::time::Duration;

/// Unified error type for sakura-run operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SakuraError {
    /// Invalid configuration: unknown columns, empty grouping keys, bad batch sizes
    ConfigError { message: String },
    /// A coordinate is out of range or could not be parsed
    InvalidCoordinates { index: usize, message: String },
    /// The routing provider asked us to slow down (transient)
    RateLimited { retry_after: Option<Duration> },
    /// The routing provider refused a request with too many points
    PointLimitExceeded { requested: usize, message: String },
    /// Non-transient routing provider failure
    ProviderError {
        message: String,
        status_code: Option<u16>,
        context: Option<String>,
    },
    /// A solver was asked to handle more points than it supports
    SolverLimit {
        method: String,
        points: usize,
        limit: usize,
    },
    /// Generic internal error
    Internal { message: String },
}

impl SakuraError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SakuraError::ConfigError {
            message: message.into(),
        }
    }

    /// Shorthand for a provider error without status code.
    pub fn provider(message: impl Into<String>) -> Self {
        SakuraError::ProviderError {
            message: message.into(),
            status_code: None,
            context: None,
        }
    }

    /// True for errors that are recovered by waiting and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, SakuraError::RateLimited { .. })
    }

    /// Attach request context (e.g. the failing block's index ranges).
    ///
    /// Provider failures and point-limit refusals carry context; other
    /// variants are returned as-is.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        match self {
            SakuraError::ProviderError {
                message,
                status_code,
                context: None,
            } => SakuraError::ProviderError {
                message,
                status_code,
                context: Some(ctx.into()),
            },
            SakuraError::PointLimitExceeded { requested, message } => {
                SakuraError::PointLimitExceeded {
                    requested,
                    message: format!("{} ({})", message, ctx.into()),
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for SakuraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SakuraError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SakuraError::InvalidCoordinates { index, message } => {
                write!(f, "Invalid coordinates at row {}: {}", index, message)
            }
            SakuraError::RateLimited { retry_after } => match retry_after {
                Some(wait) => write!(f, "Rate limited, retry after {:?}", wait),
                None => write!(f, "Rate limited"),
            },
            SakuraError::PointLimitExceeded { requested, message } => {
                write!(
                    f,
                    "Point limit exceeded ({} points requested): {}",
                    requested, message
                )
            }
            SakuraError::ProviderError {
                message,
                status_code,
                context,
            } => {
                match status_code {
                    Some(code) => write!(f, "Provider error ({}): {}", code, message)?,
                    None => write!(f, "Provider error: {}", message)?,
                }
                if let Some(ctx) = context {
                    write!(f, " [{}]", ctx)?;
                }
                Ok(())
            }
            SakuraError::SolverLimit {
                method,
                points,
                limit,
            } => {
                write!(
                    f,
                    "Solver '{}' supports at most {} points, got {}",
                    method, limit, points
                )
            }
            SakuraError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SakuraError {}

impl From<serde_json::Error> for SakuraError {
    fn from(e: serde_json::Error) -> Self {
        SakuraError::config(format!("invalid JSON: {}", e))
    }
}

/// Result type alias for sakura-run operations.
pub type Result<T> = std::result::Result<T, SakuraError>;

/// Extension trait for converting Option to SakuraError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-column configuration error.
    fn ok_or_missing_column(self, column: &str) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_column(self, column: &str) -> Result<T> {
        self.ok_or_else(|| SakuraError::ConfigError {
            message: format!("column '{}' not found in dataset", column),
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| SakuraError::Internal {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SakuraError::SolverLimit {
            method: "exact".to_string(),
            points: 40,
            limit: 16,
        };
        assert!(err.to_string().contains("exact"));
        assert!(err.to_string().contains("40"));
    }

    #[test]
    fn test_context_only_on_provider_errors() {
        let err = SakuraError::provider("boom").with_context("rows 0..5, cols 5..10");
        assert!(err.to_string().contains("rows 0..5"));

        let cfg = SakuraError::config("bad").with_context("ignored");
        assert_eq!(cfg, SakuraError::config("bad"));
    }

    #[test]
    fn test_transient() {
        assert!(SakuraError::RateLimited { retry_after: None }.is_transient());
        assert!(!SakuraError::provider("x").is_transient());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_missing_column("street");
        assert!(matches!(result, Err(SakuraError::ConfigError { .. })));
    }
}
