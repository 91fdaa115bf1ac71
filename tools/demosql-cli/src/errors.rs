//!
//! Command-line error types.
//!
//! Anything the front end reports before exiting with a non-zero status.
//!

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse config at {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Statement takes {expected} parameters but {given} were given")]
    ParameterCount { expected: usize, given: usize },

    #[error("Statement produces no columns to plot")]
    NoColumns,

    #[error("Database error: {0}")]
    Database(#[from] demosql::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = CliError::ConfigNotFound {
            path: PathBuf::from("/tmp/demosql.toml"),
        };
        assert!(err.to_string().contains("Config file not found"));
        assert!(err.to_string().contains("/tmp/demosql.toml"));

        let err = CliError::ParameterCount {
            expected: 1,
            given: 2,
        };
        assert_eq!(
            err.to_string(),
            "Statement takes 1 parameters but 2 were given"
        );

        let err = CliError::from(demosql::Error::EmptyStatement);
        assert_eq!(err.to_string(), "Database error: Empty query or comment");
    }
}
