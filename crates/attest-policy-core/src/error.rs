//! Error types for the policy engine
//!
//! Compilation-time errors propagate to the caller. Interpreter failures are
//! reduced to a failing verdict at the `DatalogPolicy::evaluate` boundary.

use thiserror::Error;

/// Main error type for policy compilation and evaluation
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The Datalog interpreter failed to run or reported an error on stderr
    #[error("Interpreter error running `{command}`: {stderr}")]
    Interpreter {
        /// Full command line that was executed
        command: String,
        /// Raw stderr captured from the process
        stderr: String,
    },

    /// A policy definition contains an unsupported grammar node
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// `validate` was called on a policy whose definition was never compiled
    #[error("Policy not compiled: {0}")]
    PolicyNotCompiled(String),

    /// A column carries an SQL type with no Datalog mapping
    #[error("Unsupported column type '{sql_type}' for {table}.{column}")]
    UnsupportedColumnType {
        table: String,
        column: String,
        sql_type: String,
    },

    /// Results were requested before the policy was evaluated
    #[error("Policy results requested before evaluation")]
    NotEvaluated,

    /// The interpreter produced a result row that cannot be parsed
    #[error("Malformed result row: {0}")]
    MalformedResult(String),

    /// Schema metadata could not be obtained for a database
    #[error("Schema error: {0}")]
    Schema(String),

    /// File access or I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PolicyError {
    /// Create an invalid policy error
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        PolicyError::InvalidPolicy(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        PolicyError::Schema(msg.into())
    }

    /// Check if this error was caused by user input (vs the environment)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PolicyError::InvalidPolicy(_)
                | PolicyError::UnsupportedColumnType { .. }
                | PolicyError::Schema(_)
                | PolicyError::Json(_)
                | PolicyError::Yaml(_)
                | PolicyError::Toml(_)
        )
    }
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
