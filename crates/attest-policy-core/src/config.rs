//! Interpreter configuration
//!
//! The interpreter binary and directory layout are explicit values handed to
//! each [`DatalogInterpreter`](crate::datalog::DatalogInterpreter) at
//! construction; nothing here is process-wide state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::datalog::DISCARD_OUTPUT;
use crate::error::Result;

/// Environment variable overriding the interpreter binary
pub const INTERPRETER_ENV_VAR: &str = "ATTEST_POLICY_INTERPRETER";

/// Default interpreter binary, resolved through `PATH`
pub const DEFAULT_INTERPRETER: &str = "souffle";

/// Configuration for spawning the Datalog interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter binary (name on `PATH` or absolute path)
    pub binary: PathBuf,

    /// Absolute output directory, or `-` to discard output; a fresh subdirectory of the workspace when unset
    pub output_dir: Option<PathBuf>,

    /// Absolute include directory; a fresh subdirectory of the workspace when unset
    pub include_dir: Option<PathBuf>,

    /// Absolute fact directory; a fresh subdirectory of the workspace when unset
    pub fact_dir: Option<PathBuf>,

    /// Absolute library directory; the workspace root when unset
    pub library_dir: Option<PathBuf>,

    /// Pass `-` as the output directory and skip collecting CSV output
    pub discard_output: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_INTERPRETER),
            output_dir: None,
            include_dir: None,
            fact_dir: None,
            library_dir: None,
            discard_output: false,
        }
    }
}

impl InterpreterConfig {
    /// Create a config for the given interpreter binary
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(binary) = std::env::var(INTERPRETER_ENV_VAR) {
            if !binary.trim().is_empty() {
                config.binary = PathBuf::from(binary);
            }
        }
        config
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Set the output directory override
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set the include directory override
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    /// Set the fact directory override
    pub fn with_fact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fact_dir = Some(dir.into());
        self
    }

    /// Set the library directory override
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    /// Discard interpreter output instead of collecting CSV files
    pub fn with_discarded_output(mut self) -> Self {
        self.discard_output = true;
        self
    }

    /// True when output is discarded, either by flag or by an `output_dir` of `-`
    pub fn discards_output(&self) -> bool {
        self.discard_output
            || self
                .output_dir
                .as_deref()
                .map_or(false, |dir| dir == Path::new(DISCARD_OUTPUT))
    }
}
