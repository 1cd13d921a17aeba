//! Command-line front end for the attestation policy engine
//!
//! ## Usage
//!
//! ```bash
//! # Print the Datalog prelude generated for a database
//! attest-policy datalog -d output/macaron.db -s schema.yaml --show-prelude
//!
//! # Evaluate a Datalog policy, counting failures for repository 1 only
//! attest-policy datalog -d output/macaron.db -s schema.yaml -f policy.dl --repo 1
//!
//! # Validate a provenance document against a structural policy
//! attest-policy validate -p policy.yaml -d provenance.json
//!
//! # Evaluate a directory of policies and validate a document for one repository
//! attest-policy check policies/ -d output/macaron.db -s schema.yaml --document prov.json -t org/repo
//! ```

pub mod commands;
pub mod output;

pub use commands::{CheckArgs, Cli, Commands, DatalogArgs, ValidateArgs};
pub use output::OutputFormat;

use attest_policy_core::PolicyError;
use std::io::Write;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every policy held
    Success = 0,
    /// At least one policy failed, or the interpreter failed
    PolicyFailed = 1,
    /// Invalid input, policy or schema
    InvalidInput = 2,
    /// Internal error
    InternalError = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            ExitCode::Success
        } else {
            ExitCode::PolicyFailed
        }
    }

    /// Classify an error returned by [`run`]
    pub fn from_error(error: &anyhow::Error) -> Self {
        if let Some(policy_error) = error.downcast_ref::<PolicyError>() {
            if policy_error.is_user_error() || matches!(policy_error, PolicyError::Io(_)) {
                return ExitCode::InvalidInput;
            }
            return ExitCode::InternalError;
        }
        if error.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::InvalidInput;
        }
        ExitCode::InternalError
    }
}

/// Run a parsed command, writing results to `out`
pub fn run<W: Write>(cli: Cli, out: &mut W) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Datalog(args) => commands::execute_datalog(args, out),
        Commands::Validate(args) => commands::execute_validate(args, out),
        Commands::Check(args) => commands::execute_check(args, out),
    }
}

/// Run a parsed command against stdout, reporting errors on stderr
pub fn run_cli(cli: Cli) -> ExitCode {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(cli, &mut out) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from_error(&e)
        }
    }
}
