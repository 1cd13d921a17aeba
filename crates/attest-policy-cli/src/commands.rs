//! CLI command definitions and execution

use anyhow::Context;
use attest_policy_core::structural::ANY_TARGET;
use attest_policy_core::{
    collect_policy_paths, generated_prelude, DatalogPolicy, InterpreterConfig, PolicyError,
    PolicyRegistry, SchemaFile, SchemaSource, StructuralPolicy,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use super::output::{CheckOutput, DatalogOutput, OutputFormat, ValidationOutput};
use super::ExitCode;

/// Attestation policy engine
///
/// Evaluate Datalog policies over an analysis database and structural
/// policies over attestation documents.
#[derive(Parser, Debug)]
#[command(name = "attest-policy")]
#[command(about = "Evaluate supply-chain policies over analysis facts and attestations", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(short, long, global = true)]
    pub log_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a Datalog policy against an analysis database
    Datalog(DatalogArgs),

    /// Validate a JSON document against a structural YAML policy
    Validate(ValidateArgs),

    /// Load every policy under the given files or directories and evaluate them
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct DatalogArgs {
    /// Analysis database
    #[arg(short, long)]
    pub database: PathBuf,

    /// Schema metadata of the database (JSON or YAML)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Policy file to evaluate
    #[arg(short, long, required_unless_present = "show_prelude")]
    pub file: Option<PathBuf>,

    /// Print the generated prelude and exit
    #[arg(short = 'p', long)]
    pub show_prelude: bool,

    /// Only count failures for this repository
    #[arg(short, long)]
    pub repo: Option<i64>,

    /// Files staged for `#include` by the policy
    #[arg(long = "include")]
    pub includes: Vec<PathBuf>,

    /// Attestation documents as PREFIX:ID:PATH
    #[arg(long = "document")]
    pub documents: Vec<DocumentArg>,

    /// Interpreter binary, overriding config and environment
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Interpreter configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Structural policy (YAML)
    #[arg(short, long)]
    pub policy: PathBuf,

    /// Document to validate (JSON)
    #[arg(short, long)]
    pub document: PathBuf,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Policy files or directories (`.dl`, `.yaml`, `.yml`)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Analysis database, required when Datalog policies are loaded
    #[arg(short, long, requires = "schema")]
    pub database: Option<PathBuf>,

    /// Schema metadata of the database (JSON or YAML)
    #[arg(short, long, requires = "database")]
    pub schema: Option<PathBuf>,

    /// Only count failures for this repository
    #[arg(short, long)]
    pub repo: Option<i64>,

    /// Document validated against the structural policy for `--target`
    #[arg(long = "document")]
    pub document: Option<PathBuf>,

    /// Repository full name (`organization/name`) selecting the structural policy
    #[arg(short, long, default_value = ANY_TARGET)]
    pub target: String,

    /// Interpreter binary, overriding config and environment
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Interpreter configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// A `PREFIX:ID:PATH` document argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArg {
    pub prefix: String,
    pub id: i64,
    pub path: PathBuf,
}

impl FromStr for DocumentArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(id), Some(path)) if !prefix.is_empty() && !path.is_empty() => {
                let id = id
                    .parse()
                    .map_err(|_| format!("document id '{}' is not an integer", id))?;
                Ok(Self {
                    prefix: prefix.to_string(),
                    id,
                    path: PathBuf::from(path),
                })
            }
            _ => Err(format!("expected PREFIX:ID:PATH, got '{}'", s)),
        }
    }
}

/// Interpreter settings: config file or environment, then `--interpreter`
pub fn interpreter_config(
    config: Option<&Path>,
    interpreter: Option<&Path>,
) -> anyhow::Result<InterpreterConfig> {
    let mut resolved = match config {
        Some(path) => InterpreterConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load interpreter config '{}'", path.display()))?,
        None => InterpreterConfig::from_env(),
    };
    if let Some(binary) = interpreter {
        resolved.binary = binary.to_path_buf();
    }
    Ok(resolved)
}

pub fn execute_datalog<W: Write>(args: DatalogArgs, out: &mut W) -> anyhow::Result<ExitCode> {
    let metadata = SchemaFile::new(&args.schema).metadata(&args.database)?;
    let database = std::fs::canonicalize(&args.database)?;

    if args.show_prelude {
        let prelude = generated_prelude(&database, &metadata)?;
        writeln!(out, "{}", prelude)?;
        return Ok(ExitCode::Success);
    }

    let file = args
        .file
        .ok_or_else(|| PolicyError::invalid_policy("no policy file given"))?;
    let config = interpreter_config(args.config.as_deref(), args.interpreter.as_deref())?;
    let mut policy = DatalogPolicy::from_file(&file)?.with_interpreter(config);

    for include in &args.includes {
        let name = include
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PolicyError::invalid_policy(format!("bad include path {}", include.display())))?;
        policy = policy.with_include(name, std::fs::read_to_string(include)?);
    }
    for document in &args.documents {
        let content = std::fs::read_to_string(&document.path)?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(PolicyError::from)?;
        policy = policy.with_document(&document.prefix, document.id, value);
    }

    let passed = policy.evaluate(&database, &metadata, args.repo)?;
    info!("Policy {} evaluated: {}", policy.hash(), passed);

    DatalogOutput::from_policy(&policy, passed).render(args.format, out)?;
    Ok(ExitCode::from_verdict(passed))
}

pub fn execute_validate<W: Write>(args: ValidateArgs, out: &mut W) -> anyhow::Result<ExitCode> {
    let policy = StructuralPolicy::from_file(&args.policy)?;
    let content = std::fs::read_to_string(&args.document)?;
    let document: serde_json::Value = serde_json::from_str(&content).map_err(PolicyError::from)?;

    let passed = policy.validate(&document)?;
    ValidationOutput::from_policy(&policy, passed).render(args.format, out)?;
    Ok(ExitCode::from_verdict(passed))
}

pub fn execute_check<W: Write>(args: CheckArgs, out: &mut W) -> anyhow::Result<ExitCode> {
    let paths = collect_policy_paths(&args.paths)?;
    let config = interpreter_config(args.config.as_deref(), args.interpreter.as_deref())?;
    let mut registry = PolicyRegistry::from_paths(&paths, &config);
    info!(
        files = paths.len(),
        datalog = registry.datalog_policies().len(),
        "Loaded policy registry"
    );

    let mut output = CheckOutput::default();
    if !registry.datalog_policies().is_empty() {
        let (Some(database), Some(schema)) = (&args.database, &args.schema) else {
            return Err(PolicyError::invalid_policy(
                "Datalog policies need --database and --schema",
            )
            .into());
        };
        let metadata = SchemaFile::new(schema).metadata(database)?;
        let database = std::fs::canonicalize(database)?;
        registry.evaluate_datalog_policies(&database, &metadata, args.repo)?;
        let (passed, failed) = registry.datalog_results(args.repo)?;
        output.datalog_passed = Some(registry.datalog_passed()?);
        output.passed_policies = passed;
        output.failed_policies = failed;
    }

    if let Some(path) = &args.document {
        match registry.policy_for_target(&args.target) {
            Some(policy) => {
                let content = std::fs::read_to_string(path)?;
                let document: serde_json::Value =
                    serde_json::from_str(&content).map_err(PolicyError::from)?;
                let passed = policy.validate(&document)?;
                output.validation = Some(ValidationOutput::from_policy(policy, passed));
            }
            None => warn!("No structural policy for target {}", args.target),
        }
    }

    output.render(args.format, out)?;
    Ok(ExitCode::from_verdict(output.passed()))
}
