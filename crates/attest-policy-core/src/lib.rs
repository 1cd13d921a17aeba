//! Attestation Policy Engine
//!
//! Verifies supply-chain policies over analysis results and attestation
//! documents.
//!
//! ## Features
//!
//! - **Schema compilation**: fact tables of the analysis database become
//!   Datalog declarations, SQLite input directives and generic pivots
//! - **JSON facts**: attestation documents become one `json` fact per leaf
//! - **Interpreter wrapper**: scoped runs of an external Datalog interpreter
//!   with CSV output parsing
//! - **Datalog policies**: `passed_policies` / `failed_policies` results per
//!   repository
//! - **Structural policies**: YAML trees matched directly against JSON
//!
//! ## Example
//!
//! ```rust,no_run
//! use attest_policy_core::{DatalogPolicy, InterpreterConfig, SchemaFile, SchemaSource};
//! use std::path::Path;
//!
//! fn main() -> attest_policy_core::Result<()> {
//!     let database = Path::new("output/macaron.db");
//!     let metadata = SchemaFile::new("schema.yaml").metadata(database)?;
//!
//!     let mut policy = DatalogPolicy::from_file("policy.dl")?
//!         .with_interpreter(InterpreterConfig::from_env());
//!     let ok = policy.evaluate(database, &metadata, Some(1))?;
//!     println!("repository 1 passed: {}", ok);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod datalog;
pub mod error;
pub mod registry;
pub mod schema_source;
pub mod structural;

pub use config::{InterpreterConfig, DEFAULT_INTERPRETER, INTERPRETER_ENV_VAR};
pub use datalog::{
    generated_prelude, DatalogInterpreter, DatalogPolicy, DatalogProgram, PolicyRecord,
    RelationOutput, SchemaMetadata,
};
pub use error::{PolicyError, Result};
pub use registry::{collect_policy_paths, PolicyRegistry};
pub use schema_source::{SchemaFile, SchemaSource, StaticSchema};
pub use structural::{PolicyNode, StructuralPolicy};

/// Engine version (from Cargo.toml)
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
