//! Datalog policies evaluated against an analysis database
//!
//! A policy is raw Datalog text. Evaluation prepends the companion prelude,
//! the schema-generated program and any attached document facts, runs the
//! result through one fresh [`DatalogInterpreter`] and reads back the
//! `passed_policies` and `failed_policies` relations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

use super::interpreter::{absolute, DatalogInterpreter, RelationOutput};
use super::json_facts::document_program;
use super::schema::{generated_prelude, SchemaMetadata};
use super::{JSON_PRELUDE, VALUE_PRELUDE};
use crate::config::InterpreterConfig;
use crate::error::{PolicyError, Result};

/// Relation holding policies that held for a repository
pub const PASSED_POLICIES_RELATION: &str = "passed_policies";

/// Relation holding policies that failed for a repository
pub const FAILED_POLICIES_RELATION: &str = "failed_policies";

/// One row of `passed_policies` or `failed_policies`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy: String,
    pub repository: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyRecord {
    pub fn new(policy: impl Into<String>, repository: i64, reason: Option<String>) -> Self {
        Self {
            policy: policy.into(),
            repository,
            reason,
        }
    }

    /// Parse `[policy, repository]` or `[policy, repository, reason]`
    pub fn from_row(row: &[String]) -> Result<Self> {
        match row {
            [policy, repository] | [policy, repository, _] => {
                let repository = repository.trim().parse::<i64>().map_err(|_| {
                    PolicyError::MalformedResult(format!(
                        "repository id '{}' is not an integer",
                        repository
                    ))
                })?;
                Ok(Self {
                    policy: policy.clone(),
                    repository,
                    reason: row.get(2).cloned(),
                })
            }
            _ => Err(PolicyError::MalformedResult(format!(
                "expected 2 or 3 columns, got {}",
                row.len()
            ))),
        }
    }
}

impl fmt::Display for PolicyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (repository {})", self.policy, self.repository)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

/// An attestation document whose facts are merged into the program
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedDocument {
    pub prefix: String,
    pub id: i64,
    pub document: serde_json::Value,
}

/// A Datalog policy and the results of its last evaluation
#[derive(Debug, Clone)]
pub struct DatalogPolicy {
    text: String,
    hash: String,
    config: InterpreterConfig,
    documents: Vec<AttachedDocument>,
    includes: Vec<(String, String)>,
    relations: RelationOutput,
    passed: Vec<PolicyRecord>,
    failed: Vec<PolicyRecord>,
    evaluated: bool,
}

impl DatalogPolicy {
    /// Create a policy from Datalog source text
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self {
            text,
            hash,
            config: InterpreterConfig::default(),
            documents: Vec::new(),
            includes: Vec::new(),
            relations: RelationOutput::new(),
            passed: Vec::new(),
            failed: Vec::new(),
            evaluated: false,
        }
    }

    /// Load a policy from a `.dl` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading Datalog policy from {}", path.display());
        Ok(Self::new(std::fs::read_to_string(path)?))
    }

    /// Use `config` for every interpreter this policy spawns
    pub fn with_interpreter(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a JSON document encoded as `json("<prefix>", <id>, ...)` facts
    pub fn with_document(mut self, prefix: impl Into<String>, id: i64, document: serde_json::Value) -> Self {
        self.documents.push(AttachedDocument {
            prefix: prefix.into(),
            id,
            document,
        });
        self
    }

    /// Stage `text` as `<filename>` in the include directory of every run
    pub fn with_include(mut self, filename: impl Into<String>, text: impl Into<String>) -> Self {
        self.includes.push((filename.into(), text.into()));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the policy text, hex encoded
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn documents(&self) -> &[AttachedDocument] {
        &self.documents
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// Every relation written by the last successful run
    pub fn relations(&self) -> &RelationOutput {
        &self.relations
    }

    pub fn passed(&self) -> &[PolicyRecord] {
        &self.passed
    }

    pub fn failed(&self) -> &[PolicyRecord] {
        &self.failed
    }

    /// Complete program source submitted to the interpreter
    pub fn program_text(&self, database: &Path, metadata: &SchemaMetadata) -> Result<String> {
        let database = absolute(database)?;
        let mut generated = generated_prelude(&database, metadata)?;
        for attached in &self.documents {
            generated.update(document_program(&attached.document, &attached.prefix, attached.id));
        }
        debug!(lines = generated.len(), "Generated policy program");

        Ok(format!(
            "{}\n{}\n{}\n{}\n",
            VALUE_PRELUDE, JSON_PRELUDE, generated, self.text
        ))
    }

    /// Evaluate the policy against `database`
    ///
    /// Returns `true` when no failed record exists, restricted to `repository`
    /// when given. A repository with no result rows at all also yields `true`.
    /// Interpreter failures are logged and reported as `false`; schema
    /// compilation errors are returned.
    pub fn evaluate(
        &mut self,
        database: &Path,
        metadata: &SchemaMetadata,
        repository: Option<i64>,
    ) -> Result<bool> {
        let source = self.program_text(database, metadata)?;

        self.relations.clear();
        self.passed.clear();
        self.failed.clear();
        self.evaluated = true;

        let relations = match self.run(&source) {
            Ok(relations) => relations,
            Err(e) => {
                error!("Policy {} could not be evaluated: {}", self.hash, e);
                return Ok(false);
            }
        };

        match (
            parse_records(&relations, PASSED_POLICIES_RELATION),
            parse_records(&relations, FAILED_POLICIES_RELATION),
        ) {
            (Ok(passed), Ok(failed)) => {
                self.passed = passed;
                self.failed = failed;
                self.relations = relations;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Policy {} produced unusable output: {}", self.hash, e);
                return Ok(false);
            }
        }

        debug!(
            passed = self.passed.len(),
            failed = self.failed.len(),
            "Policy evaluated"
        );

        Ok(!self
            .failed
            .iter()
            .any(|record| repository.map_or(true, |repo| record.repository == repo)))
    }

    /// Passed and failed records for one repository
    pub fn result_for_repo(&self, repository: i64) -> Result<(Vec<PolicyRecord>, Vec<PolicyRecord>)> {
        if !self.evaluated {
            return Err(PolicyError::NotEvaluated);
        }

        let keep = |records: &[PolicyRecord]| {
            records
                .iter()
                .filter(|record| record.repository == repository)
                .cloned()
                .collect::<Vec<_>>()
        };
        Ok((keep(&self.passed), keep(&self.failed)))
    }

    fn run(&self, source: &str) -> Result<RelationOutput> {
        let interpreter = DatalogInterpreter::new(&self.config)?;
        for (filename, text) in &self.includes {
            interpreter.stage_include(filename, text)?;
        }
        interpreter.interpret_text(source)
    }
}

impl fmt::Display for DatalogPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatalogPolicy({})", self.hash)
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn parse_records(relations: &RelationOutput, relation: &str) -> Result<Vec<PolicyRecord>> {
    relations
        .get(relation)
        .map(|rows| rows.iter().map(|row| PolicyRecord::from_row(row)).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}
