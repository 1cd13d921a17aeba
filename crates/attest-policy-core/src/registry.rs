//! Registry of loaded policies
//!
//! Structural policies are keyed by target repository. Datalog policies are
//! kept in load order and evaluated together against one database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::InterpreterConfig;
use crate::datalog::{DatalogPolicy, PolicyRecord, SchemaMetadata};
use crate::error::{PolicyError, Result};
use crate::structural::{StructuralPolicy, ANY_TARGET};

/// Policies loaded from disk and their Datalog results
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, StructuralPolicy>,
    datalog_policies: Vec<DatalogPolicy>,
    evaluated: bool,
    datalog_passed: bool,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every policy file, skipping those that cannot be loaded
    ///
    /// `.yaml`/`.yml` files are structural policies, `.dl` files are Datalog
    /// policies run with `config`.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], config: &InterpreterConfig) -> Self {
        let mut registry = Self::new();
        for path in paths {
            let path = path.as_ref();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => match StructuralPolicy::from_file(path) {
                    Ok(policy) => registry.add_policy(policy),
                    Err(e) => error!("Cannot load the policy yaml file at {}: {}", path.display(), e),
                },
                Some("dl") => match DatalogPolicy::from_file(path) {
                    Ok(policy) => registry.add_datalog_policy(policy.with_interpreter(config.clone())),
                    Err(e) => error!("Cannot load the Datalog policy at {}: {}", path.display(), e),
                },
                Some("cue") => error!("CUE policies are not supported: {}", path.display()),
                _ => error!("Unsupported policy format: {}", path.display()),
            }
        }
        registry
    }

    /// Register a structural policy under its target, replacing any previous one
    pub fn add_policy(&mut self, policy: StructuralPolicy) {
        self.policies.insert(policy.target.clone(), policy);
    }

    pub fn add_datalog_policy(&mut self, policy: DatalogPolicy) {
        self.datalog_policies.push(policy);
        self.evaluated = false;
    }

    /// Policy for `repo_full_name` (`organization/name`), falling back to `any`
    pub fn policy_for_target(&self, repo_full_name: &str) -> Option<&StructuralPolicy> {
        self.policies
            .get(repo_full_name)
            .or_else(|| self.policies.get(ANY_TARGET))
    }

    pub fn policies(&self) -> impl Iterator<Item = &StructuralPolicy> {
        self.policies.values()
    }

    pub fn datalog_policies(&self) -> &[DatalogPolicy] {
        &self.datalog_policies
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// Evaluate every Datalog policy and return all failed records
    ///
    /// `restrict` limits each policy's verdict to one repository; the
    /// returned records are not filtered.
    pub fn evaluate_datalog_policies(
        &mut self,
        database: &Path,
        metadata: &SchemaMetadata,
        restrict: Option<i64>,
    ) -> Result<Vec<PolicyRecord>> {
        let mut failures = Vec::new();
        let mut all_passed = true;
        for policy in &mut self.datalog_policies {
            all_passed &= policy.evaluate(database, metadata, restrict)?;
            if !policy.failed().is_empty() {
                info!("Failed policy {:?}", policy.failed());
                failures.extend_from_slice(policy.failed());
            }
            if !policy.passed().is_empty() {
                info!("Passed policy {:?}", policy.passed());
            }
        }
        self.evaluated = true;
        self.datalog_passed = all_passed;
        Ok(failures)
    }

    /// Whether every Datalog policy held in the last evaluation
    pub fn datalog_passed(&self) -> Result<bool> {
        if !self.evaluated {
            return Err(PolicyError::NotEvaluated);
        }
        Ok(self.datalog_passed)
    }

    /// Passed and failed records across all Datalog policies
    pub fn datalog_results(&self, repository: Option<i64>) -> Result<(Vec<PolicyRecord>, Vec<PolicyRecord>)> {
        if !self.evaluated {
            return Err(PolicyError::NotEvaluated);
        }

        let keep = |record: &&PolicyRecord| repository.map_or(true, |repo| record.repository == repo);
        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for policy in &self.datalog_policies {
            passed.extend(policy.passed().iter().filter(keep).cloned());
            failed.extend(policy.failed().iter().filter(keep).cloned());
        }
        Ok((passed, failed))
    }
}

/// Collect policy files from a mix of files and directories
///
/// Directory entries are taken one level deep and sorted by name.
pub fn collect_policy_paths<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let mut entries = std::fs::read_dir(input)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.retain(|p| p.is_file());
            entries.sort();
            paths.extend(entries);
        } else {
            paths.push(input.to_path_buf());
        }
    }
    Ok(paths)
}
