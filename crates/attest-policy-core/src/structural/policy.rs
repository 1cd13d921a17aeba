//! Structural policies loaded from YAML documents

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{error, info};

use super::ast::{compile, PolicyNode};
use super::eval::evaluate;
use crate::error::{PolicyError, Result};

/// Target matching every repository
pub const ANY_TARGET: &str = "any";

fn default_target() -> String {
    ANY_TARGET.to_string()
}

/// `metadata` section of a policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_target")]
    pub target: String,
}

/// A policy document as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub metadata: PolicyMetadata,
    #[serde(default)]
    pub definition: serde_yaml::Value,
}

/// A structural policy with its compiled tree
///
/// The tree holds no per-call state, so one policy may validate many
/// documents, including from several threads at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralPolicy {
    pub id: String,
    pub description: String,
    pub target: String,
    root: Option<PolicyNode>,
}

impl StructuralPolicy {
    /// An uncompiled policy
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            target: default_target(),
            root: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Compile `definition`, replacing any previously compiled tree
    pub fn compile(&mut self, definition: &serde_yaml::Value) -> Result<()> {
        info!("Parsing the policy definition of Policy {}", self.id);
        self.root = Some(compile(definition)?);
        Ok(())
    }

    /// Build and compile a policy from a parsed document
    pub fn from_document(document: PolicyDocument) -> Result<Self> {
        let mut policy = Self::new(document.metadata.id, document.metadata.description)
            .with_target(document.metadata.target);
        if let Err(e) = policy.compile(&document.definition) {
            error!("Cannot parse the policy definition for {} - {}", policy, e);
            return Err(e);
        }
        info!("Successfully loaded {}", policy);
        Ok(policy)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_document(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Generating a policy from file {}", path.display());
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// The compiled tree, `None` before a successful compile
    pub fn root(&self) -> Option<&PolicyNode> {
        self.root.as_ref()
    }

    /// Validate a JSON document against the compiled tree
    pub fn validate(&self, document: &serde_json::Value) -> Result<bool> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| PolicyError::PolicyNotCompiled(self.id.clone()))?;
        Ok(evaluate(root, document))
    }
}

impl fmt::Display for StructuralPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Policy(id='{}', description='{}')", self.id, self.description)
    }
}
