//! Compiled structural policy tree

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::fmt;
use tracing::debug;

use crate::error::{PolicyError, Result};

/// One step into a JSON document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => write!(f, "{}", key),
            PathStep::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Dotted form used in validation logs, e.g. `subject.0.name`
pub fn path_to_string(path: &[PathStep]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Expected value of a literal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// A node of a compiled structural policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum PolicyNode {
    /// The value at `path` must equal `value`
    Literal { path: Vec<PathStep>, value: Scalar },
    /// Every child must hold
    AllOf { children: Vec<PolicyNode> },
    /// The value at `path` must be missing or falsy
    Absent { path: Vec<PathStep> },
}

impl PolicyNode {
    /// Number of literal and absence checks in the tree
    pub fn check_count(&self) -> usize {
        match self {
            PolicyNode::Literal { .. } | PolicyNode::Absent { .. } => 1,
            PolicyNode::AllOf { children } => children.iter().map(PolicyNode::check_count).sum(),
        }
    }
}

/// Compile a policy definition rooted at the document root
pub fn compile(definition: &YamlValue) -> Result<PolicyNode> {
    compile_at(definition, &mut Vec::new())
}

fn compile_at(definition: &YamlValue, path: &mut Vec<PathStep>) -> Result<PolicyNode> {
    let indent = "\t".repeat(path.len());
    match definition {
        YamlValue::Null => {
            debug!("{}Absent(path={})", indent, path_to_string(path));
            Ok(PolicyNode::Absent { path: path.clone() })
        }
        YamlValue::Bool(_) | YamlValue::Number(_) | YamlValue::String(_) => {
            let value = scalar(definition)?;
            debug!("{}Literal(value={}, path={})", indent, value, path_to_string(path));
            Ok(PolicyNode::Literal {
                path: path.clone(),
                value,
            })
        }
        YamlValue::Sequence(items) => {
            debug!("{}AllOf(list, path={})", indent, path_to_string(path));
            let mut children = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(PathStep::Index(index));
                let child = compile_at(item, path);
                path.pop();
                children.push(child?);
            }
            Ok(PolicyNode::AllOf { children })
        }
        YamlValue::Mapping(entries) => {
            debug!("{}AllOf(map, path={})", indent, path_to_string(path));
            let mut children = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let YamlValue::String(key) = key else {
                    return Err(PolicyError::invalid_policy(format!(
                        "mapping key {:?} at '{}' is not a string",
                        key,
                        path_to_string(path)
                    )));
                };
                path.push(PathStep::Key(key.clone()));
                let child = compile_at(value, path);
                path.pop();
                children.push(child?);
            }
            Ok(PolicyNode::AllOf { children })
        }
        YamlValue::Tagged(tagged) => Err(PolicyError::invalid_policy(format!(
            "no support for tagged value {} at '{}'",
            tagged.tag,
            path_to_string(path)
        ))),
    }
}

fn scalar(value: &YamlValue) -> Result<Scalar> {
    match value {
        YamlValue::Bool(b) => Ok(Scalar::Bool(*b)),
        YamlValue::String(s) => Ok(Scalar::String(s.clone())),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::Int(i))
            } else if let Some(x) = n.as_f64() {
                Ok(Scalar::Float(x))
            } else {
                Err(PolicyError::invalid_policy(format!("unrepresentable number {}", n)))
            }
        }
        other => Err(PolicyError::invalid_policy(format!(
            "expected a scalar, got {:?}",
            other
        ))),
    }
}
