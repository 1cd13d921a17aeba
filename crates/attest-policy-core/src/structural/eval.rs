//! Evaluation of compiled structural policies against JSON documents

use serde_json::Value;
use tracing::{error, info};

use super::ast::{path_to_string, PathStep, PolicyNode, Scalar};

/// Look up `path` in `document`, `None` when any step does not resolve
pub fn lookup<'a>(document: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    path.iter().try_fold(document, |current, step| match (step, current) {
        (PathStep::Key(key), Value::Object(fields)) => fields.get(key),
        (PathStep::Index(index), Value::Array(items)) => items.get(*index),
        _ => None,
    })
}

/// Whether a looked-up value counts as absent
///
/// Missing values, `null`, `false`, zero, the empty string and empty
/// containers are all treated alike.
pub fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
    }
}

/// Exact equality between a policy literal and a document value
///
/// Integers and floats compare by numeric value. Booleans only equal
/// booleans.
pub fn scalar_matches(expected: &Scalar, actual: Option<&Value>) -> bool {
    match (expected, actual) {
        (Scalar::Bool(e), Some(Value::Bool(a))) => e == a,
        (Scalar::String(e), Some(Value::String(a))) => e == a,
        (Scalar::Int(e), Some(Value::Number(a))) => match a.as_i64() {
            Some(a) => a == *e,
            None => a.as_f64() == Some(*e as f64),
        },
        (Scalar::Float(e), Some(Value::Number(a))) => a.as_f64() == Some(*e),
        _ => false,
    }
}

/// Evaluate `node` against `document`
///
/// Literal nodes log every comparison. Evaluation of an `AllOf` stops at
/// the first child that does not hold.
pub fn evaluate(node: &PolicyNode, document: &Value) -> bool {
    match node {
        PolicyNode::Literal { path, value } => {
            let actual = lookup(document, path);
            if !scalar_matches(value, actual) {
                let got = actual.map_or_else(|| "nothing".to_string(), |v| v.to_string());
                error!("{}: expected {}, got {}", path_to_string(path), value, got);
                return false;
            }
            info!("{}: validation successful.", path_to_string(path));
            true
        }
        PolicyNode::AllOf { children } => children.iter().all(|child| evaluate(child, document)),
        PolicyNode::Absent { path } => is_falsy(lookup(document, path)),
    }
}
