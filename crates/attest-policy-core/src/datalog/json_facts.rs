//! JSON document to Datalog fact encoding
//!
//! Every scalar leaf of a document becomes one `json(prefix, id, literal)`
//! fact. The literal wraps the scalar in `$Object`/`$Array` constructors
//! following the leaf's address: the root step is the innermost wrap and the
//! step closest to the leaf is the outermost. The companion prelude peels the
//! wrappers back off to rebuild `a[1].b` style paths.
//!
//! String escaping is minimal: newlines become `\n` and double quotes become
//! single quotes. Backslashes and other control characters are passed through
//! untouched and may not survive a round trip through the interpreter.

use serde_json::Value;
use std::fmt;

use super::program::DatalogProgram;

/// Relation receiving encoded document leaves
pub const JSON_RELATION: &str = "json";

/// One step in a leaf address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    Key(String),
    Index(usize),
}

/// Address of the value currently being visited, root first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactAddress {
    components: Vec<PathComponent>,
}

impl FactAddress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: PathComponent) {
        self.components.push(component);
    }

    pub fn pop(&mut self) -> Option<PathComponent> {
        self.components.pop()
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Wrap a terminal literal in structural constructors, root innermost
    fn wrap(&self, terminal: String) -> String {
        self.components
            .iter()
            .fold(terminal, |inner, component| match component {
                PathComponent::Key(key) => format!("$Object(\"{}\", {})", escape(key), inner),
                PathComponent::Index(index) => format!("$Array({}, {})", index, inner),
            })
    }
}

impl fmt::Display for FactAddress {
    /// Dotted/bracketed form, matching `json_path` in the prelude
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, component) in self.components.iter().enumerate() {
            match component {
                PathComponent::Key(key) if position == 0 => write!(f, "{}", key)?,
                PathComponent::Key(key) => write!(f, ".{}", key)?,
                PathComponent::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A JSON scalar, matched exhaustively when rendering terminals
#[derive(Debug, Clone, PartialEq)]
pub enum JsonScalar {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl JsonScalar {
    /// Classify a JSON value, `None` for arrays and objects
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(JsonScalar::Null),
            Value::Bool(b) => Some(JsonScalar::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => JsonScalar::Int(i),
                None => JsonScalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Some(JsonScalar::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Terminal ADT literal
    pub fn literal(&self) -> String {
        match self {
            JsonScalar::Int(i) => format!("$Int({})", i),
            JsonScalar::Float(x) => format!("$Float({})", float_literal(*x)),
            JsonScalar::String(s) => format!("$String(\"{}\")", escape(s)),
            JsonScalar::Bool(b) => format!("$Bool({})", u8::from(*b)),
            JsonScalar::Null => "$Null".to_string(),
        }
    }
}

/// Plain `digits.digits` form; the interpreter rejects exponents
fn float_literal(x: f64) -> String {
    let text = x.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn escape(text: &str) -> String {
    text.replace('\n', "\\n").replace('"', "'")
}

/// Encode every scalar leaf under `value` into an address-preserving literal
///
/// `address` is the address of `value` itself; it is restored on return.
pub fn encode_leaves(address: &mut FactAddress, value: &Value) -> Vec<String> {
    let mut literals = Vec::new();
    visit(address, value, &mut literals);
    literals
}

fn visit(address: &mut FactAddress, value: &Value, literals: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                address.push(PathComponent::Index(index));
                visit(address, item, literals);
                address.pop();
            }
        }
        Value::Object(fields) => {
            for (key, field) in fields {
                address.push(PathComponent::Key(key.clone()));
                visit(address, field, literals);
                address.pop();
            }
        }
        scalar => {
            if let Some(scalar) = JsonScalar::from_value(scalar) {
                literals.push(address.wrap(scalar.literal()));
            }
        }
    }
}

/// One `json("<prefix>",<id>,<literal>).` statement per leaf
pub fn encode_document(document: &Value, prefix: &str, id: i64) -> Vec<String> {
    let prefix = escape(prefix);
    encode_leaves(&mut FactAddress::new(), document)
        .into_iter()
        .map(|literal| format!("{}(\"{}\",{},{}).", JSON_RELATION, prefix, id, literal))
        .collect()
}

/// Tab-separated `(prefix, id, literal)` rows for a fact file
pub fn encode_document_as_rows(document: &Value, prefix: &str, id: i64) -> Vec<String> {
    let prefix = escape(prefix);
    encode_leaves(&mut FactAddress::new(), document)
        .into_iter()
        .map(|literal| format!("{}\t{}\t{}", prefix, id, literal))
        .collect()
}

/// Document facts as a program fragment
pub fn document_program(document: &Value, prefix: &str, id: i64) -> DatalogProgram {
    DatalogProgram::from_parts(
        Vec::<String>::new(),
        Vec::<String>::new(),
        encode_document(document, prefix, id),
    )
}
