//! Datalog program fragments
//!
//! A [`DatalogProgram`] holds three deduplicated collections of source lines.
//! Fragments produced per table are merged into one aggregate per evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A Datalog program split into declarations, directives and rules
///
/// Collections are sets, so merging is a union: associative and idempotent.
/// Rendering emits declarations, then directives, then rules, one per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatalogProgram {
    declarations: BTreeSet<String>,
    directives: BTreeSet<String>,
    rules: BTreeSet<String>,
}

impl DatalogProgram {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a program from its three collections
    pub fn from_parts<D, I, R>(declarations: D, directives: I, rules: R) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            declarations: declarations.into_iter().map(Into::into).collect(),
            directives: directives.into_iter().map(Into::into).collect(),
            rules: rules.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a declaration (`.decl`, `.type`)
    pub fn declare(&mut self, declaration: impl Into<String>) -> &mut Self {
        self.declarations.insert(declaration.into());
        self
    }

    /// Add a directive (`.input`, `.output`)
    pub fn direct(&mut self, directive: impl Into<String>) -> &mut Self {
        self.directives.insert(directive.into());
        self
    }

    /// Add a rule or fact
    pub fn rule(&mut self, rule: impl Into<String>) -> &mut Self {
        self.rules.insert(rule.into());
        self
    }

    /// Merge another program into this one in place
    pub fn update(&mut self, other: DatalogProgram) {
        self.declarations.extend(other.declarations);
        self.directives.extend(other.directives);
        self.rules.extend(other.rules);
    }

    /// Return the union of two programs
    pub fn merge(mut self, other: DatalogProgram) -> Self {
        self.update(other);
        self
    }

    pub fn declarations(&self) -> &BTreeSet<String> {
        &self.declarations
    }

    pub fn directives(&self) -> &BTreeSet<String> {
        &self.directives
    }

    pub fn rules(&self) -> &BTreeSet<String> {
        &self.rules
    }

    /// Total number of lines in the program
    pub fn len(&self) -> usize {
        self.declarations.len() + self.directives.len() + self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for DatalogProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self
            .declarations
            .iter()
            .chain(self.directives.iter())
            .chain(self.rules.iter())
            .map(String::as_str)
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl Extend<DatalogProgram> for DatalogProgram {
    fn extend<T: IntoIterator<Item = DatalogProgram>>(&mut self, iter: T) {
        for program in iter {
            self.update(program);
        }
    }
}

impl FromIterator<DatalogProgram> for DatalogProgram {
    fn from_iter<T: IntoIterator<Item = DatalogProgram>>(iter: T) -> Self {
        let mut program = DatalogProgram::new();
        program.extend(iter);
        program
    }
}
