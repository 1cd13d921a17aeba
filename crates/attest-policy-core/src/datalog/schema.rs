//! Schema compilation
//!
//! Compiles relational table metadata into Datalog declarations, SQLite input
//! directives and generic pivot rules. Only fact tables (names starting with
//! [`FACT_TABLE_MARKER`]) are imported; their Datalog relation drops the marker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use super::program::DatalogProgram;
use crate::error::{PolicyError, Result};

/// Prefix marking a table as an importable fact table
pub const FACT_TABLE_MARKER: char = '_';

/// Generic relation produced by [`attribute_pivot`]
pub const REPOSITORY_ATTRIBUTE_RELATION: &str = "repository_attribute";

/// Relation listing every fact table by name
pub const CHECK_NAME_RELATION: &str = "check_name";

/// Column holding the repository foreign key
pub const REPOSITORY_ID_COLUMN: &str = "repository_id";

/// Column holding the check identifier
pub const CHECK_ID_COLUMN: &str = "check_id";

/// Column holding the row primary key
pub const ROW_ID_COLUMN: &str = "id";

/// Sentinel excluded from symbol-valued attributes
pub const NOT_APPLICABLE: &str = "n/a";

const META_COLUMNS: [&str; 3] = [REPOSITORY_ID_COLUMN, CHECK_ID_COLUMN, ROW_ID_COLUMN];

/// SQL-level column type as reported by the schema owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SqlType {
    Integer,
    String,
    Text,
    Boolean,
    /// Any type with no Datalog mapping
    Other(String),
}

impl From<String> for SqlType {
    fn from(name: String) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        let base = lowered.split('(').next().unwrap_or_default().trim();
        match base {
            "integer" | "int" | "bigint" | "smallint" => SqlType::Integer,
            "string" | "varchar" | "char" => SqlType::String,
            "text" => SqlType::Text,
            "boolean" | "bool" => SqlType::Boolean,
            _ => SqlType::Other(name),
        }
    }
}

impl From<&str> for SqlType {
    fn from(name: &str) -> Self {
        SqlType::from(name.to_string())
    }
}

impl From<SqlType> for String {
    fn from(sql_type: SqlType) -> Self {
        sql_type.to_string()
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::String => write!(f, "VARCHAR"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Datalog attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatalogType {
    Number,
    Symbol,
}

impl fmt::Display for DatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatalogType::Number => write!(f, "number"),
            DatalogType::Symbol => write!(f, "symbol"),
        }
    }
}

/// Metadata for a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, sql_type: impl Into<SqlType>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
        }
    }

    /// Mark this column as part of the primary key
    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Metadata for a single table, columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column
    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Whether the table is importable into Datalog
    pub fn is_fact_table(&self) -> bool {
        self.name.starts_with(FACT_TABLE_MARKER)
    }

    /// Name of the Datalog relation backing this table
    pub fn relation_name(&self) -> &str {
        self.name
            .strip_prefix(FACT_TABLE_MARKER)
            .unwrap_or(&self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary-key columns, in declaration order
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Metadata for a whole database schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableMetadata>,
}

impl SchemaMetadata {
    pub fn new(tables: Vec<TableMetadata>) -> Self {
        Self { tables }
    }

    /// Tables importable into Datalog
    pub fn fact_tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.iter().filter(|t| t.is_fact_table())
    }
}

/// Map a column to its Datalog type
pub fn column_type(table: &str, column: &ColumnMetadata) -> Result<DatalogType> {
    match column.sql_type {
        SqlType::Integer | SqlType::Boolean => Ok(DatalogType::Number),
        SqlType::String | SqlType::Text => Ok(DatalogType::Symbol),
        SqlType::Other(ref name) => Err(PolicyError::UnsupportedColumnType {
            table: table.to_string(),
            column: column.name.clone(),
            sql_type: name.clone(),
        }),
    }
}

/// `Value` ADT constructor wrapping a column of this type
fn value_constructor(table: &str, column: &ColumnMetadata) -> Result<&'static str> {
    match column.sql_type {
        SqlType::Integer => Ok("$Int"),
        SqlType::Boolean => Ok("$Bool"),
        SqlType::String | SqlType::Text => Ok("$String"),
        SqlType::Other(ref name) => Err(PolicyError::UnsupportedColumnType {
            table: table.to_string(),
            column: column.name.clone(),
            sql_type: name.clone(),
        }),
    }
}

/// Declaration for a fact table, `None` for tables without the marker
pub fn declare_table(table: &TableMetadata) -> Result<Option<String>> {
    if !table.is_fact_table() {
        return Ok(None);
    }

    let columns = table
        .columns
        .iter()
        .map(|col| Ok(format!("{}:{}", col.name, column_type(&table.name, col)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(format!(
        ".decl {} ({})",
        table.relation_name(),
        columns.join(", ")
    )))
}

/// Declarations and SQLite input directives for every fact table
pub fn import_prelude(database_path: &Path, metadata: &SchemaMetadata) -> Result<DatalogProgram> {
    let mut program = DatalogProgram::new();
    for table in metadata.fact_tables() {
        if let Some(declaration) = declare_table(table)? {
            program.declare(declaration);
        }
        program.direct(format!(
            ".input {} (IO=sqlite, filename=\"{}\")",
            table.relation_name(),
            database_path.display()
        ));
    }
    debug!(
        tables = program.directives().len(),
        "Generated import prelude"
    );
    Ok(program)
}

/// Project every check table column into `repository_attribute`
///
/// Each non-meta column of a fact table whose name contains `check` yields
/// one rule binding `(repository, "<table>.<column>", wrapped value)`.
/// Symbol columns skip the `"n/a"` sentinel. Every fact table also gets a
/// `check_name` fact.
pub fn attribute_pivot(metadata: &SchemaMetadata) -> Result<DatalogProgram> {
    let mut program = DatalogProgram::new();
    program.declare(format!(
        ".decl {}(repository:number, attribute:symbol, value:Value)",
        REPOSITORY_ATTRIBUTE_RELATION
    ));
    program.declare(format!(".decl {}(check:symbol)", CHECK_NAME_RELATION));

    for table in metadata.fact_tables() {
        let relation = table.relation_name();
        program.rule(format!("{}(\"{}\").", CHECK_NAME_RELATION, relation));

        if !table.name.contains("check") {
            continue;
        }
        if table.column(REPOSITORY_ID_COLUMN).is_none() {
            debug!(table = %table.name, "Skipping check table without a repository column");
            continue;
        }

        for column in &table.columns {
            if META_COLUMNS.contains(&column.name.as_str()) {
                continue;
            }

            let pattern: Vec<&str> = table
                .columns
                .iter()
                .map(|col| {
                    if col.name == column.name {
                        "value"
                    } else if col.name == REPOSITORY_ID_COLUMN {
                        "repository"
                    } else {
                        "_"
                    }
                })
                .collect();

            let mut rule = format!(
                "{}(repository, \"{}.{}\", {}(value)) :- {}({})",
                REPOSITORY_ATTRIBUTE_RELATION,
                relation,
                column.name,
                value_constructor(&table.name, column)?,
                relation,
                pattern.join(", ")
            );
            if column_type(&table.name, column)? == DatalogType::Symbol {
                rule.push_str(&format!(", value != \"{}\"", NOT_APPLICABLE));
            }
            rule.push('.');
            program.rule(rule);
        }
    }

    Ok(program)
}

/// Transpose a table into `relation(keys..., key, value)` tuples
///
/// One rule per column that is neither a key nor ignored binds that column's
/// name and wrapped value; all other columns are wildcards.
pub fn table_to_keyed_pivot(
    relation_name: &str,
    table: &TableMetadata,
    key_columns: &[&str],
    ignored_columns: &[&str],
) -> Result<DatalogProgram> {
    let mut key_decls = Vec::with_capacity(key_columns.len());
    for key in key_columns {
        let column = table.column(key).ok_or_else(|| {
            PolicyError::schema(format!("Key column '{}' not found in table {}", key, table.name))
        })?;
        key_decls.push(format!("{}:{}", key, column_type(&table.name, column)?));
    }

    let mut program = DatalogProgram::new();
    program.declare(format!(
        ".decl {}({}, key:symbol, value:Value)",
        relation_name,
        key_decls.join(", ")
    ));

    for column in &table.columns {
        let name = column.name.as_str();
        if key_columns.contains(&name) || ignored_columns.contains(&name) {
            continue;
        }

        let pattern: Vec<&str> = table
            .columns
            .iter()
            .map(|col| {
                if col.name == name {
                    "value"
                } else if key_columns.contains(&col.name.as_str()) {
                    col.name.as_str()
                } else {
                    "_"
                }
            })
            .collect();

        program.rule(format!(
            "{}({}, \"{}\", {}(value)) :- {}({}).",
            relation_name,
            key_columns.join(", "),
            name,
            value_constructor(&table.name, column)?,
            table.relation_name(),
            pattern.join(", ")
        ));
    }

    Ok(program)
}

/// Full generated prelude for a database
///
/// Import prelude, attribute pivot, and a `<table>_attribute` keyed pivot for
/// every fact table with a primary key.
pub fn generated_prelude(database_path: &Path, metadata: &SchemaMetadata) -> Result<DatalogProgram> {
    let mut program = import_prelude(database_path, metadata)?;
    program.update(attribute_pivot(metadata)?);

    for table in metadata.fact_tables() {
        let keys = table.primary_key_columns();
        if keys.is_empty() {
            continue;
        }
        let relation = format!("{}_attribute", table.relation_name());
        program.update(table_to_keyed_pivot(&relation, table, &keys, &[])?);
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_table() -> TableMetadata {
        TableMetadata::new("_build_as_code_check")
            .with_column(ColumnMetadata::new("id", "INTEGER").primary())
            .with_column(ColumnMetadata::new("repository_id", "INTEGER"))
            .with_column(ColumnMetadata::new("check_id", "VARCHAR"))
            .with_column(ColumnMetadata::new("passed", "BOOLEAN"))
            .with_column(ColumnMetadata::new("build_tool", "TEXT"))
    }

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(
            column_type("t", &ColumnMetadata::new("a", "INTEGER")).unwrap(),
            DatalogType::Number
        );
        assert_eq!(
            column_type("t", &ColumnMetadata::new("a", "VARCHAR(255)")).unwrap(),
            DatalogType::Symbol
        );
        assert_eq!(
            column_type("t", &ColumnMetadata::new("a", "text")).unwrap(),
            DatalogType::Symbol
        );
        assert_eq!(
            column_type("t", &ColumnMetadata::new("a", "BOOLEAN")).unwrap(),
            DatalogType::Number
        );
    }

    #[test]
    fn test_unsupported_type_fails_whole_table() {
        let table = TableMetadata::new("_dated")
            .with_column(ColumnMetadata::new("id", "INTEGER"))
            .with_column(ColumnMetadata::new("created", "DATETIME"));

        let err = declare_table(&table).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::UnsupportedColumnType { ref column, .. } if column == "created"
        ));

        let metadata = SchemaMetadata::new(vec![check_table(), table]);
        assert!(import_prelude(Path::new("/tmp/db"), &metadata).is_err());
    }

    #[test]
    fn test_declare_table() {
        assert_eq!(
            declare_table(&check_table()).unwrap().unwrap(),
            ".decl build_as_code_check (id:number, repository_id:number, check_id:symbol, passed:number, build_tool:symbol)"
        );
        assert!(declare_table(&TableMetadata::new("repository")).unwrap().is_none());
    }

    #[test]
    fn test_import_prelude_skips_non_fact_tables() {
        let metadata = SchemaMetadata::new(vec![
            check_table(),
            TableMetadata::new("analysis").with_column(ColumnMetadata::new("id", "INTEGER")),
        ]);
        let program = import_prelude(Path::new("/data/output.db"), &metadata).unwrap();

        assert_eq!(program.declarations().len(), 1);
        assert_eq!(
            program.directives().iter().next().unwrap(),
            ".input build_as_code_check (IO=sqlite, filename=\"/data/output.db\")"
        );
    }

    #[test]
    fn test_attribute_pivot_rules() {
        let metadata = SchemaMetadata::new(vec![check_table()]);
        let program = attribute_pivot(&metadata).unwrap();

        assert!(program.rules().contains(
            "repository_attribute(repository, \"build_as_code_check.passed\", $Bool(value)) :- build_as_code_check(_, repository, _, value, _)."
        ));
        assert!(program.rules().contains(
            "repository_attribute(repository, \"build_as_code_check.build_tool\", $String(value)) :- build_as_code_check(_, repository, _, _, value), value != \"n/a\"."
        ));
        assert!(program.rules().contains("check_name(\"build_as_code_check\")."));
        // two attribute rules plus the check_name fact
        assert_eq!(program.rules().len(), 3);
    }

    #[test]
    fn test_attribute_pivot_ignores_non_check_tables() {
        let table = TableMetadata::new("_provenance")
            .with_column(ColumnMetadata::new("id", "INTEGER"))
            .with_column(ColumnMetadata::new("repository_id", "INTEGER"))
            .with_column(ColumnMetadata::new("payload", "TEXT"));
        let program = attribute_pivot(&SchemaMetadata::new(vec![table])).unwrap();

        assert_eq!(program.rules().len(), 1);
        assert!(program.rules().contains("check_name(\"provenance\")."));
    }

    #[test]
    fn test_keyed_pivot_one_rule_per_column() {
        let program = table_to_keyed_pivot(
            "build_as_code_check_attribute",
            &check_table(),
            &["id"],
            &["check_id"],
        )
        .unwrap();

        assert!(program.declarations().contains(
            ".decl build_as_code_check_attribute(id:number, key:symbol, value:Value)"
        ));
        assert_eq!(program.rules().len(), 3);
        assert!(program.rules().contains(
            "build_as_code_check_attribute(id, \"repository_id\", $Int(value)) :- build_as_code_check(id, value, _, _, _)."
        ));
        assert!(!program.rules().iter().any(|r| r.contains("\"check_id\"")));
        assert!(!program.rules().iter().any(|r| r.contains("\"id\"")));
    }

    #[test]
    fn test_keyed_pivot_missing_key() {
        let err = table_to_keyed_pivot("x", &check_table(), &["missing"], &[]).unwrap_err();
        assert!(matches!(err, PolicyError::Schema(_)));
    }

    #[test]
    fn test_generated_prelude_includes_keyed_pivot() {
        let metadata = SchemaMetadata::new(vec![check_table()]);
        let program = generated_prelude(Path::new("/db"), &metadata).unwrap();
        assert!(program
            .declarations()
            .iter()
            .any(|d| d.starts_with(".decl build_as_code_check_attribute(")));
    }

    #[test]
    fn test_metadata_deserializes_from_yaml() {
        let metadata: SchemaMetadata = serde_yaml::from_str(
            r#"
            tables:
              - name: _check_result
                columns:
                  - { name: id, type: INTEGER, primary_key: true }
                  - { name: passed, type: BOOLEAN }
            "#,
        )
        .unwrap();

        assert_eq!(metadata.tables[0].columns[1].sql_type, SqlType::Boolean);
        assert_eq!(metadata.tables[0].primary_key_columns(), vec!["id"]);
    }
}
