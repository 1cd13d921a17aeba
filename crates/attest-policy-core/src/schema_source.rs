//! Schema metadata sources
//!
//! The analysis database and its schema are owned elsewhere. A
//! [`SchemaSource`] hands the schema compiler the table metadata for a given
//! database file, either from memory or from a JSON/YAML description.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::datalog::SchemaMetadata;
use crate::error::{PolicyError, Result};

/// Supplies table metadata for an on-disk database
///
/// Implementations must fail with [`PolicyError::Schema`] when the database
/// file cannot be found, so no interpreter is spawned against a missing file.
#[cfg_attr(test, mockall::automock)]
pub trait SchemaSource: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Metadata describing the tables in `database`
    fn metadata(&self, database: &Path) -> Result<SchemaMetadata>;
}

/// Fail unless `database` names an existing regular file
pub fn ensure_database(database: &Path) -> Result<()> {
    if database.is_file() {
        Ok(())
    } else {
        Err(PolicyError::schema(format!(
            "Unable to open database {}",
            database.display()
        )))
    }
}

/// Metadata held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    metadata: SchemaMetadata,
}

impl StaticSchema {
    pub fn new(metadata: SchemaMetadata) -> Self {
        Self { metadata }
    }
}

impl SchemaSource for StaticSchema {
    fn name(&self) -> &str {
        "static"
    }

    fn metadata(&self, database: &Path) -> Result<SchemaMetadata> {
        ensure_database(database)?;
        Ok(self.metadata.clone())
    }
}

/// Metadata read from a JSON or YAML file, chosen by extension
#[derive(Debug, Clone)]
pub struct SchemaFile {
    path: PathBuf,
}

impl SchemaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file without checking any database
    pub fn load(&self) -> Result<SchemaMetadata> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PolicyError::schema(format!(
                "Cannot read schema file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let metadata: SchemaMetadata = match extension {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            other => {
                return Err(PolicyError::schema(format!(
                    "Unsupported schema file extension '{}' for {}",
                    other,
                    self.path.display()
                )))
            }
        };

        debug!(
            path = %self.path.display(),
            tables = metadata.tables.len(),
            "Loaded schema metadata"
        );
        Ok(metadata)
    }
}

impl SchemaSource for SchemaFile {
    fn name(&self) -> &str {
        "file"
    }

    fn metadata(&self, database: &Path) -> Result<SchemaMetadata> {
        ensure_database(database)?;
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::{ColumnMetadata, TableMetadata};
    use std::fs;

    fn metadata() -> SchemaMetadata {
        SchemaMetadata::new(vec![TableMetadata::new("_check_result")
            .with_column(ColumnMetadata::new("id", "INTEGER").primary())])
    }

    #[test]
    fn test_missing_database_is_schema_error() {
        let source = StaticSchema::new(metadata());
        let err = source.metadata(Path::new("/nonexistent/output.db")).unwrap_err();
        assert!(matches!(err, PolicyError::Schema(_)));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_static_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("output.db");
        fs::write(&db, b"").unwrap();

        assert_eq!(StaticSchema::new(metadata()).metadata(&db).unwrap(), metadata());
    }

    #[test]
    fn test_schema_file_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("output.db");
        fs::write(&db, b"").unwrap();

        let json_path = dir.path().join("schema.json");
        fs::write(&json_path, serde_json::to_string(&metadata()).unwrap()).unwrap();
        assert_eq!(SchemaFile::new(&json_path).metadata(&db).unwrap(), metadata());

        let yaml_path = dir.path().join("schema.yml");
        fs::write(&yaml_path, serde_yaml::to_string(&metadata()).unwrap()).unwrap();
        assert_eq!(SchemaFile::new(&yaml_path).metadata(&db).unwrap(), metadata());
    }

    #[test]
    fn test_schema_file_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.xml");
        fs::write(&path, "<tables/>").unwrap();

        assert!(matches!(SchemaFile::new(&path).load(), Err(PolicyError::Schema(_))));
    }

    #[test]
    fn test_mock_source() {
        let mut source = MockSchemaSource::new();
        source
            .expect_metadata()
            .withf(|db: &Path| db == Path::new("/data/output.db"))
            .times(1)
            .returning(|_| Ok(metadata()));

        let tables = source.metadata(Path::new("/data/output.db")).unwrap().tables;
        assert_eq!(tables[0].name, "_check_result");
    }
}
