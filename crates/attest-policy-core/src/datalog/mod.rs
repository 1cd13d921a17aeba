//! Datalog policy path
//!
//! Schema metadata and JSON documents are compiled into Datalog source,
//! run through an external interpreter, and the fixed result relations are
//! parsed back into [`PolicyRecord`]s.

pub mod interpreter;
pub mod json_facts;
pub mod policy;
pub mod program;
pub mod schema;

pub use interpreter::{DatalogInterpreter, RelationOutput, DISCARD_OUTPUT};
pub use json_facts::{
    encode_document, encode_document_as_rows, encode_leaves, FactAddress, JsonScalar, PathComponent,
    JSON_RELATION,
};
pub use policy::{
    AttachedDocument, DatalogPolicy, PolicyRecord, FAILED_POLICIES_RELATION, PASSED_POLICIES_RELATION,
};
pub use program::DatalogProgram;
pub use schema::{
    attribute_pivot, column_type, declare_table, generated_prelude, import_prelude,
    table_to_keyed_pivot, ColumnMetadata, DatalogType, SchemaMetadata, SqlType, TableMetadata,
};

/// `Value` ADT shared by the schema pivots and the JSON encoder
pub const VALUE_PRELUDE: &str = include_str!("../../prelude/value.dl");

/// Path reconstruction rules over `json` leaf facts
pub const JSON_PRELUDE: &str = include_str!("../../prelude/json.dl");

/// File names used when staging the prelude into an include directory
pub const PRELUDE_FILES: [(&str, &str); 2] = [("value.dl", VALUE_PRELUDE), ("json.dl", JSON_PRELUDE)];
