//! Error types for the document type engine

use thiserror::Error;

use crate::diagnostics::CompilationReport;
use crate::expr::EvalError;
use crate::schema::{SchemaKey, ValidationRule};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Document type engine errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema {schema} declares no fields")]
    EmptyFieldList { schema: SchemaKey },

    #[error("Schema {schema}: field '{field}' has unknown type '{type_name}'")]
    UnknownFieldType {
        schema: SchemaKey,
        field: String,
        type_name: String,
    },

    #[error("Schema {schema}: '{field}' is not a valid field name")]
    InvalidFieldName { schema: SchemaKey, field: String },

    #[error("Schema {schema}: field '{field}' is declared more than once")]
    DuplicateField { schema: SchemaKey, field: String },

    #[error("{0}")]
    Compilation(CompilationReport),

    #[error("Expression backend failed on {target}: {message}")]
    Backend { target: String, message: String },

    #[error("Binding mismatch: expected {expected}, got {actual}")]
    BindingMismatch { expected: String, actual: String },

    #[error("Auxiliary context '{name}': expected {expected}, got {actual}")]
    AuxContextMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Validation rule '{}' failed to evaluate: {source}", .rule.key)]
    ValidationFailed {
        rule: ValidationRule,
        #[source]
        source: EvalError,
    },

    #[error("Formula for field '{field}' failed to evaluate: {source}")]
    FormulaFailed {
        field: String,
        #[source]
        source: EvalError,
    },

    #[error("Document {document} has no body container")]
    MissingBody { document: String },

    #[error("Codec error ({encoding}): {message}")]
    Codec { encoding: String, message: String },

    #[error("Field '{field}': {reason}")]
    FieldAccess { field: String, reason: String },

    #[error("Type generation failed: {0}")]
    TypeGeneration(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl SchemaError {
    /// Whether this error was caused by the schema definition itself
    /// (as opposed to a runtime or binding failure).
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            SchemaError::EmptyFieldList { .. }
                | SchemaError::UnknownFieldType { .. }
                | SchemaError::InvalidFieldName { .. }
                | SchemaError::DuplicateField { .. }
                | SchemaError::Compilation(_)
        )
    }

    /// The compilation report, if this is an aggregated compilation failure.
    pub fn compilation_report(&self) -> Option<&CompilationReport> {
        match self {
            SchemaError::Compilation(report) => Some(report),
            _ => None,
        }
    }
}
