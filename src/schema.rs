//! Schema definitions
//!
//! A schema is the data-described definition of a document type: an ordered
//! field list, ordered validation rules, and optional per-field formulas.
//! Definitions arrive fully materialized (usually deserialized from JSON);
//! nothing in this module compiles or evaluates them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::checksum::Checksum;
use crate::error::Result;
use crate::version::TypeVersion;

/// Stable identity of a schema: `"{type_name}@{version}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaKey(String);

impl SchemaKey {
    /// Combine a type name and version into a key
    pub fn new(type_name: &str, version: &TypeVersion) -> Self {
        Self(format!("{}@{}", type_name, version))
    }

    /// Get the key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single field of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name, must be a valid identifier
    pub name: String,
    /// Vocabulary type name (case-insensitive, e.g. "string", "list<int>")
    #[serde(rename = "type")]
    pub type_name: String,
    /// Marks the field as holding sensitive data
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,
    /// Opaque mapping metadata, passed through to the value type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<serde_json::Value>,
    /// Formula computing this field's value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl FieldDefinition {
    /// Create a plain field
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            sensitive: false,
            mapping: None,
            formula: None,
        }
    }

    /// Mark the field as sensitive
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Attach mapping metadata
    pub fn with_mapping(mut self, mapping: serde_json::Value) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Attach a formula
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// The formula text, if it is present and not blank
    pub fn formula_source(&self) -> Option<&str> {
        self.formula
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A named boolean rule a valid body must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Diagnostic identifier
    pub key: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Rule source, wrapped in `{ ... }`
    pub source: String,
}

impl ValidationRule {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            source: source.into(),
        }
    }
}

/// A complete schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Type name half of the identity
    pub type_name: String,
    /// Version half of the identity
    pub type_version: TypeVersion,
    /// Alternate lookup name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Ordered field list
    pub fields: Vec<FieldDefinition>,
    /// Ordered validation rules
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

impl SchemaDefinition {
    /// Create an empty definition
    pub fn new(type_name: impl Into<String>, type_version: TypeVersion) -> Self {
        Self {
            type_name: type_name.into(),
            type_version,
            alias: None,
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The identity key of this schema
    pub fn key(&self) -> SchemaKey {
        SchemaKey::new(&self.type_name, &self.type_version)
    }

    /// Fingerprint of the whole definition
    pub fn fingerprint(&self) -> Checksum {
        Checksum::of(self)
    }

    /// Fields carrying a non-blank formula, in declared order
    pub fn computed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.formula_source().is_some())
    }

    /// Parse a definition from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a definition from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
