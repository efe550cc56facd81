//! Document body lifecycle
//!
//! A document carries a schema key, a body container (payload bytes plus an
//! encoding tag) and a status. `BodyProcessor` loads the body through a codec,
//! optionally computes formula fields, validates it against a compiled schema
//! and writes the outcome and payload back onto the document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bridge::AuxContext;
use crate::codec::BodyCodec;
use crate::compiled::{CompiledSchema, ValidationOutcome};
use crate::error::{Result, SchemaError};
use crate::schema::{SchemaKey, ValidationRule};
use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Disabled,
    Implausible,
    Valid,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Disabled => write!(f, "disabled"),
            DocumentStatus::Implausible => write!(f, "implausible"),
            DocumentStatus::Valid => write!(f, "valid"),
        }
    }
}

/// Stored body bytes and the codec tag they were written with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyContainer {
    pub payload: Option<Vec<u8>>,
    pub encoding: Option<String>,
}

impl BodyContainer {
    pub fn new(payload: Vec<u8>, encoding: impl Into<String>) -> Self {
        Self {
            payload: Some(payload),
            encoding: Some(encoding.into()),
        }
    }
}

/// What the lifecycle needs from a document
pub trait DocumentEntity {
    fn id(&self) -> &str;
    fn schema_key(&self) -> &SchemaKey;
    fn body(&self) -> Option<&BodyContainer>;
    fn body_mut(&mut self) -> Option<&mut BodyContainer>;
    fn status(&self) -> DocumentStatus;
    fn set_status(&mut self, status: DocumentStatus, detail: Option<String>);
}

/// Plain in-memory document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub schema_key: SchemaKey,
    pub body: Option<BodyContainer>,
    pub status: DocumentStatus,
    pub status_detail: Option<String>,
}

impl Document {
    /// A new document with an empty body container
    pub fn new(id: impl Into<String>, schema_key: SchemaKey) -> Self {
        Self {
            id: id.into(),
            schema_key,
            body: Some(BodyContainer::default()),
            status: DocumentStatus::Implausible,
            status_detail: None,
        }
    }

    pub fn with_body(mut self, body: BodyContainer) -> Self {
        self.body = Some(body);
        self
    }

    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }
}

impl DocumentEntity for Document {
    fn id(&self) -> &str {
        &self.id
    }

    fn schema_key(&self) -> &SchemaKey {
        &self.schema_key
    }

    fn body(&self) -> Option<&BodyContainer> {
        self.body.as_ref()
    }

    fn body_mut(&mut self) -> Option<&mut BodyContainer> {
        self.body.as_mut()
    }

    fn status(&self) -> DocumentStatus {
        self.status
    }

    fn set_status(&mut self, status: DocumentStatus, detail: Option<String>) {
        self.status = status;
        self.status_detail = detail;
    }
}

/// Controls optional lifecycle steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Run formulas before validating
    pub compute_fields: bool,
    /// Write the body back onto the document
    pub reserialize: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            compute_fields: false,
            reserialize: true,
        }
    }
}

/// Outcome of one lifecycle run
#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub body: Record,
    pub outcome: ValidationOutcome,
    pub status: DocumentStatus,
}

/// Human-readable status detail for a failed rule
pub fn status_detail(rule: &ValidationRule) -> String {
    if rule.description.is_empty() {
        rule.key.clone()
    } else {
        format!("{}: {}", rule.key, rule.description)
    }
}

/// Runs the body lifecycle for documents of one compiled schema
pub struct BodyProcessor<'a> {
    schema: Arc<CompiledSchema>,
    codec: &'a dyn BodyCodec,
}

impl<'a> BodyProcessor<'a> {
    pub fn new(schema: Arc<CompiledSchema>, codec: &'a dyn BodyCodec) -> Self {
        Self { schema, codec }
    }

    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    /// Preconditions: matching schema key and a body container.
    ///
    /// Checked before any payload is touched.
    pub fn check_binding<D: DocumentEntity + ?Sized>(&self, document: &D) -> Result<()> {
        if document.schema_key() != self.schema.key() {
            return Err(SchemaError::BindingMismatch {
                expected: self.schema.key().to_string(),
                actual: document.schema_key().to_string(),
            });
        }
        if document.body().is_none() {
            return Err(SchemaError::MissingBody {
                document: document.id().to_string(),
            });
        }
        Ok(())
    }

    /// Deserialize the stored payload, or a default body if there is none
    pub fn load_body<D: DocumentEntity + ?Sized>(&self, document: &D) -> Result<Record> {
        self.check_binding(document)?;
        let container = document.body().ok_or_else(|| SchemaError::MissingBody {
            document: document.id().to_string(),
        })?;

        let Some(payload) = &container.payload else {
            return Ok(self.schema.new_body());
        };

        if let Some(encoding) = &container.encoding {
            if encoding != self.codec.encoding() {
                return Err(SchemaError::Codec {
                    encoding: encoding.clone(),
                    message: format!(
                        "document {} is stored as '{}' but the codec reads '{}'",
                        document.id(),
                        encoding,
                        self.codec.encoding()
                    ),
                });
            }
        }

        self.codec.read(payload, self.schema.value_type())
    }

    /// Convert a body of another type by round-tripping it through the codec
    pub fn coerce(&self, body: Record) -> Result<Record> {
        if self.schema.value_type().owns(&body) {
            return Ok(body);
        }
        let bytes = self.codec.write(&body)?;
        self.codec.read(&bytes, self.schema.value_type())
    }

    /// Serialize the body onto the document
    pub fn store_body<D: DocumentEntity + ?Sized>(&self, document: &mut D, body: &Record) -> Result<()> {
        let bytes = self.codec.write(body)?;
        let encoding = self.codec.encoding().to_string();
        let id = document.id().to_string();
        let container = document
            .body_mut()
            .ok_or(SchemaError::MissingBody { document: id })?;
        container.payload = Some(bytes);
        container.encoding = Some(encoding);
        Ok(())
    }

    /// Load, optionally compute, validate and record the outcome
    pub fn process<D: DocumentEntity + ?Sized>(
        &self,
        document: &mut D,
        aux: &AuxContext,
        options: LifecycleOptions,
    ) -> Result<LifecycleReport> {
        let body = self.load_body(document)?;
        self.finish(document, body, aux, options)
    }

    /// Like `process`, but with a caller-supplied body replacing the stored one
    pub fn process_with<D: DocumentEntity + ?Sized>(
        &self,
        document: &mut D,
        body: Record,
        aux: &AuxContext,
        options: LifecycleOptions,
    ) -> Result<LifecycleReport> {
        self.check_binding(document)?;
        let body = self.coerce(body)?;
        self.finish(document, body, aux, options)
    }

    fn finish<D: DocumentEntity + ?Sized>(
        &self,
        document: &mut D,
        mut body: Record,
        aux: &AuxContext,
        options: LifecycleOptions,
    ) -> Result<LifecycleReport> {
        if options.compute_fields {
            self.schema.compute_fields(&mut body, aux)?;
        }

        let outcome = self.schema.validate(&body, aux)?;
        let status = apply_outcome(document, &outcome);

        if options.reserialize {
            self.store_body(document, &body)?;
        }

        Ok(LifecycleReport { body, outcome, status })
    }
}

fn apply_outcome<D: DocumentEntity + ?Sized>(document: &mut D, outcome: &ValidationOutcome) -> DocumentStatus {
    if document.status() == DocumentStatus::Disabled {
        debug!(document = document.id(), "Document is disabled; status left unchanged");
        return DocumentStatus::Disabled;
    }

    match &outcome.failed_rule {
        None => {
            document.set_status(DocumentStatus::Valid, None);
            DocumentStatus::Valid
        }
        Some(rule) => {
            info!(document = document.id(), rule = %rule.key, "Document is implausible");
            document.set_status(DocumentStatus::Implausible, Some(status_detail(rule)));
            DocumentStatus::Implausible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonBodyCodec, JSON_ENCODING};
    use crate::compiler::RuleCompiler;
    use crate::schema::{FieldDefinition, SchemaDefinition};
    use crate::value::FieldValue;
    use crate::version::TypeVersion;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new("Note", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("txtProp", "string"))
            .with_field(FieldDefinition::new("shout", "string").with_formula("d.txtProp + '!'"))
            .with_rule(ValidationRule::new("R1", "text required", "{ size(d.txtProp) > 0 }"))
    }

    fn compiled() -> Arc<CompiledSchema> {
        Arc::new(RuleCompiler::default().compile(&schema(), 1).unwrap())
    }

    fn document(payload: &str) -> Document {
        Document::new("doc-1", schema().key())
            .with_body(BodyContainer::new(payload.as_bytes().to_vec(), JSON_ENCODING))
    }

    #[test]
    fn test_valid_document() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = document(r#"{ "txtProp": "x" }"#);

        let report = processor
            .process(&mut doc, &AuxContext::new(), LifecycleOptions::default())
            .unwrap();
        assert!(report.outcome.is_valid());
        assert_eq!(doc.status, DocumentStatus::Valid);
        assert_eq!(doc.status_detail, None);
    }

    #[test]
    fn test_implausible_document_gets_detail() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = document(r#"{ "txtProp": "" }"#);

        processor
            .process(&mut doc, &AuxContext::new(), LifecycleOptions::default())
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Implausible);
        assert_eq!(doc.status_detail.as_deref(), Some("R1: text required"));
    }

    #[test]
    fn test_missing_payload_uses_defaults_and_is_written_back() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = Document::new("doc-2", schema().key());

        let options = LifecycleOptions {
            compute_fields: true,
            reserialize: true,
        };
        let report = processor.process(&mut doc, &AuxContext::new(), options).unwrap();
        assert_eq!(report.body.get("shout"), Some(&FieldValue::Text("!".into())));

        let container = doc.body.as_ref().unwrap();
        assert_eq!(container.encoding.as_deref(), Some(JSON_ENCODING));
        assert!(container.payload.is_some());
    }

    #[test]
    fn test_schema_mismatch_fails_before_reading() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let other_key = SchemaKey::new("Note", &TypeVersion::new(2, 0, 0));
        let mut doc = Document::new("doc-3", other_key)
            .with_body(BodyContainer::new(b"garbage".to_vec(), JSON_ENCODING));

        let err = processor
            .process(&mut doc, &AuxContext::new(), LifecycleOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchemaError::BindingMismatch { .. }));
    }

    #[test]
    fn test_missing_body_container() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = Document::new("doc-4", schema().key()).without_body();
        assert!(matches!(
            processor.process(&mut doc, &AuxContext::new(), LifecycleOptions::default()),
            Err(SchemaError::MissingBody { .. })
        ));
    }

    #[test]
    fn test_disabled_documents_stay_disabled() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = document(r#"{ "txtProp": "" }"#);
        doc.set_status(DocumentStatus::Disabled, Some("archived".into()));

        let report = processor
            .process(&mut doc, &AuxContext::new(), LifecycleOptions::default())
            .unwrap();
        assert!(!report.outcome.is_valid());
        assert_eq!(doc.status, DocumentStatus::Disabled);
        assert_eq!(doc.status_detail.as_deref(), Some("archived"));
    }

    #[test]
    fn test_foreign_encoding_is_refused() {
        let codec = JsonBodyCodec::new();
        let processor = BodyProcessor::new(compiled(), &codec);
        let mut doc = Document::new("doc-5", schema().key())
            .with_body(BodyContainer::new(vec![1, 2, 3], "avro"));
        assert!(matches!(
            processor.process(&mut doc, &AuxContext::new(), LifecycleOptions::default()),
            Err(SchemaError::Codec { .. })
        ));
    }

    #[test]
    fn test_supplied_body_of_older_type_is_coerced() {
        let codec = JsonBodyCodec::new();
        let old = compiled();
        let current = compiled();
        let processor = BodyProcessor::new(current.clone(), &codec);

        let mut stale = old.new_body();
        stale.set("txtProp", "kept").unwrap();
        let mut doc = Document::new("doc-6", schema().key());

        let report = processor
            .process_with(&mut doc, stale, &AuxContext::new(), LifecycleOptions::default())
            .unwrap();
        assert!(current.value_type().owns(&report.body));
        assert_eq!(report.body.get("txtProp"), Some(&FieldValue::Text("kept".into())));
        assert_eq!(doc.status, DocumentStatus::Valid);
    }
}
