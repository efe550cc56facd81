//! Schema type binder
//!
//! Turns a schema's field list into member specs and obtains a value type for
//! them from the configured `TypeGenerator`. Bound types are cached per
//! schema key, generation and definition fingerprint; a new generation or an
//! edited definition always gets a freshly generated, uniquely named type.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::schema::{SchemaDefinition, SchemaKey};
use crate::types::{MemberAttribute, MemberSpec, RecordTypeGenerator, TypeGenerator, ValueType};
use crate::vocabulary::FieldKind;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"))
}

/// A bound type and what it was bound from
struct Binding {
    generation: u64,
    fingerprint: Checksum,
    value_type: Arc<ValueType>,
}

/// Binds schemas to generated value types
pub struct SchemaTypeBinder {
    generator: Arc<dyn TypeGenerator>,
    cache: RwLock<HashMap<SchemaKey, Binding>>,
    sequence: AtomicU64,
}

impl Default for SchemaTypeBinder {
    fn default() -> Self {
        Self::new(Arc::new(RecordTypeGenerator::new()))
    }
}

impl SchemaTypeBinder {
    pub fn new(generator: Arc<dyn TypeGenerator>) -> Self {
        Self {
            generator,
            cache: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Translate the field list into member specs, checking names and types
    pub fn member_specs(schema: &SchemaDefinition) -> Result<Vec<MemberSpec>> {
        let key = schema.key();
        if schema.fields.is_empty() {
            return Err(SchemaError::EmptyFieldList { schema: key });
        }

        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(schema.fields.len());

        for field in &schema.fields {
            if !identifier_pattern().is_match(&field.name) {
                return Err(SchemaError::InvalidFieldName {
                    schema: key,
                    field: field.name.clone(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: key,
                    field: field.name.clone(),
                });
            }
            let kind = FieldKind::parse(&field.type_name).ok_or_else(|| SchemaError::UnknownFieldType {
                schema: key.clone(),
                field: field.name.clone(),
                type_name: field.type_name.clone(),
            })?;

            let mut member = MemberSpec::new(field.name.clone(), kind);
            if field.sensitive {
                member = member.with_attribute(MemberAttribute::Sensitive);
            }
            if let Some(mapping) = &field.mapping {
                member = member.with_attribute(MemberAttribute::Mapping(mapping.clone()));
            }
            members.push(member);
        }

        Ok(members)
    }

    /// Value type for `schema` at `generation`, generating one if needed
    pub fn bind(&self, schema: &SchemaDefinition, generation: u64) -> Result<Arc<ValueType>> {
        let key = schema.key();
        let fingerprint = schema.fingerprint();

        if let Some(binding) = self.cache.read().get(&key) {
            if binding.generation == generation && binding.fingerprint == fingerprint {
                return Ok(Arc::clone(&binding.value_type));
            }
        }

        let members = Self::member_specs(schema)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let unique_name = format!(
            "{}_v{}_{}_{}_g{}_{}",
            schema.type_name,
            schema.type_version.semver().major,
            schema.type_version.semver().minor,
            schema.type_version.semver().patch,
            generation,
            sequence
        );

        let ty = self.generator.create_type(&unique_name, members)?;
        debug!(schema = %key, type_name = %unique_name, generation, "Bound value type");

        self.cache.write().insert(
            key,
            Binding {
                generation,
                fingerprint,
                value_type: Arc::clone(&ty),
            },
        );
        Ok(ty)
    }

    /// Drop the cached type for a schema
    pub fn invalidate(&self, key: &SchemaKey) -> bool {
        self.cache.write().remove(key).is_some()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;
    use crate::value::FieldValue;
    use crate::version::TypeVersion;

    fn person() -> SchemaDefinition {
        SchemaDefinition::new("Person", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("txtProp", "String"))
            .with_field(FieldDefinition::new("born", "DateTime"))
            .with_field(FieldDefinition::new("ssn", "string").sensitive())
    }

    #[test]
    fn test_bind_produces_defaulted_members() {
        let binder = SchemaTypeBinder::default();
        let ty = binder.bind(&person(), 1).unwrap();
        let record = ty.instantiate();

        assert_eq!(ty.members().len(), 3);
        assert_eq!(record.get("txtProp"), Some(&FieldValue::Text(String::new())));
        assert!(ty.member("ssn").unwrap().is_sensitive());
    }

    #[test]
    fn test_same_generation_reuses_type() {
        let binder = SchemaTypeBinder::default();
        let a = binder.bind(&person(), 1).unwrap();
        let b = binder.bind(&person(), 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_new_generation_gets_new_type() {
        let binder = SchemaTypeBinder::default();
        let a = binder.bind(&person(), 1).unwrap();
        let b = binder.bind(&person(), 2).unwrap();
        assert_ne!(a.name(), b.name());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_edited_definition_gets_new_type() {
        let binder = SchemaTypeBinder::default();
        let a = binder.bind(&person(), 1).unwrap();
        let edited = person().with_field(FieldDefinition::new("nickname", "string"));
        let b = binder.bind(&edited, 1).unwrap();
        assert!(a.member("nickname").is_none());
        assert!(b.member("nickname").is_some());
    }

    #[test]
    fn test_invalidate_forces_regeneration() {
        let binder = SchemaTypeBinder::default();
        let a = binder.bind(&person(), 1).unwrap();
        assert!(binder.invalidate(&person().key()));
        let b = binder.bind(&person(), 1).unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_empty_field_list_fails() {
        let schema = SchemaDefinition::new("Empty", TypeVersion::new(1, 0, 0));
        let err = SchemaTypeBinder::default().bind(&schema, 1).unwrap_err();
        assert!(matches!(err, SchemaError::EmptyFieldList { .. }));
    }

    #[test]
    fn test_unknown_type_names_the_field() {
        let schema = person().with_field(FieldDefinition::new("id", "uuid"));
        match SchemaTypeBinder::default().bind(&schema, 1).unwrap_err() {
            SchemaError::UnknownFieldType { field, type_name, .. } => {
                assert_eq!(field, "id");
                assert_eq!(type_name, "uuid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_field_name_checks() {
        let bad_name = person().with_field(FieldDefinition::new("2fast", "int"));
        assert!(matches!(
            SchemaTypeBinder::member_specs(&bad_name),
            Err(SchemaError::InvalidFieldName { .. })
        ));

        let duplicate = person().with_field(FieldDefinition::new("born", "int"));
        assert!(matches!(
            SchemaTypeBinder::member_specs(&duplicate),
            Err(SchemaError::DuplicateField { .. })
        ));
    }
}
