//! Invocation boundary for compiled callables
//!
//! Compiled rules and formulas are built against one generated value type and
//! a declared set of auxiliary context kinds. `EvalScope::bind` is the single
//! runtime check that a body and an auxiliary context actually match those
//! declarations; compiled callables only ever receive an `EvalScope`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, SchemaError};
use crate::types::{Record, ValueType};
use crate::value::FieldValue;
use crate::vocabulary::FieldKind;

/// Named values visible to expressions besides the body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxContext {
    values: BTreeMap<String, FieldValue>,
}

impl AuxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }
}

static NULL: FieldValue = FieldValue::Null;

/// A body and auxiliary context checked against a compiled schema
#[derive(Debug, Clone, Copy)]
pub struct EvalScope<'a> {
    body: &'a Record,
    aux: &'a AuxContext,
}

impl<'a> EvalScope<'a> {
    /// Check `body` and `aux` against the declared type and kinds
    pub fn bind(
        value_type: &Arc<ValueType>,
        aux_types: &BTreeMap<String, FieldKind>,
        body: &'a Record,
        aux: &'a AuxContext,
    ) -> Result<Self> {
        let actual = body.value_type();
        if !Arc::ptr_eq(value_type, actual) && value_type.id() != actual.id() {
            return Err(SchemaError::BindingMismatch {
                expected: value_type.name().to_string(),
                actual: actual.name().to_string(),
            });
        }

        for (name, value) in aux.iter() {
            match aux_types.get(name) {
                Some(kind) if kind.accepts(value) => {}
                Some(kind) => {
                    return Err(SchemaError::AuxContextMismatch {
                        name: name.clone(),
                        expected: kind.to_string(),
                        actual: value.kind_name().to_string(),
                    })
                }
                None => {
                    return Err(SchemaError::AuxContextMismatch {
                        name: name.clone(),
                        expected: "no such context entry".to_string(),
                        actual: value.kind_name().to_string(),
                    })
                }
            }
        }

        Ok(Self { body, aux })
    }

    /// Skip the checks; for callers that built `body` from the type themselves
    pub(crate) fn trusted(body: &'a Record, aux: &'a AuxContext) -> Self {
        Self { body, aux }
    }

    pub fn body(&self) -> &'a Record {
        self.body
    }

    /// Auxiliary value by name; undeclared or absent names read as null
    pub fn aux_value(&self, name: &str) -> &'a FieldValue {
        self.aux.get(name).unwrap_or(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemberSpec, RecordTypeGenerator, TypeGenerator};

    fn types() -> (Arc<ValueType>, Arc<ValueType>) {
        let generator = RecordTypeGenerator::new();
        let members = || vec![MemberSpec::new("name", FieldKind::TEXT)];
        (
            generator.create_type("A", members()).unwrap(),
            generator.create_type("B", members()).unwrap(),
        )
    }

    fn aux_types() -> BTreeMap<String, FieldKind> {
        let mut kinds = BTreeMap::new();
        kinds.insert("today".to_string(), FieldKind::DATETIME);
        kinds
    }

    #[test]
    fn test_bind_accepts_own_instances() {
        let (a, _) = types();
        let body = a.instantiate();
        let aux = AuxContext::new();
        let scope = EvalScope::bind(&a, &aux_types(), &body, &aux).unwrap();
        assert_eq!(scope.aux_value("today"), &FieldValue::Null);
    }

    #[test]
    fn test_bind_rejects_foreign_instances() {
        let (a, b) = types();
        let body = b.instantiate();
        let aux = AuxContext::new();
        let err = EvalScope::bind(&a, &aux_types(), &body, &aux).unwrap_err();
        assert!(matches!(err, SchemaError::BindingMismatch { .. }));
    }

    #[test]
    fn test_bind_checks_aux_kinds() {
        let (a, _) = types();
        let body = a.instantiate();

        let wrong_kind = AuxContext::new().with("today", "monday");
        assert!(matches!(
            EvalScope::bind(&a, &aux_types(), &body, &wrong_kind),
            Err(SchemaError::AuxContextMismatch { .. })
        ));

        let undeclared = AuxContext::new().with("tomorrow", FieldValue::Null);
        assert!(EvalScope::bind(&a, &aux_types(), &body, &undeclared).is_err());

        let null_is_fine = AuxContext::new().with("today", FieldValue::Null);
        assert!(EvalScope::bind(&a, &aux_types(), &body, &null_is_fine).is_ok());
    }
}
