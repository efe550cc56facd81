//! Compiled schemas
//!
//! A `CompiledSchema` bundles one generated value type with the compiled
//! validations and formulas of a schema. It holds no mutable state and is
//! shared across threads behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::bridge::{AuxContext, EvalScope};
use crate::checksum::Checksum;
use crate::compiler::{CompiledFieldFormula, CompiledValidation};
use crate::error::{Result, SchemaError};
use crate::schema::{SchemaKey, ValidationRule};
use crate::types::{Record, ValueType};
use crate::version::TypeVersion;
use crate::vocabulary::FieldKind;

/// Metadata describing how and when a schema was compiled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaInfo {
    pub key: SchemaKey,
    pub type_name: String,
    pub type_version: TypeVersion,
    pub alias: Option<String>,
    /// Fingerprint of the definition this was compiled from
    pub fingerprint: Checksum,
    /// Registry generation the value type was bound at
    pub generation: u64,
    pub library_version: u32,
    pub compiled_at: DateTime<Utc>,
    pub rule_count: usize,
    pub formula_count: usize,
}

/// Result of validating a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Copy of the first rule that did not hold
    pub failed_rule: Option<ValidationRule>,
}

impl ValidationOutcome {
    pub fn passed() -> Self {
        Self { failed_rule: None }
    }

    pub fn is_valid(&self) -> bool {
        self.failed_rule.is_none()
    }
}

#[derive(Debug)]
pub struct CompiledSchema {
    info: SchemaInfo,
    value_type: Arc<ValueType>,
    aux_types: BTreeMap<String, FieldKind>,
    rules: Vec<CompiledValidation>,
    formulas: Vec<CompiledFieldFormula>,
}

impl CompiledSchema {
    pub(crate) fn new(
        info: SchemaInfo,
        value_type: Arc<ValueType>,
        aux_types: BTreeMap<String, FieldKind>,
        rules: Vec<CompiledValidation>,
        formulas: Vec<CompiledFieldFormula>,
    ) -> Self {
        Self {
            info,
            value_type,
            aux_types,
            rules,
            formulas,
        }
    }

    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    pub fn key(&self) -> &SchemaKey {
        &self.info.key
    }

    pub fn value_type(&self) -> &Arc<ValueType> {
        &self.value_type
    }

    pub fn aux_types(&self) -> &BTreeMap<String, FieldKind> {
        &self.aux_types
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = &ValidationRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// Names of computed fields in evaluation order
    pub fn computed_fields(&self) -> impl Iterator<Item = &str> {
        self.formulas.iter().map(|formula| formula.field.as_str())
    }

    /// A fresh body with every member at its default
    pub fn new_body(&self) -> Record {
        self.value_type.instantiate()
    }

    /// Run the rules in declared order, stopping at the first that does not hold.
    ///
    /// A rule that fails to evaluate is an error carrying that rule, not a
    /// failed validation.
    pub fn validate(&self, body: &Record, aux: &AuxContext) -> Result<ValidationOutcome> {
        let scope = EvalScope::bind(&self.value_type, &self.aux_types, body, aux)?;

        for compiled in &self.rules {
            let passed = compiled
                .check(&scope)
                .map_err(|source| SchemaError::ValidationFailed {
                    rule: compiled.rule.clone(),
                    source,
                })?;
            if !passed {
                debug!(schema = %self.info.key, rule = %compiled.rule.key, "Validation rule failed");
                return Ok(ValidationOutcome {
                    failed_rule: Some(compiled.rule.clone()),
                });
            }
        }

        Ok(ValidationOutcome::passed())
    }

    /// Apply every formula in declared order; later formulas see earlier results
    pub fn compute_fields(&self, body: &mut Record, aux: &AuxContext) -> Result<()> {
        EvalScope::bind(&self.value_type, &self.aux_types, body, aux)?;
        for formula in &self.formulas {
            formula.apply(body, aux)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::schema::{FieldDefinition, SchemaDefinition};
    use crate::value::{parse_datetime, FieldValue};

    fn person() -> SchemaDefinition {
        SchemaDefinition::new("Person", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("txtProp", "string"))
            .with_field(FieldDefinition::new("born", "datetime"))
            .with_field(FieldDefinition::new("age", "int").with_formula("{ AgeAt(d.born, asOf) }"))
            .with_field(FieldDefinition::new("adult", "bool").with_formula("d.age >= 18"))
            .with_rule(ValidationRule::new("R1", "text required", "{ size(d.txtProp) > 0 }"))
            .with_rule(ValidationRule::new("R2", "born required", "{ d.born != null }"))
    }

    fn compiled() -> CompiledSchema {
        RuleCompiler::default()
            .with_aux("asOf", FieldKind::DATETIME)
            .compile(&person(), 1)
            .unwrap()
    }

    #[test]
    fn test_validation_stops_at_first_failure() {
        let schema = compiled();
        let body = schema.new_body();
        let outcome = schema.validate(&body, &AuxContext::new()).unwrap();
        assert_eq!(outcome.failed_rule.unwrap().key, "R1");
    }

    #[test]
    fn test_validation_passes() {
        let schema = compiled();
        let mut body = schema.new_body();
        body.set("txtProp", "x").unwrap();
        body.set("born", parse_datetime("2000-02-22").unwrap()).unwrap();
        assert!(schema.validate(&body, &AuxContext::new()).unwrap().is_valid());
    }

    #[test]
    fn test_formulas_run_in_order() {
        let schema = compiled();
        let mut body = schema.new_body();
        body.set("born", parse_datetime("2000-02-22").unwrap()).unwrap();
        let aux = AuxContext::new().with("asOf", parse_datetime("2017-05-15").unwrap());

        schema.compute_fields(&mut body, &aux).unwrap();
        assert_eq!(body.get("age"), Some(&FieldValue::Integer(17)));
        assert_eq!(body.get("adult"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn test_foreign_body_is_rejected() {
        let a = compiled();
        let b = compiled();
        let body = b.new_body();
        assert!(matches!(
            a.validate(&body, &AuxContext::new()),
            Err(SchemaError::BindingMismatch { .. })
        ));
    }

    #[test]
    fn test_evaluation_errors_carry_the_rule() {
        let schema = RuleCompiler::default()
            .compile(
                &SchemaDefinition::new("Broken", TypeVersion::new(1, 0, 0))
                    .with_field(FieldDefinition::new("txtProp", "string"))
                    .with_rule(ValidationRule::new("R1", "text plus number", "{ d.txtProp + 1 > 0 }")),
                1,
            )
            .unwrap();
        let err = schema.validate(&schema.new_body(), &AuxContext::new()).unwrap_err();
        match err {
            SchemaError::ValidationFailed { rule, .. } => assert_eq!(rule.key, "R1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_names_fail_compilation() {
        let schema = SchemaDefinition::new("Names", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("born", "datetime"))
            .with_rule(ValidationRule::new("R1", "", "{ d.nosuch > 0 }"))
            .with_rule(ValidationRule::new("R2", "", "{ NotAFunction(1) }"))
            .with_rule(ValidationRule::new("R3", "", "{ AGEAT(d.born) >= 0 }"));

        let err = RuleCompiler::default().compile(&schema, 1).unwrap_err();
        let report = err.compilation_report().expect("aggregated report");
        let targets: Vec<String> = report.iter().map(|d| d.target.to_string()).collect();
        assert_eq!(targets, vec!["rule 'R1'", "rule 'R2'"]);
    }
}
