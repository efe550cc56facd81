//! Rule and formula compiler
//!
//! Binds a schema to its value type and compiles every validation rule and
//! every computed-field formula against it. Syntax errors are collected across
//! the whole schema (up to `MAX_REPORTED_ERRORS`) and reported together; a
//! schema with any syntax error never yields a `CompiledSchema`.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::binder::SchemaTypeBinder;
use crate::bridge::{AuxContext, EvalScope};
use crate::compiled::{CompiledSchema, SchemaInfo};
use crate::config::CompilerSettings;
use crate::diagnostics::{CompilationReport, CompileTarget};
use crate::error::{Result, SchemaError};
use crate::expr::{CelCompiler, CompileContext, CompileFailure, CompiledExpr, EvalError, ExpressionCompiler, SyntaxError};
use crate::library::FunctionLibrary;
use crate::schema::{FieldDefinition, SchemaDefinition, ValidationRule};
use crate::types::Record;
use crate::value::FieldValue;
use crate::vocabulary::FieldKind;

/// Syntax errors collected before compilation of a schema stops
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Default name of the variable holding the body
pub const DEFAULT_CONTEXT_VARIABLE: &str = "d";

/// Strip the structural `{ }` pair from rule source.
///
/// The text must start with `{` and end with `}` exactly; surrounding
/// whitespace is not tolerated.
pub fn strip_rule_delimiters(source: &str) -> std::result::Result<&str, SyntaxError> {
    source
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| SyntaxError::new("rule text must be wrapped in a single pair of braces: { ... }"))
}

/// Formulas may be written with or without the rule braces
fn strip_formula_delimiters(source: &str) -> &str {
    let trimmed = source.trim();
    strip_rule_delimiters(trimmed).unwrap_or(trimmed)
}

/// A validation rule with its compiled predicate
#[derive(Clone)]
pub struct CompiledValidation {
    pub rule: ValidationRule,
    predicate: CompiledExpr,
}

impl CompiledValidation {
    pub(crate) fn check(&self, scope: &EvalScope<'_>) -> std::result::Result<bool, EvalError> {
        match (self.predicate)(scope)? {
            FieldValue::Boolean(passed) => Ok(passed),
            other => Err(EvalError::ResultType {
                expected: FieldKind::BOOLEAN.to_string(),
                actual: other.kind_name().to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for CompiledValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledValidation").field("rule", &self.rule).finish()
    }
}

/// A computed field with its compiled expression
#[derive(Clone)]
pub struct CompiledFieldFormula {
    pub field: String,
    slot: usize,
    kind: FieldKind,
    expression: CompiledExpr,
}

impl CompiledFieldFormula {
    /// Evaluate and assign into the body
    pub(crate) fn apply(&self, body: &mut Record, aux: &AuxContext) -> Result<()> {
        let value = (self.expression)(&EvalScope::trusted(body, aux)).map_err(|source| {
            SchemaError::FormulaFailed {
                field: self.field.clone(),
                source,
            }
        })?;
        let value = self.kind.coerce(value).map_err(|rejected| SchemaError::FormulaFailed {
            field: self.field.clone(),
            source: EvalError::ResultType {
                expected: self.kind.to_string(),
                actual: rejected.kind_name().to_string(),
            },
        })?;
        body.store(self.slot, value)
    }
}

impl std::fmt::Debug for CompiledFieldFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFieldFormula")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Compiles schema definitions into `CompiledSchema`s
pub struct RuleCompiler {
    binder: Arc<SchemaTypeBinder>,
    expressions: Arc<dyn ExpressionCompiler>,
    library: FunctionLibrary,
    context_variable: String,
    aux_types: BTreeMap<String, FieldKind>,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(Arc::new(CelCompiler::new()))
    }
}

impl RuleCompiler {
    pub fn new(expressions: Arc<dyn ExpressionCompiler>) -> Self {
        Self {
            binder: Arc::new(SchemaTypeBinder::default()),
            expressions,
            library: FunctionLibrary::standard(),
            context_variable: DEFAULT_CONTEXT_VARIABLE.to_string(),
            aux_types: BTreeMap::new(),
        }
    }

    /// Build from configuration, using the CEL backend
    pub fn from_settings(settings: &CompilerSettings) -> Result<Self> {
        let mut compiler = Self::default().with_context_variable(settings.context_variable.clone());
        compiler.aux_types = settings.aux_kinds()?;
        Ok(compiler)
    }

    pub fn with_context_variable(mut self, name: impl Into<String>) -> Self {
        self.context_variable = name.into();
        self
    }

    /// Declare an auxiliary context entry visible to every expression
    pub fn with_aux(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.aux_types.insert(name.into(), kind);
        self
    }

    pub fn with_binder(mut self, binder: Arc<SchemaTypeBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn binder(&self) -> &Arc<SchemaTypeBinder> {
        &self.binder
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    pub fn aux_types(&self) -> &BTreeMap<String, FieldKind> {
        &self.aux_types
    }

    /// Compile a schema at the given registry generation
    pub fn compile(&self, schema: &SchemaDefinition, generation: u64) -> Result<CompiledSchema> {
        let key = schema.key();
        let value_type = self.binder.bind(schema, generation)?;

        let context = CompileContext {
            context_variable: &self.context_variable,
            value_type: &value_type,
            aux_types: &self.aux_types,
            library: &self.library,
        };

        let mut report = CompilationReport::new(key.clone());
        let mut rules = Vec::with_capacity(schema.rules.len());
        let mut formulas = Vec::new();

        let sources = schema
            .rules
            .iter()
            .map(Source::Rule)
            .chain(schema.computed_fields().map(Source::Formula));

        for source in sources {
            if report.len() >= MAX_REPORTED_ERRORS {
                report.truncated = true;
                break;
            }

            match source {
                Source::Rule(rule) => {
                    let outcome = strip_rule_delimiters(&rule.source)
                        .map_err(CompileFailure::Syntax)
                        .and_then(|inner| self.expressions.compile(inner, &context, FieldKind::BOOLEAN));
                    match outcome {
                        Ok(predicate) => rules.push(CompiledValidation {
                            rule: rule.clone(),
                            predicate,
                        }),
                        Err(CompileFailure::Syntax(error)) => {
                            report.record(CompileTarget::Rule(rule.key.clone()), error)
                        }
                        Err(CompileFailure::Other(message)) => {
                            return Err(SchemaError::Backend {
                                target: CompileTarget::Rule(rule.key.clone()).to_string(),
                                message,
                            })
                        }
                    }
                }
                Source::Formula(field) => {
                    let (Some(slot), Some(member)) = (value_type.slot(&field.name), value_type.member(&field.name)) else {
                        return Err(SchemaError::BindingMismatch {
                            expected: format!("value type with member '{}'", field.name),
                            actual: value_type.name().to_string(),
                        });
                    };
                    let text = field.formula_source().unwrap_or_default();
                    match self
                        .expressions
                        .compile(strip_formula_delimiters(text), &context, member.kind)
                    {
                        Ok(expression) => formulas.push(CompiledFieldFormula {
                            field: field.name.clone(),
                            slot,
                            kind: member.kind,
                            expression,
                        }),
                        Err(CompileFailure::Syntax(error)) => {
                            report.record(CompileTarget::Formula(field.name.clone()), error)
                        }
                        Err(CompileFailure::Other(message)) => {
                            return Err(SchemaError::Backend {
                                target: CompileTarget::Formula(field.name.clone()).to_string(),
                                message,
                            })
                        }
                    }
                }
            }
        }

        if !report.is_empty() {
            debug!(schema = %key, errors = report.len(), "Schema failed to compile");
            return Err(SchemaError::Compilation(report));
        }

        let info = SchemaInfo {
            key: key.clone(),
            type_name: schema.type_name.clone(),
            type_version: schema.type_version.clone(),
            alias: schema.alias.clone(),
            fingerprint: schema.fingerprint(),
            generation,
            library_version: self.library.version(),
            compiled_at: Utc::now(),
            rule_count: rules.len(),
            formula_count: formulas.len(),
        };

        info!(
            schema = %key,
            generation,
            rules = info.rule_count,
            formulas = info.formula_count,
            "Compiled schema"
        );

        Ok(CompiledSchema::new(info, value_type, self.aux_types.clone(), rules, formulas))
    }
}

enum Source<'a> {
    Rule(&'a ValidationRule),
    Formula(&'a FieldDefinition),
}
