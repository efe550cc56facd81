//! Expression compilation seam
//!
//! The rule compiler hands rule and formula source to an `ExpressionCompiler`
//! together with a `CompileContext` describing the value type, the auxiliary
//! context types and the function library. The compiler returns a
//! `CompiledExpr` callable, or a `CompileFailure` that separates syntax errors
//! (aggregated into compilation reports) from every other failure.

pub mod cel;

pub use cel::CelCompiler;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::bridge::EvalScope;
use crate::library::FunctionLibrary;
use crate::types::ValueType;
use crate::value::FieldValue;
use crate::vocabulary::FieldKind;

/// Everything an expression may reference
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// Name under which the body is visible (e.g. `d`)
    pub context_variable: &'a str,
    pub value_type: &'a Arc<ValueType>,
    pub aux_types: &'a BTreeMap<String, FieldKind>,
    pub library: &'a FunctionLibrary,
}

/// A compiled rule predicate or formula expression
pub type CompiledExpr = Arc<dyn Fn(&EvalScope<'_>) -> Result<FieldValue, EvalError> + Send + Sync>;

/// Expression compilation capability
pub trait ExpressionCompiler: Send + Sync {
    /// Compile `source` into a callable producing a value of `expected` kind
    fn compile(
        &self,
        source: &str,
        context: &CompileContext<'_>,
        expected: FieldKind,
    ) -> Result<CompiledExpr, CompileFailure>;
}

/// 1-based position within expression source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A syntax error in rule or formula source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub position: Option<SourcePosition>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: SourcePosition) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(position) => write!(f, "{} ({})", self.message, position),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Why an expression did not compile
#[derive(Debug, Clone, Error)]
pub enum CompileFailure {
    #[error("syntax error: {0}")]
    Syntax(SyntaxError),

    #[error("{0}")]
    Other(String),
}

/// Failure raised while a compiled expression runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("evaluation failed: {0}")]
    Execution(String),

    #[error("expected a {expected} result, got {actual}")]
    ResultType { expected: String, actual: String },

    #[error("{function}: {message}")]
    Function { function: String, message: String },
}
