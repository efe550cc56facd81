//! Compilation diagnostics
//!
//! Syntax errors from a schema's rules and formulas are collected into a
//! single `CompilationReport` instead of failing on the first one.

use std::fmt;

use crate::expr::SyntaxError;
use crate::schema::SchemaKey;

/// Where a diagnostic came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileTarget {
    /// Validation rule, by rule key
    Rule(String),
    /// Field formula, by field name
    Formula(String),
}

impl fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileTarget::Rule(key) => write!(f, "rule '{}'", key),
            CompileTarget::Formula(field) => write!(f, "formula of '{}'", field),
        }
    }
}

/// One syntax error tied to its source
#[derive(Debug, Clone, PartialEq)]
pub struct CompileDiagnostic {
    pub target: CompileTarget,
    pub error: SyntaxError,
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

/// Aggregated syntax errors of one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationReport {
    pub schema: SchemaKey,
    pub diagnostics: Vec<CompileDiagnostic>,
    /// Compilation stopped at the cap with sources left unchecked
    pub truncated: bool,
}

impl CompilationReport {
    pub fn new(schema: SchemaKey) -> Self {
        Self {
            schema,
            diagnostics: Vec::new(),
            truncated: false,
        }
    }

    pub fn record(&mut self, target: CompileTarget, error: SyntaxError) {
        self.diagnostics.push(CompileDiagnostic { target, error });
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileDiagnostic> {
        self.diagnostics.iter()
    }
}

impl fmt::Display for CompilationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Schema {} failed to compile with {} error(s)",
            self.schema,
            self.diagnostics.len()
        )?;
        if self.truncated {
            write!(f, " (remaining sources not checked)")?;
        }
        for diagnostic in &self.diagnostics {
            write!(f, "\n  - {}", diagnostic)?;
        }
        Ok(())
    }
}
