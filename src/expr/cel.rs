//! CEL backend for rules and formulas
//!
//! Programs are parsed once at compile time and their references resolved
//! against the compile context: unknown variables, functions and body
//! members are rejected as syntax errors. Each evaluation builds a fresh
//! `Context` holding the body as a map under the context variable, every
//! declared auxiliary entry, and the library functions the source calls.

use cel_interpreter::extractors::Arguments;
use cel_interpreter::{Context, ExecutionError, Program, Value};
use chrono::{TimeZone, Utc};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::{CompileContext, CompileFailure, CompiledExpr, EvalError, ExpressionCompiler, SourcePosition, SyntaxError};
use crate::bridge::EvalScope;
use crate::library::LibraryFunction;
use crate::types::Record;
use crate::value::FieldValue;
use crate::vocabulary::FieldKind;

/// Functions `Context::default` provides
const CEL_BUILTINS: &[&str] = &[
    "contains",
    "size",
    "has",
    "map",
    "filter",
    "all",
    "exists",
    "exists_one",
    "max",
    "startsWith",
    "endsWith",
    "matches",
    "string",
    "int",
    "uint",
    "double",
    "duration",
    "timestamp",
    "getFullYear",
    "getMonth",
    "getDayOfYear",
    "getDayOfMonth",
    "getDate",
    "getDayOfWeek",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
];

/// Macros whose first argument binds a new variable
const COMPREHENSIONS: &str = "map|filter|all|exists|exists_one";

/// Compiles expressions with `cel-interpreter`
#[derive(Debug, Default, Clone, Copy)]
pub struct CelCompiler;

impl CelCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionCompiler for CelCompiler {
    fn compile(
        &self,
        source: &str,
        context: &CompileContext<'_>,
        expected: FieldKind,
    ) -> Result<CompiledExpr, CompileFailure> {
        if source.trim().is_empty() {
            return Err(CompileFailure::Syntax(SyntaxError::new("empty expression")));
        }

        let program = Program::compile(source).map_err(|e| CompileFailure::Syntax(syntax_error(&e.to_string())))?;
        let functions = resolve_references(source, &program, context).map_err(CompileFailure::Syntax)?;
        let program = Arc::new(program);

        let variable = context.context_variable.to_string();
        let aux_names: Vec<String> = context.aux_types.keys().cloned().collect();

        let compiled: CompiledExpr = Arc::new(move |scope: &EvalScope<'_>| {
            let mut ctx = Context::default();
            for (spelling, function) in &functions {
                register(&mut ctx, spelling, function);
            }
            ctx.add_variable_from_value(variable.as_str(), body_value(scope.body()));
            for name in &aux_names {
                ctx.add_variable_from_value(name.as_str(), to_cel(scope.aux_value(name)));
            }

            let result = program
                .execute(&ctx)
                .map_err(|e| EvalError::Execution(e.to_string()))?;
            let value = from_cel(&result)?;
            expected.coerce(value).map_err(|rejected| EvalError::ResultType {
                expected: expected.to_string(),
                actual: rejected.kind_name().to_string(),
            })
        });

        Ok(compiled)
    }
}

fn position_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"line (\d+),? col(?:umn)? (\d+)").expect("position pattern is valid")
    })
}

fn string_literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*""#).expect("string literal pattern is valid")
    })
}

fn comprehension_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"\.\s*(?:{})\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*,", COMPREHENSIONS))
            .expect("comprehension pattern is valid")
    })
}

fn syntax_error(message: &str) -> SyntaxError {
    let position = position_pattern().captures(message).and_then(|caps| {
        let line = caps.get(1)?.as_str().parse().ok()?;
        let column = caps.get(2)?.as_str().parse().ok()?;
        Some(SourcePosition { line, column })
    });
    SyntaxError {
        message: message.trim().to_string(),
        position,
    }
}

/// 1-based line and column of a byte offset
fn position_at(source: &str, offset: usize) -> SourcePosition {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
    SourcePosition { line, column }
}

/// Source with string literal bytes blanked out; offsets are preserved
fn without_strings(source: &str) -> String {
    string_literal_pattern()
        .replace_all(source, |caps: &regex::Captures<'_>| " ".repeat(caps[0].len()))
        .into_owned()
}

/// First whole-word occurrence of `name` outside string literals
fn locate(code: &str, name: &str) -> Option<SourcePosition> {
    let pattern = Regex::new(&format!(r"(^|[^A-Za-z0-9_.]){}\b", regex::escape(name))).ok()?;
    pattern
        .captures(code)
        .and_then(|caps| caps.get(0).map(|m| m.end() - name.len()))
        .map(|offset| position_at(code, offset))
}

fn unknown_name(code: &str, name: &str, message: String) -> SyntaxError {
    SyntaxError {
        message,
        position: locate(code, name),
    }
}

/// Check every name the program references, returning the library
/// functions it calls paired with the spelling used at the call site
fn resolve_references(
    source: &str,
    program: &Program,
    context: &CompileContext<'_>,
) -> Result<Vec<(String, &'static LibraryFunction)>, SyntaxError> {
    let code = without_strings(source);
    let references = program.references();

    let bound: HashSet<&str> = comprehension_pattern()
        .captures_iter(&code)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let mut variables = references.variables();
    variables.sort_unstable();
    for name in variables {
        let known = name == context.context_variable
            || context.aux_types.contains_key(name)
            || bound.contains(name);
        if !known {
            return Err(unknown_name(&code, name, format!("undeclared reference to '{}'", name)));
        }
    }

    let mut names = references.functions();
    names.sort_unstable();
    let mut functions = Vec::new();
    for name in names {
        if CEL_BUILTINS.contains(&name) {
            continue;
        }
        match context.library.lookup(name) {
            Some(function) => functions.push((name.to_string(), function)),
            None => return Err(unknown_name(&code, name, format!("unknown function '{}'", name))),
        }
    }

    check_members(&code, context)?;
    Ok(functions)
}

/// Every `<context variable>.<member>` select must name a member of the value type
fn check_members(code: &str, context: &CompileContext<'_>) -> Result<(), SyntaxError> {
    let pattern = Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9_.]){}\s*\.\s*([A-Za-z_][A-Za-z0-9_]*)",
        regex::escape(context.context_variable)
    ))
    .map_err(|e| SyntaxError::new(e.to_string()))?;

    for caps in pattern.captures_iter(code) {
        let Some(member) = caps.get(1) else { continue };
        if context.value_type.member(member.as_str()).is_none() {
            return Err(SyntaxError::at(
                format!(
                    "'{}' has no member '{}' (type {})",
                    context.context_variable,
                    member.as_str(),
                    context.value_type.name()
                ),
                position_at(code, member.start()),
            ));
        }
    }
    Ok(())
}

fn register(ctx: &mut Context, spelling: &str, function: &'static LibraryFunction) {
    ctx.add_function(spelling, move |Arguments(args): Arguments| -> Result<Value, ExecutionError> {
        let values = args
            .iter()
            .map(from_cel)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExecutionError::function_error(function.name, e.to_string()))?;
        function
            .invoke(&values)
            .map(|value| to_cel(&value))
            .map_err(|e| ExecutionError::function_error(function.name, e.to_string()))
    });
}

fn body_value(body: &Record) -> Value {
    let members: HashMap<String, Value> = body
        .iter()
        .map(|(member, value)| (member.name.clone(), to_cel(value)))
        .collect();
    Value::from(members)
}

/// Native value → CEL value
pub fn to_cel(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::String(Arc::new(s.clone())),
        FieldValue::Integer(i) => Value::Int(*i),
        FieldValue::Decimal(d) => Value::Float(*d),
        FieldValue::Boolean(b) => Value::Bool(*b),
        FieldValue::DateTime(dt) => Value::Timestamp(Utc.from_utc_datetime(dt).fixed_offset()),
        FieldValue::TimeSpan(d) => Value::Duration(*d),
        FieldValue::List(items) => Value::List(Arc::new(items.iter().map(to_cel).collect())),
    }
}

/// CEL value → native value
pub fn from_cel(value: &Value) -> Result<FieldValue, EvalError> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::Int(i) => Ok(FieldValue::Integer(*i)),
        Value::UInt(u) => i64::try_from(*u)
            .map(FieldValue::Integer)
            .map_err(|_| EvalError::Execution(format!("unsigned value {} is out of range", u))),
        Value::Float(f) => Ok(FieldValue::Decimal(*f)),
        Value::String(s) => Ok(FieldValue::Text(s.as_str().to_string())),
        Value::Timestamp(ts) => Ok(FieldValue::DateTime(ts.naive_utc())),
        Value::Duration(d) => Ok(FieldValue::TimeSpan(*d)),
        Value::List(items) => items
            .iter()
            .map(from_cel)
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::List),
        other => Err(EvalError::ResultType {
            expected: "a field value".to_string(),
            actual: format!("{:?}", other),
        }),
    }
}
