//! Familiar Document Types
//!
//! Runtime compilation and evaluation of data-defined document types. A
//! schema (fields, validation rules and computed-field formulas) is bound to
//! a generated value type, its rules and formulas are compiled to callables,
//! and the result is cached per schema key until the schema changes.
//!
//! ## Features
//!
//! - **Generated value types**: one uniquely named record type per schema generation
//! - **Aggregated diagnostics**: up to 10 syntax errors reported per compilation
//! - **Function library**: date arithmetic, boolean combinators and selection helpers
//! - **Processor registry**: lazy single-flight builds, change-driven eviction
//! - **Document lifecycle**: load, compute, validate and store document bodies
//!
//! ## Architecture
//!
//! ```text
//! SchemaDefinition
//!   └─▶ SchemaTypeBinder ──▶ ValueType
//!   └─▶ RuleCompiler ──▶ CompiledSchema { value type, rules, formulas }
//!         ▲                     │
//!   SchemaProcessorRegistry ◀───┘  (evicted by SchemaChangeBus)
//!         │
//!   BodyProcessor ──▶ Document { payload, status }
//! ```

pub mod binder;
pub mod bridge;
pub mod changes;
pub mod checksum;
pub mod codec;
pub mod compiled;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod expr;
pub mod library;
pub mod registry;
pub mod schema;
pub mod types;
pub mod value;
pub mod version;
pub mod vocabulary;

pub use binder::SchemaTypeBinder;
pub use bridge::{AuxContext, EvalScope};
pub use changes::{ChangeKind, SchemaChange, SchemaChangeBus, SchemaChangeListener};
pub use checksum::Checksum;
pub use codec::{BodyCodec, JsonBodyCodec};
pub use compiled::{CompiledSchema, SchemaInfo, ValidationOutcome};
pub use compiler::{RuleCompiler, MAX_REPORTED_ERRORS};
pub use config::EngineConfig;
pub use diagnostics::{CompilationReport, CompileDiagnostic, CompileTarget};
pub use document::{BodyContainer, BodyProcessor, Document, DocumentEntity, DocumentStatus, LifecycleOptions};
pub use error::{Result, SchemaError};
pub use expr::{CelCompiler, EvalError, ExpressionCompiler};
pub use library::{FunctionLibrary, LIBRARY_VERSION};
pub use registry::{RegistryStats, SchemaProcessorRegistry};
pub use schema::{FieldDefinition, SchemaDefinition, SchemaKey, ValidationRule};
pub use types::{Record, RecordTypeGenerator, TypeGenerator, ValueType};
pub use value::FieldValue;
pub use version::TypeVersion;
pub use vocabulary::FieldKind;
