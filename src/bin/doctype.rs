//! Document type CLI
//!
//! Compiles schema definitions, shows their bound value types and runs the
//! document body lifecycle on JSON bodies.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use familiar_doctypes::{
    AuxContext, BodyContainer, BodyProcessor, Document, EngineConfig, FieldValue, JsonBodyCodec,
    LifecycleOptions, SchemaDefinition, SchemaError, SchemaProcessorRegistry,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "doctype")]
#[command(about = "Compile document type schemas and validate document bodies")]
struct Cli {
    /// Configuration file (layered over doctypes.toml and DOCTYPES__* variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema and report every syntax error
    Check {
        /// Schema definition (JSON)
        schema: PathBuf,
    },

    /// Show the value type a schema binds to
    Fields {
        /// Schema definition (JSON)
        schema: PathBuf,
    },

    /// Run the document lifecycle on a JSON body
    Validate {
        /// Schema definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Document body (JSON object)
        #[arg(short, long)]
        body: PathBuf,
        /// Compute formula fields before validating
        #[arg(long)]
        compute: bool,
        /// Auxiliary context value, NAME=JSON (repeatable)
        #[arg(long = "aux", value_name = "NAME=JSON")]
        aux: Vec<String>,
    },

    /// Compile every schema listed under [registry] prewarm
    Prewarm,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_schema(path: &Path) -> Result<SchemaDefinition> {
    SchemaDefinition::from_file(path).with_context(|| format!("reading schema {}", path.display()))
}

fn parse_aux(config: &EngineConfig, entries: &[String]) -> Result<AuxContext> {
    let kinds = config.compiler.aux_kinds()?;
    let mut aux = AuxContext::new();
    for entry in entries {
        let (name, raw) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("auxiliary value '{}' is not NAME=JSON", entry))?;
        let kind = kinds
            .get(name)
            .ok_or_else(|| anyhow!("auxiliary context '{}' is not declared in [compiler.aux]", name))?;
        let json: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("parsing value of '{}'", name))?;
        let value = FieldValue::from_json(&json, *kind).map_err(|reason| anyhow!("'{}': {}", name, reason))?;
        aux.insert(name, value);
    }
    Ok(aux)
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let registry = SchemaProcessorRegistry::from_config(&config)?;

    match cli.command {
        Commands::Check { schema } => {
            let definition = load_schema(&schema)?;
            match registry.processor(&definition) {
                Ok(compiled) => {
                    let info = compiled.info();
                    println!(
                        "✅ {} compiled: {} rule(s), {} formula(s), library v{}",
                        info.key, info.rule_count, info.formula_count, info.library_version
                    );
                    Ok(())
                }
                Err(SchemaError::Compilation(report)) => {
                    println!("❌ {}", report);
                    std::process::exit(1);
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Fields { schema } => {
            let definition = load_schema(&schema)?;
            let compiled = registry.processor(&definition)?;
            let value_type = compiled.value_type();

            println!("{} ({})", compiled.key(), value_type.name());
            for member in value_type.members() {
                let mut markers = Vec::new();
                if member.is_sensitive() {
                    markers.push("sensitive".to_string());
                }
                if let Some(mapping) = member.mapping() {
                    markers.push(format!("mapping={}", mapping));
                }
                if compiled.computed_fields().any(|f| f == member.name) {
                    markers.push("computed".to_string());
                }
                if markers.is_empty() {
                    println!("  {:<24} {}", member.name, member.kind);
                } else {
                    println!("  {:<24} {} [{}]", member.name, member.kind, markers.join(", "));
                }
            }
            Ok(())
        }

        Commands::Validate {
            schema,
            body,
            compute,
            aux,
        } => {
            let definition = load_schema(&schema)?;
            let compiled = registry.processor(&definition)?;
            let aux = parse_aux(&config, &aux)?;

            let payload = std::fs::read(&body).with_context(|| format!("reading body {}", body.display()))?;
            let codec = JsonBodyCodec::with_pretty(config.codec.pretty);
            let mut document = Document::new(body.display().to_string(), compiled.key().clone())
                .with_body(BodyContainer::new(payload, familiar_doctypes::codec::JSON_ENCODING));

            let options = LifecycleOptions {
                compute_fields: compute,
                reserialize: true,
            };
            let report = BodyProcessor::new(compiled, &codec).process(&mut document, &aux, options)?;

            println!("Status: {}", report.status);
            if let Some(detail) = &document.status_detail {
                println!("Detail: {}", detail);
            }
            println!("{}", serde_json::to_string_pretty(&JsonBodyCodec::to_json(&report.body))?);

            if !report.outcome.is_valid() {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Prewarm => {
            if config.registry.prewarm.is_empty() {
                bail!("no schemas listed under [registry] prewarm");
            }
            let definitions = config
                .registry
                .prewarm
                .iter()
                .map(|path| load_schema(path))
                .collect::<Result<Vec<_>>>()?;

            let report = registry.prewarm(&definitions);
            for key in &report.compiled {
                println!("  ✅ {}", key);
            }
            for (key, error) in &report.failed {
                println!("  ❌ {}: {}", key, error);
            }

            let stats = registry.stats();
            println!();
            println!("{} compiled, {} failed", stats.builds, stats.failed_builds);
            if !report.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
