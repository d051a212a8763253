//! CLI: declarations → (generate | check | schema | encode | decode)
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indexmap::IndexSet;

use crate::config::GeneratorConfig;
use crate::decl::AnnotatedDecl;
use crate::diag::Diagnostics;
use crate::ir::Schema;
use crate::logging::LogLevel;
use crate::marshal::{self, Value};
use crate::{GenerateError, build_schema, codegen, load_declarations};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate a native C ABI shim and a managed C# wrapper from annotated declarations
#[derive(Parser, Debug)]
#[command(name = "crossbind", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// log verbosity; overrides CROSSBIND_LOG
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// build the schema and write both binding files
    Generate(GenerateOut),
    /// build the schema and report diagnostics only
    Check(CheckOut),
    /// print the resolved schema as JSON
    Schema(SchemaOut),
    /// encode a JSON value of a declared type into serialized-buffer hex
    Encode(EncodeOut),
    /// decode serialized-buffer hex (e.g. a native error payload) as a declared type
    Decode(DecodeOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more declaration files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct ConfigSettings {
    /// generator config (.json); every field is optional
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    library_name: Option<String>,

    #[arg(long)]
    symbol_prefix: Option<String>,

    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    facade_class: Option<String>,

    #[arg(long)]
    native_crate_path: Option<String>,

    #[arg(long)]
    runtime_crate_path: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DiagnosticsFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// directory receiving the native and managed files
    #[arg(short, long)]
    out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    diagnostics: DiagnosticsFormat,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    config_settings: ConfigSettings,

    #[arg(long, value_enum, default_value_t)]
    diagnostics: DiagnosticsFormat,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct EncodeOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// exported struct or enum, primitive, or `String`
    #[arg(long = "type")]
    type_name: String,

    /// value as JSON, e.g. '{"kind": "u32", "value": 7}'
    value: String,
}

#[derive(clap::Parser, Debug)]
struct DecodeOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// exported struct or enum, primitive, or `String`
    #[arg(long = "type")]
    type_name: String,

    /// buffer contents as hex; whitespace is ignored
    hex: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> anyhow::Result<Vec<AnnotatedDecl>> {
        let paths = resolve_file_path_patterns(&self.input)?;
        let decls = load_declarations(&paths, self.jq_expr.as_deref())?;
        tracing::info!(files = paths.len(), declarations = decls.len(), "inputs loaded");
        Ok(decls)
    }
}

impl ConfigSettings {
    fn resolve(&self) -> anyhow::Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)?,
            None => GeneratorConfig::default(),
        };
        let overrides = [
            (&self.library_name, &mut config.library_name),
            (&self.facade_class, &mut config.facade_class),
            (&self.native_crate_path, &mut config.native_crate_path),
            (&self.runtime_crate_path, &mut config.runtime_crate_path),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        if self.symbol_prefix.is_some() {
            config.symbol_prefix = self.symbol_prefix.clone();
        }
        if self.namespace.is_some() {
            config.namespace = self.namespace.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Generate(target) => {
                let decls = target.input_settings.load()?;
                let config = target.config_settings.resolve()?;
                let schema = match build_schema(&decls, &config) {
                    Err(GenerateError::Diagnostics(diags)) => {
                        return report_rejection(&diags, target.diagnostics);
                    }
                    other => other?,
                };
                let written = codegen::generate(&schema, &config)
                    .write(&target.out_dir, &config)
                    .with_context(|| format!("writing bindings to {}", target.out_dir.display()))?;
                for path in written {
                    eprintln!("{} {}", "wrote".green().bold(), path.display());
                }
                Ok(())
            }
            Command::Check(target) => {
                let decls = target.input_settings.load()?;
                let config = target.config_settings.resolve()?;
                match build_schema(&decls, &config) {
                    Ok(schema) => {
                        eprintln!(
                            "{} {} types, {} functions",
                            "ok".green().bold(),
                            schema.structs.len() + schema.enums.len(),
                            schema.functions.len()
                        );
                        Ok(())
                    }
                    Err(GenerateError::Diagnostics(diags)) => {
                        report_rejection(&diags, target.diagnostics)
                    }
                    Err(other) => Err(other.into()),
                }
            }
            Command::Schema(target) => {
                let decls = target.input_settings.load()?;
                let config = target.config_settings.resolve()?;
                let schema = match build_schema(&decls, &config) {
                    Err(GenerateError::Diagnostics(diags)) => {
                        return report_rejection(&diags, DiagnosticsFormat::Text);
                    }
                    other => other?,
                };
                let schema_src = serde_json::to_string_pretty(&schema)?;
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(out, &schema_src)
                        .with_context(|| format!("writing {}", out.display()))?;
                } else {
                    println!("{schema_src}");
                }
                Ok(())
            }
            Command::Encode(target) => {
                let schema = load_schema(&target.input_settings, &target.config_settings)?;
                println!("{}", encode_buffer(&schema, &target.type_name, &target.value)?);
                Ok(())
            }
            Command::Decode(target) => {
                let schema = load_schema(&target.input_settings, &target.config_settings)?;
                let value = decode_buffer(&schema, &target.type_name, &target.hex)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn report_rejection(diags: &Diagnostics, format: DiagnosticsFormat) -> anyhow::Result<()> {
    match format {
        DiagnosticsFormat::Text => eprintln!("{}", diags.render()),
        DiagnosticsFormat::Json => println!("{}", serde_json::to_string_pretty(diags)?),
    }
    bail!("{diags}; no files written")
}

fn load_schema(input: &InputSettings, config: &ConfigSettings) -> anyhow::Result<Schema> {
    let decls = input.load()?;
    let config = config.resolve()?;
    match build_schema(&decls, &config) {
        Err(GenerateError::Diagnostics(diags)) => {
            eprintln!("{}", diags.render());
            bail!("{diags}")
        }
        other => Ok(other?),
    }
}

fn encode_buffer(schema: &Schema, type_name: &str, json: &str) -> anyhow::Result<String> {
    let value: Value = serde_json::from_str(json).context("value is not a JSON-encoded value")?;
    let bytes = marshal::encode_named(schema, type_name, &value)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

fn decode_buffer(schema: &Schema, type_name: &str, hex: &str) -> anyhow::Result<Value> {
    let nibbles = hex
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| {
            c.to_digit(16)
                .map(|d| d as u8)
                .with_context(|| format!("`{c}` is not a hex digit"))
        })
        .collect::<anyhow::Result<Vec<u8>>>()?;
    if nibbles.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    let bytes: Vec<u8> = nibbles.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect();
    Ok(marshal::decode_named(schema, type_name, &bytes)?)
}

/// Literal paths keep the order given; each glob's matches are sorted so
/// declaration order, and with it every discriminant, is stable. Repeats
/// are dropped.
fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = IndexSet::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if !has_glob_chars(pattern) {
            out.insert(PathBuf::from(pattern));
            continue;
        }
        let mut matched = glob::glob(pattern)
            .with_context(|| format!("bad glob pattern: {pattern}"))?
            .collect::<Result<Vec<_>, _>>()?;
        if matched.is_empty() {
            bail!("glob pattern matched no files: {pattern}");
        }
        matched.sort();
        out.extend(matched);
    }
    Ok(out.into_iter().collect())
}
