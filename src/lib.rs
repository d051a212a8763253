//! crossbind: generate a native `extern "C"` shim and a managed C# wrapper
//! from annotated native declarations.
//!
//! ```text
//! declarations (JSON) ──▶ lower::SchemaBuilder ──▶ ir::Schema ──┬─▶ codegen::native  ─▶ bindings.rs
//!                          (resolve, naming, diag)              └─▶ codegen::managed ─▶ Bindings.cs
//! ```
pub mod abi;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod decl;
pub mod diag;
pub mod ir;
pub mod jq_exec;
pub mod logging;
pub mod lower;
pub mod marshal;
pub mod naming;
pub mod path_de;
pub mod resolve;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, GeneratorConfig};
use crate::decl::AnnotatedDecl;
use crate::diag::Diagnostics;
use crate::ir::Schema;
use crate::jq_exec::JqError;
use crate::lower::SchemaBuilder;
use crate::path_de::DecodeError;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Diagnostics(#[from] Diagnostics),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: invalid declaration list {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("{}: {source}", path.display())]
    Jq {
        path: PathBuf,
        #[source]
        source: JqError,
    },
}

/// Build the schema with the configured facade class.
pub fn build_schema(
    decls: &[AnnotatedDecl],
    config: &GeneratorConfig,
) -> Result<Schema, GenerateError> {
    config.validate()?;
    Ok(SchemaBuilder::new(&config.facade_class).build(decls)?)
}

/// Generate both binding files into `out_dir`. When the declarations are
/// rejected nothing is written.
pub fn generate(
    decls: &[AnnotatedDecl],
    config: &GeneratorConfig,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, GenerateError> {
    let schema = build_schema(decls, config)?;
    let bindings = codegen::generate(&schema, config);
    bindings
        .write(out_dir, config)
        .map_err(|source| GenerateError::Io { path: out_dir.to_path_buf(), source })
}

/// Read declaration documents, optionally reshaping each one with a jq
/// filter first. A document is either a declaration list or a single
/// declaration.
pub fn load_declarations(
    paths: &[PathBuf],
    jq_expr: Option<&str>,
) -> Result<Vec<AnnotatedDecl>, GenerateError> {
    let mut out = Vec::new();
    for path in paths {
        let source = std::fs::read_to_string(path)
            .map_err(|source| GenerateError::Io { path: path.clone(), source })?;
        let document: serde_json::Value = serde_json::from_str(&source)
            .map_err(|source| GenerateError::Json { path: path.clone(), source })?;
        let documents = match jq_expr {
            None => vec![document],
            Some(filter) => jq_exec::run_jaq(filter, &document)
                .map_err(|source| GenerateError::Jq { path: path.clone(), source })?,
        };
        for document in documents {
            let decode = |source| GenerateError::Decode { path: path.clone(), source };
            if document.is_array() {
                let decls: Vec<AnnotatedDecl> =
                    path_de::from_value_with_path(document).map_err(decode)?;
                out.extend(decls);
            } else {
                out.push(path_de::from_value_with_path(document).map_err(decode)?);
            }
        }
        tracing::debug!(path = %path.display(), total = out.len(), "declarations loaded");
    }
    Ok(out)
}
