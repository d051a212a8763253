//! Generator configuration: library and symbol naming, managed namespace,
//! native paths and output file names.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lower::DEFAULT_FACADE_CLASS;
use crate::naming;
use crate::path_de::{DecodeError, from_str_with_path};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Shared library name used in `[DllImport]`.
    pub library_name: String,
    /// Prefix of every shim symbol; derived from `library_name` when unset.
    pub symbol_prefix: Option<String>,
    /// Managed namespace; derived from `library_name` when unset.
    pub namespace: Option<String>,
    pub facade_class: String,
    /// Path under which the native declarations are reachable from the shim.
    pub native_crate_path: String,
    pub runtime_crate_path: String,
    pub native_file_name: String,
    pub managed_file_name: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            library_name: "native".to_string(),
            symbol_prefix: None,
            namespace: None,
            facade_class: DEFAULT_FACADE_CLASS.to_string(),
            native_crate_path: "crate".to_string(),
            runtime_crate_path: "::crossbind_runtime".to_string(),
            native_file_name: "bindings.rs".to_string(),
            managed_file_name: "Bindings.cs".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn new(library_name: impl Into<String>) -> Self {
        Self { library_name: library_name.into(), ..Self::default() }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = from_str_with_path(&src)
            .map_err(|source| ConfigError::Decode { path: path.to_path_buf(), source })?;
        tracing::debug!(path = %path.display(), "loaded generator config");
        config.validate()?;
        Ok(config)
    }

    pub fn symbol_prefix(&self) -> String {
        match &self.symbol_prefix {
            Some(prefix) => prefix.clone(),
            None => naming::to_snake_case(&self.library_name),
        }
    }

    pub fn namespace(&self) -> String {
        match &self.namespace {
            Some(namespace) => namespace.clone(),
            None => naming::to_pascal_case(&self.library_name),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: String| Err(ConfigError::Invalid { field, reason });
        if self.library_name.trim().is_empty() {
            return invalid("library_name", "must not be empty".into());
        }
        let prefix = self.symbol_prefix();
        if !naming::is_valid_identifier(&prefix) || prefix.starts_with("r#") {
            return invalid("symbol_prefix", format!("`{prefix}` is not a valid symbol prefix"));
        }
        let namespace = self.namespace();
        if namespace.split('.').any(|part| !naming::is_valid_identifier(part)) {
            return invalid("namespace", format!("`{namespace}` is not a valid namespace"));
        }
        if !naming::is_valid_identifier(&self.facade_class) {
            return invalid("facade_class", format!("`{}` is not a valid identifier", self.facade_class));
        }
        for (field, name) in [
            ("native_file_name", &self.native_file_name),
            ("managed_file_name", &self.managed_file_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return invalid(field, format!("`{name}` must be a plain file name"));
            }
        }
        if self.native_file_name == self.managed_file_name {
            return invalid("managed_file_name", "must differ from `native_file_name`".into());
        }
        Ok(())
    }
}
