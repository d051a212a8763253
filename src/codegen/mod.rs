//! Code generation: the native shim file and the managed wrapper file are
//! rendered from the same schema and the same shim inventory.
pub mod managed;
pub mod native;
pub mod writer;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::GeneratorConfig;
use crate::ir::Schema;

use self::managed::ManagedCodegen;
use self::native::NativeCodegen;

/// Both generated sources, still in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBindings {
    pub native: String,
    pub managed: String,
}

pub fn generate(schema: &Schema, config: &GeneratorConfig) -> GeneratedBindings {
    let mut native = NativeCodegen::new(schema, config);
    native.emit();
    let mut managed = ManagedCodegen::new(schema, config);
    managed.emit();
    GeneratedBindings { native: native.into_string(), managed: managed.into_string() }
}

impl GeneratedBindings {
    /// Write both files into `out_dir`. Each file is staged under a
    /// temporary name first; if any rename fails, targets already replaced
    /// get their previous contents back.
    pub fn write(&self, out_dir: &Path, config: &GeneratorConfig) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)?;
        let files = [
            (out_dir.join(&config.native_file_name), &self.native),
            (out_dir.join(&config.managed_file_name), &self.managed),
        ];
        let mut staged = Vec::with_capacity(files.len());
        for (path, contents) in &files {
            let tmp = staging_path(path);
            if let Err(err) = write_file(&tmp, contents) {
                discard(&staged);
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
            staged.push((tmp, path.clone()));
        }
        let mut committed: Vec<Committed> = Vec::with_capacity(staged.len());
        for (tmp, path) in &staged {
            match commit(tmp, path) {
                Ok(entry) => committed.push(entry),
                Err(err) => {
                    roll_back(&committed);
                    discard(&staged);
                    return Err(err);
                }
            }
        }
        let mut written = Vec::with_capacity(committed.len());
        for entry in committed {
            if let Some(backup) = &entry.backup {
                let _ = fs::remove_file(backup);
            }
            tracing::info!(path = %entry.path.display(), "wrote bindings");
            written.push(entry.path);
        }
        Ok(written)
    }
}

/// A target that now holds new contents, plus the previous file if one was
/// moved aside.
struct Committed {
    path: PathBuf,
    backup: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn staging_path(path: &Path) -> PathBuf {
    sibling(path, ".crossbind-tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".crossbind-bak")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn commit(tmp: &Path, path: &Path) -> io::Result<Committed> {
    let backup = if path.is_file() {
        let backup = backup_path(path);
        fs::rename(path, &backup)?;
        Some(backup)
    } else {
        None
    };
    if let Err(err) = fs::rename(tmp, path) {
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, path);
        }
        return Err(err);
    }
    Ok(Committed { path: path.to_path_buf(), backup })
}

/// Put every already-committed target back the way it was.
fn roll_back(committed: &[Committed]) {
    for entry in committed.iter().rev() {
        match &entry.backup {
            Some(backup) => {
                let _ = fs::rename(backup, &entry.path);
            }
            None => {
                let _ = fs::remove_file(&entry.path);
            }
        }
    }
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::decl::AnnotatedDecl;
    use crate::ir::Schema;
    use crate::lower;

    pub const DEMO_JSON: &str = include_str!("../../dev-test-runner/fixtures/demo.json");

    pub fn demo_decls() -> Vec<AnnotatedDecl> {
        serde_json::from_str(DEMO_JSON).unwrap()
    }

    pub fn demo_schema() -> Schema {
        lower::build(&demo_decls()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_both_files() {
        let schema = fixtures::demo_schema();
        let config = GeneratorConfig::new("demo");
        let out = tempfile::tempdir().unwrap();
        let written = generate(&schema, &config).write(out.path(), &config).unwrap();
        assert_eq!(written.len(), 2);
        let native = fs::read_to_string(out.path().join("bindings.rs")).unwrap();
        assert!(native.starts_with("// @generated by crossbind"));
        let managed = fs::read_to_string(out.path().join("Bindings.cs")).unwrap();
        assert!(managed.contains("namespace Demo;"));
        let leftovers = fs::read_dir(out.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".crossbind-tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn failed_commit_restores_earlier_files() {
        let schema = fixtures::demo_schema();
        let config = GeneratorConfig::new("demo");
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("bindings.rs"), "// previous run").unwrap();
        // a directory in place of the managed file makes its rename fail
        fs::create_dir(out.path().join("Bindings.cs")).unwrap();

        let result = generate(&schema, &config).write(out.path(), &config);
        assert!(result.is_err());
        let native = fs::read_to_string(out.path().join("bindings.rs")).unwrap();
        assert_eq!(native, "// previous run");
        let mut names: Vec<String> = fs::read_dir(out.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["Bindings.cs", "bindings.rs"]);
    }

    #[test]
    fn failed_commit_removes_fresh_files() {
        let schema = fixtures::demo_schema();
        let config = GeneratorConfig::new("demo");
        let out = tempfile::tempdir().unwrap();
        fs::create_dir(out.path().join("Bindings.cs")).unwrap();

        assert!(generate(&schema, &config).write(out.path(), &config).is_err());
        assert!(!out.path().join("bindings.rs").exists());
        assert!(!out.path().join("bindings.rs.crossbind-tmp").exists());
        assert!(!out.path().join("Bindings.cs.crossbind-tmp").exists());
    }

    #[test]
    fn shim_symbols_match_between_languages() {
        let schema = fixtures::demo_schema();
        let config = GeneratorConfig::new("demo");
        let bindings = generate(&schema, &config);
        for shim in crate::abi::shims(&schema, "demo") {
            assert!(bindings.native.contains(&format!("fn {}(", shim.symbol)), "{}", shim.symbol);
            assert!(
                bindings.managed.contains(&format!("EntryPoint = \"{}\"", shim.symbol)),
                "{}",
                shim.symbol
            );
        }
    }
}
