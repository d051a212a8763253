//! Generates the native shim for `fixtures/demo.json` into `OUT_DIR`.
use std::path::PathBuf;

use crossbind::config::GeneratorConfig;
use crossbind::decl::AnnotatedDecl;

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let fixture = manifest_dir.join("fixtures").join("demo.json");
    println!("cargo::rerun-if-changed={}", fixture.display());

    let source = std::fs::read_to_string(&fixture).unwrap();
    let decls: Vec<AnnotatedDecl> = serde_json::from_str(&source).unwrap();
    let config = GeneratorConfig::new("demo");
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    if let Err(error) = crossbind::generate(&decls, &config, &out_dir) {
        if let crossbind::GenerateError::Diagnostics(diags) = &error {
            for diagnostic in diags.iter() {
                println!("cargo::warning={diagnostic}");
            }
        }
        panic!("failed to generate bindings: {error}");
    }
}
