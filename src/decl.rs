//! Input model: annotated native declarations as handed over by the front-end.
//!
//! The front-end has already parsed native syntax and picked out every item
//! carrying the export marker; we only see the resulting JSON.
use std::fmt;

use serde::{Deserialize, Serialize};

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotatedDecl {
    Struct(StructDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
}

impl AnnotatedDecl {
    pub fn name(&self) -> &str {
        match self {
            AnnotatedDecl::Struct(decl) => &decl.name,
            AnnotatedDecl::Enum(decl) => &decl.name,
            AnnotatedDecl::Function(decl) => &decl.name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            AnnotatedDecl::Struct(decl) => &decl.location,
            AnnotatedDecl::Enum(decl) => &decl.location,
            AnnotatedDecl::Function(decl) => &decl.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<VariantDecl>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    #[serde(default)]
    pub payload: PayloadDecl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PayloadDecl {
    #[default]
    Unit,
    Tuple { elems: Vec<TypeExpr> },
    Struct { fields: Vec<FieldDecl> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub receiver: Option<ReceiverDecl>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default = "TypeExpr::unit")]
    pub returns: TypeExpr,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverDecl {
    pub type_name: String,
    pub mode: ReceiverMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverMode {
    /// `&self`
    Ref,
    /// `self`
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    /// Ownership of the argument moves into native code.
    #[serde(default)]
    pub transfer: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// LOCATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self { file: Some(file.into()), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{file}"),
            (Some(file), line) => write!(f, "{file}:{line}:{}", self.column),
            (None, 0) => f.write_str("<unknown>"),
            (None, line) => write!(f, "<unknown>:{line}:{}", self.column),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

/// A native type exactly as written at the declaration site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    Path {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    Ref {
        #[serde(default)]
        mutable: bool,
        inner: Box<TypeExpr>,
    },
    Ptr {
        #[serde(default)]
        mutable: bool,
        inner: Box<TypeExpr>,
    },
    Tuple {
        #[serde(default)]
        elems: Vec<TypeExpr>,
    },
    Slice {
        inner: Box<TypeExpr>,
    },
    Array {
        inner: Box<TypeExpr>,
        len: usize,
    },
    Generic {
        name: String,
    },
    TraitObject {
        bound: String,
    },
}

impl TypeExpr {
    pub fn unit() -> Self {
        TypeExpr::Tuple { elems: Vec::new() }
    }

    pub fn path(name: impl Into<String>) -> Self {
        TypeExpr::Path { name: name.into(), args: Vec::new() }
    }

    pub fn generic_path(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Path { name: name.into(), args }
    }

    pub fn option(inner: TypeExpr) -> Self {
        Self::generic_path("Option", vec![inner])
    }

    pub fn result(ok: TypeExpr, err: TypeExpr) -> Self {
        Self::generic_path("Result", vec![ok, err])
    }

    pub fn reference(inner: TypeExpr) -> Self {
        TypeExpr::Ref { mutable: false, inner: Box::new(inner) }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeExpr::Tuple { elems } if elems.is_empty())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Path { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeExpr::Ref { mutable, inner } => {
                write!(f, "&{}{inner}", if *mutable { "mut " } else { "" })
            }
            TypeExpr::Ptr { mutable, inner } => {
                write!(f, "*{} {inner}", if *mutable { "mut" } else { "const" })
            }
            TypeExpr::Tuple { elems } => {
                f.write_str("(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                if elems.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            TypeExpr::Slice { inner } => write!(f, "[{inner}]"),
            TypeExpr::Array { inner, len } => write!(f, "[{inner}; {len}]"),
            TypeExpr::Generic { name } => f.write_str(name),
            TypeExpr::TraitObject { bound } => write!(f, "dyn {bound}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_parse_from_front_end_json() {
        let src = r#"[
            {"kind": "struct", "name": "Person", "fields": [
                {"name": "name", "ty": {"kind": "path", "name": "String"}},
                {"name": "age", "ty": {"kind": "path", "name": "u32"}}
            ], "location": {"file": "src/lib.rs", "line": 3, "column": 1}},
            {"kind": "enum", "name": "Message", "variants": [
                {"name": "NoData"},
                {"name": "Toggle", "payload": {"shape": "tuple", "elems": [{"kind": "path", "name": "bool"}]}}
            ]},
            {"kind": "function", "name": "greet", "params": [
                {"name": "person", "ty": {"kind": "ref", "inner": {"kind": "path", "name": "Person"}}}
            ], "returns": {"kind": "path", "name": "String"}}
        ]"#;
        let decls: Vec<AnnotatedDecl> = serde_json::from_str(src).unwrap();
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].location().to_string(), "src/lib.rs:3:1");
        let AnnotatedDecl::Enum(message) = &decls[1] else { panic!("expected enum") };
        assert_eq!(message.variants[0].payload, PayloadDecl::Unit);
        let AnnotatedDecl::Function(greet) = &decls[2] else { panic!("expected function") };
        assert_eq!(greet.params[0].ty.to_string(), "&Person");
        assert!(!greet.params[0].transfer);
    }

    #[test]
    fn missing_return_defaults_to_unit() {
        let decl: FunctionDecl = serde_json::from_str(r#"{"name": "reset"}"#).unwrap();
        assert!(decl.returns.is_unit());
        assert_eq!(decl.location.to_string(), "<unknown>");
    }

    #[test]
    fn type_expressions_render_like_source() {
        let ty = TypeExpr::result(
            TypeExpr::option(TypeExpr::path("String")),
            TypeExpr::Ptr { mutable: true, inner: Box::new(TypeExpr::path("u8")) },
        );
        assert_eq!(ty.to_string(), "Result<Option<String>, *mut u8>");
        assert_eq!(TypeExpr::unit().to_string(), "()");
        let arr = TypeExpr::Array { inner: Box::new(TypeExpr::path("i32")), len: 4 };
        assert_eq!(arr.to_string(), "[i32; 4]");
    }
}
