// Resolved schema model shared by both generators. No `TypeExpr` here.
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::decl::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 11] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
    ];

    /// Native spelling, also the key the resolver matches on.
    pub fn rust_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
        }
    }

    pub fn from_rust_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.rust_name() == name)
    }

    pub fn size(self) -> usize {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeRef {
    /// No value; only as a function return or inside `Result`.
    Unit,
    Primitive(PrimitiveKind),
    Str,
    Handle(TypeId),
    Option(Box<TypeRef>),
    Result(Box<TypeRef>, Box<TypeRef>),
    Unsupported(String),
}

impl TypeRef {
    pub fn option(inner: TypeRef) -> Self {
        TypeRef::Option(Box::new(inner))
    }

    pub fn result(ok: TypeRef, err: TypeRef) -> Self {
        TypeRef::Result(Box::new(ok), Box::new(err))
    }

    pub fn is_supported(&self) -> bool {
        match self {
            TypeRef::Unsupported(_) => false,
            TypeRef::Option(inner) => inner.is_supported(),
            TypeRef::Result(ok, err) => ok.is_supported() && err.is_supported(),
            _ => true,
        }
    }

    /// Return-channel type: the success payload of a `Result`, or `self`.
    pub fn success(&self) -> &TypeRef {
        match self {
            TypeRef::Result(ok, _) => ok,
            other => other,
        }
    }

    pub fn error(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Result(_, err) => Some(err),
            _ => None,
        }
    }

    /// Every handle target reachable from this type.
    pub fn handles(&self, out: &mut Vec<TypeId>) {
        match self {
            TypeRef::Handle(id) => out.push(*id),
            TypeRef::Option(inner) => inner.handles(out),
            TypeRef::Result(ok, err) => {
                ok.handles(out);
                err.handles(out);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedStruct {
    pub id: TypeId,
    pub name: String,
    pub fields: Vec<Field>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", content = "fields", rename_all = "snake_case")]
pub enum VariantPayload {
    Unit,
    Tuple(Vec<TypeRef>),
    Struct(Vec<Field>),
}

impl VariantPayload {
    /// Fields in declared order; tuple elements are named by position.
    pub fn fields(&self) -> Vec<PayloadField<'_>> {
        match self {
            VariantPayload::Unit => Vec::new(),
            VariantPayload::Tuple(elems) => elems
                .iter()
                .enumerate()
                .map(|(index, ty)| PayloadField { name: FieldName::Index(index), ty })
                .collect(),
            VariantPayload::Struct(fields) => fields
                .iter()
                .map(|field| PayloadField { name: FieldName::Named(&field.name), ty: &field.ty })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName<'a> {
    Index(usize),
    Named(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadField<'a> {
    pub name: FieldName<'a>,
    pub ty: &'a TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub name: String,
    pub discriminant: u32,
    pub payload: VariantPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedEnum {
    pub id: TypeId,
    pub name: String,
    pub variants: Vec<Variant>,
    pub location: Location,
}

impl ExportedEnum {
    pub fn variant_by_discriminant(&self, discriminant: u32) -> Option<&Variant> {
        self.variants.get(discriminant as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "type", rename_all = "snake_case")]
pub enum Receiver {
    None,
    ByRef(TypeId),
    ByValue(TypeId),
}

impl Receiver {
    pub fn type_id(self) -> Option<TypeId> {
        match self {
            Receiver::None => None,
            Receiver::ByRef(id) | Receiver::ByValue(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    /// `&T` / `&str`: borrowed for the duration of the call.
    Borrowed,
    /// `T`: native code gets its own copy, the caller keeps theirs.
    Owned,
    /// `T`, and the caller's handle is consumed.
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub mode: ParamMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFunction {
    pub id: FunctionId,
    pub name: String,
    pub receiver: Receiver,
    pub params: Vec<Param>,
    pub returns: TypeRef,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Struct,
    Enum,
    Function,
    Reserved,
}

/// One entry in the managed top-level namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameEntry {
    pub native_name: String,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportedType<'a> {
    Struct(&'a ExportedStruct),
    Enum(&'a ExportedEnum),
}

impl<'a> ExportedType<'a> {
    pub fn name(self) -> &'a str {
        match self {
            ExportedType::Struct(s) => &s.name,
            ExportedType::Enum(e) => &e.name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub structs: IndexMap<TypeId, ExportedStruct>,
    pub enums: IndexMap<TypeId, ExportedEnum>,
    pub functions: IndexMap<FunctionId, ExportedFunction>,
    /// Managed identifier → declaration it renders from.
    pub names: IndexMap<String, NameEntry>,
}

impl Schema {
    pub fn exported(&self, id: TypeId) -> Option<ExportedType<'_>> {
        if let Some(s) = self.structs.get(&id) {
            return Some(ExportedType::Struct(s));
        }
        self.enums.get(&id).map(ExportedType::Enum)
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        self.exported(id).map(ExportedType::name).unwrap_or("<unknown>")
    }

    pub fn is_enum(&self, id: TypeId) -> bool {
        self.enums.contains_key(&id)
    }

    /// Free functions (no receiver), in declaration order.
    pub fn free_functions(&self) -> impl Iterator<Item = &ExportedFunction> {
        self.functions.values().filter(|f| f.receiver == Receiver::None)
    }

    pub fn methods_of(&self, id: TypeId) -> impl Iterator<Item = &ExportedFunction> {
        self.functions.values().filter(move |f| f.receiver.type_id() == Some(id))
    }
}
