//! Typed encode/decode of the serialized-buffer format.
//!
//! The generated native shims write error payloads with the runtime's
//! `WireWriter`; this module reads and writes the same bytes against a
//! `TypeRef`, and adds by-value layouts for struct records and enum values.
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crossbind_runtime::{WireError, WireReader, WireWriter};

use crate::ir::{PrimitiveKind, Schema, TypeId, TypeRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Unit,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
    Str(String),
    Handle(u64),
    Option(Option<Box<Value>>),
    /// Struct fields in declared order.
    Record(Vec<Value>),
    Variant { discriminant: u32, fields: Vec<Value> },
}

impl Value {
    pub fn some(inner: Value) -> Self {
        Value::Option(Some(Box::new(inner)))
    }

    pub fn none() -> Self {
        Value::Option(None)
    }

    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Handle(_) => "handle",
            Value::Option(_) => "option",
            Value::Record(_) => "record",
            Value::Variant { .. } => "variant",
        }
    }
}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("expected a value of type {expected}, found {found}")]
    Mismatch { expected: String, found: &'static str },
    #[error("`Result` values never cross as bytes")]
    ResultNotEncodable,
    #[error("no exported type with id {0}")]
    UnknownType(TypeId),
    #[error("`{0}` is not an exported type, a primitive or `String`")]
    UnknownTypeName(String),
    #[error("`{enum_name}` has no variant with discriminant {discriminant}")]
    UnknownDiscriminant { enum_name: String, discriminant: u32 },
    #[error("`{subject}` has {expected} field(s), got {found}")]
    FieldCount { subject: String, expected: usize, found: usize },
    #[error(transparent)]
    Wire(#[from] WireError),
}

fn mismatch(ty: &TypeRef, value: &Value) -> MarshalError {
    MarshalError::Mismatch { expected: format!("{ty:?}"), found: value.kind() }
}

// ————————————————————————————————————————————————————————————————————————————
// BOUNDARY VALUES
// ————————————————————————————————————————————————————————————————————————————

pub fn encode(value: &Value, ty: &TypeRef) -> Result<Vec<u8>, MarshalError> {
    let mut writer = WireWriter::new();
    encode_into(&mut writer, value, ty)?;
    Ok(writer.finish())
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(bytes: &[u8], ty: &TypeRef) -> Result<Value, MarshalError> {
    let mut reader = WireReader::new(bytes);
    let value = decode_from(&mut reader, ty)?;
    reader.finish()?;
    Ok(value)
}

pub fn encode_into(w: &mut WireWriter, value: &Value, ty: &TypeRef) -> Result<(), MarshalError> {
    use PrimitiveKind as P;
    match (ty, value) {
        (TypeRef::Unit, Value::Unit) => {}
        (TypeRef::Primitive(P::Bool), Value::Bool(v)) => w.write_bool(*v),
        (TypeRef::Primitive(P::I8), Value::I8(v)) => w.write_i8(*v),
        (TypeRef::Primitive(P::I16), Value::I16(v)) => w.write_i16(*v),
        (TypeRef::Primitive(P::I32), Value::I32(v)) => w.write_i32(*v),
        (TypeRef::Primitive(P::I64), Value::I64(v)) => w.write_i64(*v),
        (TypeRef::Primitive(P::U8), Value::U8(v)) => w.write_u8(*v),
        (TypeRef::Primitive(P::U16), Value::U16(v)) => w.write_u16(*v),
        (TypeRef::Primitive(P::U32), Value::U32(v)) => w.write_u32(*v),
        (TypeRef::Primitive(P::U64), Value::U64(v)) => w.write_u64(*v),
        (TypeRef::Primitive(P::F32), Value::F32(v)) => w.write_f32(v.0),
        (TypeRef::Primitive(P::F64), Value::F64(v)) => w.write_f64(v.0),
        (TypeRef::Str, Value::Str(v)) => w.write_str(v)?,
        (TypeRef::Handle(_), Value::Handle(v)) => w.write_handle(*v),
        (TypeRef::Option(_), Value::Option(None)) => w.write_presence(false),
        (TypeRef::Option(inner), Value::Option(Some(v))) => {
            w.write_presence(true);
            encode_into(w, v, inner)?;
        }
        (TypeRef::Result(..), _) => return Err(MarshalError::ResultNotEncodable),
        (ty, value) => return Err(mismatch(ty, value)),
    }
    Ok(())
}

pub fn decode_from(r: &mut WireReader<'_>, ty: &TypeRef) -> Result<Value, MarshalError> {
    use PrimitiveKind as P;
    Ok(match ty {
        TypeRef::Unit => Value::Unit,
        TypeRef::Primitive(kind) => match kind {
            P::Bool => Value::Bool(r.read_bool()?),
            P::I8 => Value::I8(r.read_i8()?),
            P::I16 => Value::I16(r.read_i16()?),
            P::I32 => Value::I32(r.read_i32()?),
            P::I64 => Value::I64(r.read_i64()?),
            P::U8 => Value::U8(r.read_u8()?),
            P::U16 => Value::U16(r.read_u16()?),
            P::U32 => Value::U32(r.read_u32()?),
            P::U64 => Value::U64(r.read_u64()?),
            P::F32 => Value::F32(OrderedFloat(r.read_f32()?)),
            P::F64 => Value::F64(OrderedFloat(r.read_f64()?)),
        },
        TypeRef::Str => Value::Str(r.read_string()?),
        TypeRef::Handle(_) => Value::Handle(r.read_handle()?),
        TypeRef::Option(inner) => {
            if r.read_presence()? {
                Value::some(decode_from(r, inner)?)
            } else {
                Value::none()
            }
        }
        TypeRef::Result(..) => return Err(MarshalError::ResultNotEncodable),
        TypeRef::Unsupported(reason) => {
            return Err(MarshalError::Mismatch { expected: reason.clone(), found: "bytes" });
        }
    })
}

// ————————————————————————————————————————————————————————————————————————————
// BY-VALUE AGGREGATES
// ————————————————————————————————————————————————————————————————————————————

fn check_arity(subject: &str, expected: usize, found: usize) -> Result<(), MarshalError> {
    if expected == found {
        Ok(())
    } else {
        Err(MarshalError::FieldCount { subject: subject.to_string(), expected, found })
    }
}

/// A struct value as its fields in declared order.
pub fn encode_record(schema: &Schema, id: TypeId, value: &Value) -> Result<Vec<u8>, MarshalError> {
    let def = schema.structs.get(&id).ok_or(MarshalError::UnknownType(id))?;
    let Value::Record(fields) = value else {
        return Err(MarshalError::Mismatch { expected: def.name.clone(), found: value.kind() });
    };
    check_arity(&def.name, def.fields.len(), fields.len())?;
    let mut w = WireWriter::new();
    for (field, value) in def.fields.iter().zip(fields) {
        encode_into(&mut w, value, &field.ty)?;
    }
    Ok(w.finish())
}

pub fn decode_record(schema: &Schema, id: TypeId, bytes: &[u8]) -> Result<Value, MarshalError> {
    let def = schema.structs.get(&id).ok_or(MarshalError::UnknownType(id))?;
    let mut r = WireReader::new(bytes);
    let fields = def
        .fields
        .iter()
        .map(|field| decode_from(&mut r, &field.ty))
        .collect::<Result<Vec<_>, _>>()?;
    r.finish()?;
    Ok(Value::Record(fields))
}

/// An enum value as a `u32` discriminant followed by the variant's fields.
pub fn encode_variant(schema: &Schema, id: TypeId, value: &Value) -> Result<Vec<u8>, MarshalError> {
    let def = schema.enums.get(&id).ok_or(MarshalError::UnknownType(id))?;
    let Value::Variant { discriminant, fields } = value else {
        return Err(MarshalError::Mismatch { expected: def.name.clone(), found: value.kind() });
    };
    let variant = def.variant_by_discriminant(*discriminant).ok_or_else(|| {
        MarshalError::UnknownDiscriminant { enum_name: def.name.clone(), discriminant: *discriminant }
    })?;
    let layout = variant.payload.fields();
    check_arity(&format!("{}::{}", def.name, variant.name), layout.len(), fields.len())?;
    let mut w = WireWriter::new();
    w.write_u32(*discriminant);
    for (field, value) in layout.iter().zip(fields) {
        encode_into(&mut w, value, field.ty)?;
    }
    Ok(w.finish())
}

pub fn decode_variant(schema: &Schema, id: TypeId, bytes: &[u8]) -> Result<Value, MarshalError> {
    let def = schema.enums.get(&id).ok_or(MarshalError::UnknownType(id))?;
    let mut r = WireReader::new(bytes);
    let discriminant = r.read_u32()?;
    let variant = def.variant_by_discriminant(discriminant).ok_or_else(|| {
        MarshalError::UnknownDiscriminant { enum_name: def.name.clone(), discriminant }
    })?;
    let fields = variant
        .payload
        .fields()
        .iter()
        .map(|field| decode_from(&mut r, field.ty))
        .collect::<Result<Vec<_>, _>>()?;
    r.finish()?;
    Ok(Value::Variant { discriminant, fields })
}

/// Encode `value` as the type called `name`: an exported struct or enum by
/// value, otherwise a primitive or `String`.
pub fn encode_named(schema: &Schema, name: &str, value: &Value) -> Result<Vec<u8>, MarshalError> {
    match named(schema, name)? {
        Named::Record(id) => encode_record(schema, id, value),
        Named::Variant(id) => encode_variant(schema, id, value),
        Named::Boundary(ty) => encode(value, &ty),
    }
}

pub fn decode_named(schema: &Schema, name: &str, bytes: &[u8]) -> Result<Value, MarshalError> {
    match named(schema, name)? {
        Named::Record(id) => decode_record(schema, id, bytes),
        Named::Variant(id) => decode_variant(schema, id, bytes),
        Named::Boundary(ty) => decode(bytes, &ty),
    }
}

enum Named {
    Record(TypeId),
    Variant(TypeId),
    Boundary(TypeRef),
}

fn named(schema: &Schema, name: &str) -> Result<Named, MarshalError> {
    if let Some(def) = schema.structs.values().find(|s| s.name == name) {
        return Ok(Named::Record(def.id));
    }
    if let Some(def) = schema.enums.values().find(|e| e.name == name) {
        return Ok(Named::Variant(def.id));
    }
    match name {
        "String" | "str" => Ok(Named::Boundary(TypeRef::Str)),
        other => PrimitiveKind::from_rust_name(other)
            .map(|kind| Named::Boundary(TypeRef::Primitive(kind)))
            .ok_or_else(|| MarshalError::UnknownTypeName(other.to_string())),
    }
}
