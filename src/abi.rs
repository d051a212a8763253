//! ABI marshalling layer: how each `TypeRef` is represented on the flat
//! boundary, what every shim is called, and what its signature is.
//!
//! Both generators read the same `Shim` list, which keeps the native
//! `extern "C"` definitions and the managed `DllImport` declarations in
//! lockstep. Layouts assume an LP64 target.
use crate::ir::{
    ExportedEnum, ExportedFunction, ExportedStruct, FieldName, FunctionId, PrimitiveKind,
    Receiver, Schema, TypeId, TypeRef,
};
use crate::naming;

/// Parameter name every handle-taking shim uses for the receiver.
pub const HANDLE_PARAM: &str = "__handle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// managed → native
    In,
    /// native → managed
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbiType {
    Void,
    /// Never `Bool`; booleans cross as `U8`.
    Scalar(PrimitiveKind),
    Handle,
    /// Borrowed UTF-8 view, managed → native.
    StrView,
    /// Native-allocated bytes, native → managed.
    Buffer,
    Option(Box<AbiType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl AbiType {
    pub fn of(ty: &TypeRef, direction: Direction) -> AbiType {
        match ty {
            TypeRef::Unit => AbiType::Void,
            TypeRef::Primitive(PrimitiveKind::Bool) => AbiType::Scalar(PrimitiveKind::U8),
            TypeRef::Primitive(kind) => AbiType::Scalar(*kind),
            TypeRef::Str => match direction {
                Direction::In => AbiType::StrView,
                Direction::Out => AbiType::Buffer,
            },
            TypeRef::Handle(_) => AbiType::Handle,
            TypeRef::Option(inner) => AbiType::Option(Box::new(AbiType::of(inner, direction))),
            TypeRef::Result(ok, _) => AbiType::of(ok, Direction::Out),
            // rejected by the builder; only reachable while it checks symbols
            TypeRef::Unsupported(_) => AbiType::Void,
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            AbiType::Void => Layout { size: 0, align: 1 },
            AbiType::Scalar(kind) => Layout { size: kind.size(), align: kind.size() },
            AbiType::Handle => Layout { size: 8, align: 8 },
            AbiType::StrView => Layout { size: 16, align: 8 },
            AbiType::Buffer => Layout { size: 24, align: 8 },
            AbiType::Option(inner) => {
                let inner = inner.layout();
                let align = inner.align.max(1);
                let offset = round_up(1, inner.align);
                Layout { size: round_up(offset + inner.size, align), align }
            }
        }
    }

    /// Spelling in the native shim; `rt` is the runtime crate path.
    pub fn rust_type(&self, rt: &str) -> String {
        match self {
            AbiType::Void => "()".to_string(),
            AbiType::Scalar(kind) => kind.rust_name().to_string(),
            AbiType::Handle => "u64".to_string(),
            AbiType::StrView => format!("{rt}::FfiStr"),
            AbiType::Buffer => format!("{rt}::RustBuffer"),
            AbiType::Option(inner) => format!("{rt}::FfiOption<{}>", inner.rust_type(rt)),
        }
    }

    /// Spelling in the managed P/Invoke layer.
    pub fn csharp_type(&self) -> String {
        match self {
            AbiType::Void => "void".to_string(),
            AbiType::Scalar(kind) => csharp_scalar(*kind).to_string(),
            AbiType::Handle => "ulong".to_string(),
            AbiType::StrView => "FfiStr".to_string(),
            AbiType::Buffer => "RustBuffer".to_string(),
            AbiType::Option(inner) => format!("FfiOption{}", inner.suffix()),
        }
    }

    fn suffix(&self) -> String {
        match self {
            AbiType::Void => "Void".to_string(),
            AbiType::Scalar(kind) => naming::to_pascal_case(kind.rust_name()),
            AbiType::Handle => "Handle".to_string(),
            AbiType::StrView => "Str".to_string(),
            AbiType::Buffer => "Buffer".to_string(),
            AbiType::Option(inner) => format!("Option{}", inner.suffix()),
        }
    }
}

pub fn csharp_scalar(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::I8 => "sbyte",
        PrimitiveKind::I16 => "short",
        PrimitiveKind::I32 => "int",
        PrimitiveKind::I64 => "long",
        PrimitiveKind::U8 => "byte",
        PrimitiveKind::U16 => "ushort",
        PrimitiveKind::U32 => "uint",
        PrimitiveKind::U64 => "ulong",
        PrimitiveKind::F32 => "float",
        PrimitiveKind::F64 => "double",
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SHIM INVENTORY
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimKind {
    BufferFree,
    Ctor(TypeId),
    Free(TypeId),
    Getter { ty: TypeId, field: usize },
    VariantCtor { ty: TypeId, variant: usize },
    Tag(TypeId),
    VariantGetter { ty: TypeId, variant: usize, field: usize },
    Function(FunctionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiParam {
    /// Native-side name; generators decorate it for their language.
    pub name: String,
    pub ty: AbiType,
}

/// One flat boundary function. The trailing `&mut CallStatus` parameter is
/// implicit and appended by both generators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shim {
    pub kind: ShimKind,
    pub symbol: String,
    pub params: Vec<AbiParam>,
    pub ret: AbiType,
}

pub struct Symbols<'a> {
    prefix: &'a str,
}

impl<'a> Symbols<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut out = self.prefix.to_string();
        for part in parts {
            out.push('_');
            out.push_str(part);
        }
        out
    }

    pub fn buffer_free(&self) -> String {
        self.join(&["rustbuffer_free"])
    }

    pub fn ctor(&self, type_name: &str) -> String {
        self.join(&["ctor", &naming::to_snake_case(type_name)])
    }

    pub fn free(&self, type_name: &str) -> String {
        self.join(&["free", &naming::to_snake_case(type_name)])
    }

    pub fn getter(&self, type_name: &str, field: &str) -> String {
        self.join(&["get", &naming::to_snake_case(type_name), naming::bare(field)])
    }

    pub fn variant_ctor(&self, enum_name: &str, variant: &str) -> String {
        self.join(&["ctor", &naming::to_snake_case(enum_name), &naming::to_snake_case(variant)])
    }

    pub fn tag(&self, enum_name: &str) -> String {
        self.join(&["tag", &naming::to_snake_case(enum_name)])
    }

    pub fn variant_getter(&self, enum_name: &str, variant: &str, field: FieldName<'_>) -> String {
        let field = match field {
            FieldName::Index(i) => i.to_string(),
            FieldName::Named(name) => naming::bare(name).to_string(),
        };
        self.join(&[
            "get",
            &naming::to_snake_case(enum_name),
            &naming::to_snake_case(variant),
            &field,
        ])
    }

    pub fn function(&self, function: &ExportedFunction, schema: &Schema) -> String {
        let name = naming::bare(&function.name);
        match function.receiver.type_id() {
            None => self.join(&["fn", name]),
            Some(id) => self.join(&["method", &naming::to_snake_case(schema.type_name(id)), name]),
        }
    }
}

/// Parameter name of a payload field in a variant constructor shim.
pub fn payload_param_name(field: FieldName<'_>) -> String {
    match field {
        FieldName::Index(i) => format!("item{i}"),
        FieldName::Named(name) => name.to_string(),
    }
}

fn struct_shims(symbols: &Symbols<'_>, s: &ExportedStruct, out: &mut Vec<Shim>) {
    out.push(Shim {
        kind: ShimKind::Ctor(s.id),
        symbol: symbols.ctor(&s.name),
        params: s
            .fields
            .iter()
            .map(|f| AbiParam { name: f.name.clone(), ty: AbiType::of(&f.ty, Direction::In) })
            .collect(),
        ret: AbiType::Handle,
    });
    for (index, field) in s.fields.iter().enumerate() {
        out.push(Shim {
            kind: ShimKind::Getter { ty: s.id, field: index },
            symbol: symbols.getter(&s.name, &field.name),
            params: vec![handle_param()],
            ret: AbiType::of(&field.ty, Direction::Out),
        });
    }
    out.push(free_shim(symbols, s.id, &s.name));
}

fn enum_shims(symbols: &Symbols<'_>, e: &ExportedEnum, out: &mut Vec<Shim>) {
    for (vi, variant) in e.variants.iter().enumerate() {
        out.push(Shim {
            kind: ShimKind::VariantCtor { ty: e.id, variant: vi },
            symbol: symbols.variant_ctor(&e.name, &variant.name),
            params: variant
                .payload
                .fields()
                .into_iter()
                .map(|f| AbiParam {
                    name: payload_param_name(f.name),
                    ty: AbiType::of(f.ty, Direction::In),
                })
                .collect(),
            ret: AbiType::Handle,
        });
    }
    out.push(Shim {
        kind: ShimKind::Tag(e.id),
        symbol: symbols.tag(&e.name),
        params: vec![handle_param()],
        ret: AbiType::Scalar(PrimitiveKind::U32),
    });
    for (vi, variant) in e.variants.iter().enumerate() {
        for (fi, field) in variant.payload.fields().into_iter().enumerate() {
            out.push(Shim {
                kind: ShimKind::VariantGetter { ty: e.id, variant: vi, field: fi },
                symbol: symbols.variant_getter(&e.name, &variant.name, field.name),
                params: vec![handle_param()],
                ret: AbiType::of(field.ty, Direction::Out),
            });
        }
    }
    out.push(free_shim(symbols, e.id, &e.name));
}

fn function_shim(symbols: &Symbols<'_>, schema: &Schema, f: &ExportedFunction) -> Shim {
    let mut params = Vec::with_capacity(f.params.len() + 1);
    if f.receiver != Receiver::None {
        params.push(handle_param());
    }
    params.extend(
        f.params
            .iter()
            .map(|p| AbiParam { name: p.name.clone(), ty: AbiType::of(&p.ty, Direction::In) }),
    );
    Shim {
        kind: ShimKind::Function(f.id),
        symbol: symbols.function(f, schema),
        params,
        ret: AbiType::of(&f.returns, Direction::Out),
    }
}

fn free_shim(symbols: &Symbols<'_>, id: TypeId, name: &str) -> Shim {
    Shim {
        kind: ShimKind::Free(id),
        symbol: symbols.free(name),
        params: vec![handle_param()],
        ret: AbiType::Void,
    }
}

fn handle_param() -> AbiParam {
    AbiParam { name: HANDLE_PARAM.to_string(), ty: AbiType::Handle }
}

/// Every shim of the schema, in emission order.
pub fn shims(schema: &Schema, prefix: &str) -> Vec<Shim> {
    let symbols = Symbols::new(prefix);
    let mut out = vec![Shim {
        kind: ShimKind::BufferFree,
        symbol: symbols.buffer_free(),
        params: vec![AbiParam { name: "buf".to_string(), ty: AbiType::Buffer }],
        ret: AbiType::Void,
    }];
    for s in schema.structs.values() {
        struct_shims(&symbols, s, &mut out);
    }
    for e in schema.enums.values() {
        enum_shims(&symbols, e, &mut out);
    }
    for f in schema.functions.values() {
        out.push(function_shim(&symbols, schema, f));
    }
    out
}

/// Distinct `FfiOption` instantiations used by a shim list, in first-use
/// order.
pub fn option_types(shims: &[Shim]) -> Vec<AbiType> {
    let mut out: Vec<AbiType> = Vec::new();
    let mut visit = |ty: &AbiType| {
        if matches!(ty, AbiType::Option(_)) && !out.contains(ty) {
            out.push(ty.clone());
        }
    };
    for shim in shims {
        shim.params.iter().for_each(|p| visit(&p.ty));
        visit(&shim.ret);
    }
    out
}
