//! Schema Builder: annotated declarations → validated `Schema`.
//!
//! Two passes. The declaration pass hands out ids and claims top-level
//! managed names; the resolution pass resolves every type against the
//! finished id table. Nothing short-circuits, so one run reports every
//! problem in the input, ordered by the declaration it belongs to.
use indexmap::{IndexMap, IndexSet};

use crate::abi::{self, ShimKind};
use crate::decl::{
    AnnotatedDecl, EnumDecl, FunctionDecl, Location, PayloadDecl, ReceiverMode, StructDecl,
    TypeExpr,
};
use crate::diag::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::ir::{
    DeclKind, ExportedEnum, ExportedFunction, ExportedStruct, ExportedType, Field, FunctionId,
    NameEntry, Param, ParamMode, Receiver, Schema, TypeId, TypeRef, Variant, VariantPayload,
};
use crate::naming;
use crate::resolve::{Position, TypeResolver, is_builtin_type_name, last_segment};

pub const DEFAULT_FACADE_CLASS: &str = "NativeApi";

/// Top-level managed names taken by the support code of every managed file.
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "RustBuffer",
    "FfiStr",
    "CallStatus",
    "Utf8Arg",
    "OwnedHandle",
    "ByteReader",
    "NativeMethods",
    "Ffi",
    "NativeException",
    "NativePanicException",
    "NativeContractException",
    "NativeErrorException",
];

/// Prefix of the generated `FfiOption*` structs.
pub const RESERVED_TYPE_PREFIX: &str = "FfiOption";

/// Members every generated wrapper or record already has.
pub const RESERVED_MEMBER_NAMES: &[&str] = &[
    "Dispose",
    "RawHandle",
    "Forget",
    "Free",
    "FromHandle",
    "Equals",
    "GetHashCode",
    "ToString",
    "GetType",
    "Finalize",
    "MemberwiseClone",
    "EqualityContract",
    "Deconstruct",
    "PrintMembers",
];

/// Helpers on each enum's static class, next to the variant records.
pub const ENUM_HELPER_NAMES: &[&str] = &["Decode", "Lower"];

pub fn build(decls: &[AnnotatedDecl]) -> Result<Schema, Diagnostics> {
    SchemaBuilder::new(DEFAULT_FACADE_CLASS).build(decls)
}

pub struct SchemaBuilder<'f> {
    facade_class: &'f str,
}

impl<'f> SchemaBuilder<'f> {
    pub fn new(facade_class: &'f str) -> Self {
        Self { facade_class }
    }

    pub fn build(&self, decls: &[AnnotatedDecl]) -> Result<Schema, Diagnostics> {
        let mut run = Run::new(self.facade_class);
        for (index, decl) in decls.iter().enumerate() {
            run.declare(index, decl);
        }
        tracing::debug!(
            types = run.type_ids.len(),
            functions = run.function_decls.len(),
            "declaration pass done"
        );
        run.resolve_all();
        run.check_recursion();
        run.check_symbols();
        run.finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL STATE
// ————————————————————————————————————————————————————————————————————————————

/// One managed member namespace: a class body, a record, a parameter list.
struct Members {
    owner: String,
    reserved: Vec<&'static str>,
    seen: IndexMap<String, String>,
}

impl Members {
    fn new(owner: impl Into<String>, reserved: Vec<&'static str>) -> Self {
        Self { owner: owner.into(), reserved, seen: IndexMap::new() }
    }

    fn class(owner: impl Into<String>) -> Self {
        let reserved = RESERVED_MEMBER_NAMES.iter().chain(RESERVED_TYPE_NAMES).copied().collect();
        Self::new(owner, reserved)
    }

    fn params() -> Self {
        Self::new(String::new(), Vec::new())
    }

    fn claim(&mut self, managed: &str, native: &str) -> Result<(), String> {
        if managed == self.owner {
            return Err(format!(
                "`{native}` renders to `{managed}`, the name of its enclosing type"
            ));
        }
        if self.reserved.contains(&managed) {
            return Err(format!(
                "`{native}` renders to `{managed}`, which generated code already uses here"
            ));
        }
        if let Some(other) = self.seen.get(managed) {
            return Err(format!("`{native}` and `{other}` both render to `{managed}`"));
        }
        self.seen.insert(managed.to_string(), native.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Owner {
    Facade,
    Type(TypeId),
}

struct Run<'d> {
    pending: Vec<(usize, Diagnostic)>,
    type_ids: IndexMap<String, TypeId>,
    struct_ids: IndexSet<TypeId>,
    type_decls: Vec<(TypeId, usize, &'d AnnotatedDecl)>,
    function_keys: IndexSet<(Option<String>, String)>,
    function_decls: Vec<(FunctionId, usize, &'d FunctionDecl)>,
    type_origin: IndexMap<TypeId, usize>,
    function_origin: IndexMap<FunctionId, usize>,
    facade: Members,
    members: IndexMap<TypeId, Members>,
    schema: Schema,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'d> Run<'d> {
    fn new(facade_class: &str) -> Self {
        let mut schema = Schema::default();
        for name in RESERVED_TYPE_NAMES.iter().copied().chain([facade_class]) {
            schema.names.insert(
                name.to_string(),
                NameEntry { native_name: name.to_string(), kind: DeclKind::Reserved },
            );
        }
        Self {
            pending: Vec::new(),
            type_ids: IndexMap::new(),
            struct_ids: IndexSet::new(),
            type_decls: Vec::new(),
            function_keys: IndexSet::new(),
            function_decls: Vec::new(),
            type_origin: IndexMap::new(),
            function_origin: IndexMap::new(),
            facade: Members::class(facade_class),
            members: IndexMap::new(),
            schema,
        }
    }

    fn report(
        &mut self,
        index: usize,
        kind: DiagnosticKind,
        location: &Location,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.pending.push((index, Diagnostic::new(kind, location, subject, message)));
    }

    // ———— declaration pass ————

    fn declare(&mut self, index: usize, decl: &'d AnnotatedDecl) {
        let name = decl.name();
        let location = decl.location();
        if !self.identifier(index, location, name, name) {
            return;
        }
        match decl {
            AnnotatedDecl::Struct(_) | AnnotatedDecl::Enum(_) => {
                if is_builtin_type_name(name) {
                    self.report(
                        index,
                        DiagnosticKind::InvalidIdentifier,
                        location,
                        name,
                        format!("`{name}` would shadow the built-in type of the same name"),
                    );
                    return;
                }
                if self.type_ids.contains_key(name) {
                    self.report(
                        index,
                        DiagnosticKind::DuplicateDeclaration,
                        location,
                        name,
                        format!("type `{name}` is declared more than once"),
                    );
                    return;
                }
                let id = TypeId(self.type_ids.len() as u32);
                self.type_ids.insert(name.to_string(), id);
                self.type_decls.push((id, index, decl));
                self.type_origin.insert(id, index);
                let managed = naming::to_pascal_case(name);
                if let AnnotatedDecl::Struct(_) = decl {
                    self.struct_ids.insert(id);
                    self.claim(index, location, name, &managed, DeclKind::Struct);
                    self.members.insert(id, Members::class(managed));
                } else {
                    self.claim(index, location, name, &managed, DeclKind::Enum);
                    self.claim(index, location, name, &format!("I{managed}"), DeclKind::Enum);
                    let mut members = Members::class(managed);
                    members.reserved.extend(ENUM_HELPER_NAMES);
                    self.members.insert(id, members);
                }
            }
            AnnotatedDecl::Function(function) => {
                let owner = function
                    .receiver
                    .as_ref()
                    .map(|r| last_segment(&r.type_name).to_string());
                let key = (owner, function.name.clone());
                if self.function_keys.contains(&key) {
                    let subject = qualified(key.0.as_deref(), &function.name);
                    self.report(
                        index,
                        DiagnosticKind::DuplicateDeclaration,
                        location,
                        subject.clone(),
                        format!("`{subject}` is declared more than once"),
                    );
                    return;
                }
                self.function_keys.insert(key);
                if function.receiver.is_none() {
                    let managed = naming::to_pascal_case(&function.name);
                    self.claim(index, location, &function.name, &managed, DeclKind::Function);
                }
                let id = FunctionId(self.function_decls.len() as u32);
                self.function_decls.push((id, index, function));
                self.function_origin.insert(id, index);
            }
        }
    }

    /// Claim a top-level managed name.
    fn claim(
        &mut self,
        index: usize,
        location: &Location,
        native: &str,
        managed: &str,
        kind: DeclKind,
    ) {
        let existing = self
            .schema
            .names
            .get(managed)
            .map(|entry| (entry.kind, entry.native_name.clone()));
        let message = match existing {
            Some((DeclKind::Reserved, _)) => format!(
                "`{native}` renders to `{managed}`, which is reserved for generated support code"
            ),
            Some((_, other)) => {
                format!("`{native}` and `{other}` both render to managed name `{managed}`")
            }
            None if managed.starts_with(RESERVED_TYPE_PREFIX) => format!(
                "`{native}` renders to `{managed}`; the `{RESERVED_TYPE_PREFIX}` prefix is reserved for generated support code"
            ),
            None => {
                self.schema.names.insert(
                    managed.to_string(),
                    NameEntry { native_name: native.to_string(), kind },
                );
                return;
            }
        };
        self.report(index, DiagnosticKind::NameCollision, location, native, message);
    }

    fn claim_member(
        &mut self,
        index: usize,
        location: &Location,
        subject: &str,
        owner: Owner,
        managed: &str,
        native: &str,
    ) {
        let outcome = match owner {
            Owner::Facade => self.facade.claim(managed, native),
            Owner::Type(id) => match self.members.get_mut(&id) {
                Some(members) => members.claim(managed, native),
                None => Ok(()),
            },
        };
        if let Err(message) = outcome {
            self.report(index, DiagnosticKind::NameCollision, location, subject, message);
        }
    }

    fn identifier(&mut self, index: usize, location: &Location, subject: &str, name: &str) -> bool {
        let problem = if !naming::is_valid_identifier(name) {
            format!("`{name}` is not a valid identifier")
        } else if naming::bare(name).starts_with("__") {
            format!("`{name}`: names starting with `__` are reserved for generated code")
        } else {
            return true;
        };
        self.report(index, DiagnosticKind::InvalidIdentifier, location, subject, problem);
        false
    }

    // ———— resolution pass ————

    fn resolve_all(&mut self) {
        for (id, index, decl) in self.type_decls.clone() {
            match decl {
                AnnotatedDecl::Struct(s) => self.resolve_struct(id, index, s),
                AnnotatedDecl::Enum(e) => self.resolve_enum(id, index, e),
                AnnotatedDecl::Function(_) => {}
            }
        }
        for (id, index, function) in self.function_decls.clone() {
            self.resolve_function(id, index, function);
        }
        tracing::debug!(
            structs = self.schema.structs.len(),
            enums = self.schema.enums.len(),
            functions = self.schema.functions.len(),
            "resolution pass done"
        );
    }

    /// Resolve one type expression, reporting it when unsupported.
    fn resolve_type(
        &mut self,
        index: usize,
        location: &Location,
        subject: &str,
        expr: &TypeExpr,
        position: Position,
    ) -> TypeRef {
        let ty = TypeResolver::new(&self.type_ids).resolve(expr, position);
        if let TypeRef::Unsupported(reason) = &ty {
            let message = format!("{reason} (in `{subject}`)");
            self.report(index, DiagnosticKind::UnsupportedType, location, subject, message);
        }
        ty
    }

    fn resolve_struct(&mut self, id: TypeId, index: usize, decl: &StructDecl) {
        let location = &decl.location;
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let subject = format!("{}.{}", decl.name, field.name);
            if !self.identifier(index, location, &subject, &field.name) {
                continue;
            }
            let managed = naming::to_pascal_case(&field.name);
            self.claim_member(index, location, &subject, Owner::Type(id), &managed, &field.name);
            let ty = self.resolve_type(index, location, &subject, &field.ty, Position::Field);
            fields.push(Field { name: field.name.clone(), ty });
        }
        self.schema.structs.insert(
            id,
            ExportedStruct { id, name: decl.name.clone(), fields, location: location.clone() },
        );
    }

    fn resolve_enum(&mut self, id: TypeId, index: usize, decl: &EnumDecl) {
        let location = &decl.location;
        if decl.variants.is_empty() {
            self.report(
                index,
                DiagnosticKind::EmptyEnum,
                location,
                &decl.name,
                format!("enum `{}` has no variants, so no value of it can exist", decl.name),
            );
        }
        let mut variants = Vec::with_capacity(decl.variants.len());
        for (position, variant) in decl.variants.iter().enumerate() {
            let subject = format!("{}::{}", decl.name, variant.name);
            if !self.identifier(index, location, &subject, &variant.name) {
                continue;
            }
            let record = naming::to_pascal_case(&variant.name);
            self.claim_member(index, location, &subject, Owner::Type(id), &record, &variant.name);
            let payload = match &variant.payload {
                PayloadDecl::Unit => VariantPayload::Unit,
                PayloadDecl::Tuple { elems } => VariantPayload::Tuple(
                    elems
                        .iter()
                        .enumerate()
                        .map(|(i, elem)| {
                            let subject = format!("{subject}.{i}");
                            self.resolve_type(index, location, &subject, elem, Position::Field)
                        })
                        .collect(),
                ),
                PayloadDecl::Struct { fields } => {
                    let mut members = Members::class(record);
                    let mut resolved = Vec::with_capacity(fields.len());
                    for field in fields {
                        let subject = format!("{subject}.{}", field.name);
                        if !self.identifier(index, location, &subject, &field.name) {
                            continue;
                        }
                        let managed = naming::to_pascal_case(&field.name);
                        if let Err(message) = members.claim(&managed, &field.name) {
                            self.report(
                                index,
                                DiagnosticKind::NameCollision,
                                location,
                                &subject,
                                message,
                            );
                        }
                        let ty =
                            self.resolve_type(index, location, &subject, &field.ty, Position::Field);
                        resolved.push(Field { name: field.name.clone(), ty });
                    }
                    VariantPayload::Struct(resolved)
                }
            };
            variants.push(Variant {
                name: variant.name.clone(),
                discriminant: position as u32,
                payload,
            });
        }
        self.schema.enums.insert(
            id,
            ExportedEnum { id, name: decl.name.clone(), variants, location: location.clone() },
        );
    }

    fn resolve_function(&mut self, id: FunctionId, index: usize, decl: &FunctionDecl) {
        let location = &decl.location;
        let owner_name = decl.receiver.as_ref().map(|r| last_segment(&r.type_name));
        let subject = qualified(owner_name, &decl.name);
        let managed = naming::to_pascal_case(&decl.name);

        let receiver = match &decl.receiver {
            None => {
                self.claim_member(index, location, &subject, Owner::Facade, &managed, &decl.name);
                Receiver::None
            }
            Some(r) => match self.type_ids.get(last_segment(&r.type_name)).copied() {
                Some(ty) => {
                    self.claim_member(index, location, &subject, Owner::Type(ty), &managed, &decl.name);
                    match r.mode {
                        ReceiverMode::Ref => Receiver::ByRef(ty),
                        ReceiverMode::Value => Receiver::ByValue(ty),
                    }
                }
                None => {
                    self.report(
                        index,
                        DiagnosticKind::InvalidReceiver,
                        location,
                        &subject,
                        format!("receiver `{}` is not an exported struct or enum", r.type_name),
                    );
                    Receiver::None
                }
            },
        };

        let mut names = Members::params();
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let subject = format!("{subject}({})", param.name);
            if !self.identifier(index, location, &subject, &param.name) {
                continue;
            }
            if let Err(message) = names.claim(&naming::to_camel_case(&param.name), &param.name) {
                self.report(index, DiagnosticKind::NameCollision, location, &subject, message);
            }
            let ty = self.resolve_type(index, location, &subject, &param.ty, Position::Param);
            let mode = TypeResolver::param_mode(&param.ty, param.transfer);
            if mode == ParamMode::Transfer && !self.is_struct_handle(&ty) {
                self.report(
                    index,
                    DiagnosticKind::InvalidTransfer,
                    location,
                    &subject,
                    format!(
                        "`transfer` needs a by-value exported struct, found `{}`",
                        param.ty
                    ),
                );
            }
            if param.transfer && mode == ParamMode::Borrowed {
                self.report(
                    index,
                    DiagnosticKind::InvalidTransfer,
                    location,
                    &subject,
                    format!("`transfer` cannot apply to the borrowed `{}`", param.ty),
                );
            }
            params.push(Param { name: param.name.clone(), ty, mode });
        }

        let returns = self.resolve_type(
            index,
            location,
            &format!("{subject} -> {}", decl.returns),
            &decl.returns,
            Position::Return,
        );
        self.schema.functions.insert(
            id,
            ExportedFunction {
                id,
                name: decl.name.clone(),
                receiver,
                params,
                returns,
                location: location.clone(),
            },
        );
    }

    fn is_struct_handle(&self, ty: &TypeRef) -> bool {
        matches!(ty, TypeRef::Handle(id) if self.struct_ids.contains(id))
    }

    // ———— whole-schema checks ————

    fn edges(&self, id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        if let Some(s) = self.schema.structs.get(&id) {
            s.fields.iter().for_each(|f| f.ty.handles(&mut out));
        }
        if let Some(e) = self.schema.enums.get(&id) {
            for variant in &e.variants {
                variant.payload.fields().iter().for_each(|f| f.ty.handles(&mut out));
            }
        }
        out
    }

    /// Shortest path from `start` back to itself, if any.
    fn cycle_from(&self, start: TypeId) -> Option<Vec<TypeId>> {
        let mut visited = IndexSet::new();
        let mut queue = std::collections::VecDeque::from([vec![start]]);
        while let Some(path) = queue.pop_front() {
            let Some(&node) = path.last() else { continue };
            for next in self.edges(node) {
                let mut extended = path.clone();
                extended.push(next);
                if next == start {
                    return Some(extended);
                }
                if visited.insert(next) {
                    queue.push_back(extended);
                }
            }
        }
        None
    }

    fn check_recursion(&mut self) {
        let ids: Vec<TypeId> = self.type_origin.keys().copied().collect();
        for id in ids {
            let Some(cycle) = self.cycle_from(id) else { continue };
            let path = cycle
                .iter()
                .map(|t| self.schema.type_name(*t))
                .collect::<Vec<_>>()
                .join(" → ");
            let name = self.schema.type_name(id).to_string();
            let location = self.type_location(id);
            let index = self.type_origin[&id];
            self.report(
                index,
                DiagnosticKind::UnsupportedType,
                &location,
                name.as_str(),
                format!("recursive type `{name}` ({path}) has no finite boundary representation"),
            );
        }
    }

    fn type_location(&self, id: TypeId) -> Location {
        match self.schema.exported(id) {
            Some(ExportedType::Struct(s)) => s.location.clone(),
            Some(ExportedType::Enum(e)) => e.location.clone(),
            None => Location::default(),
        }
    }

    /// Where a shim comes from: declaration index, location and a subject.
    fn shim_origin(&self, kind: ShimKind) -> Option<(usize, Location, String)> {
        let type_origin = |id: TypeId, member: Option<String>| {
            let name = self.schema.type_name(id);
            let subject = match member {
                Some(member) => format!("{name}.{member}"),
                None => name.to_string(),
            };
            Some((*self.type_origin.get(&id)?, self.type_location(id), subject))
        };
        match kind {
            ShimKind::BufferFree => None,
            ShimKind::Ctor(id) | ShimKind::Free(id) | ShimKind::Tag(id) => type_origin(id, None),
            ShimKind::Getter { ty, field } => {
                let name = self.schema.structs.get(&ty)?.fields.get(field)?.name.clone();
                type_origin(ty, Some(name))
            }
            ShimKind::VariantCtor { ty, variant } | ShimKind::VariantGetter { ty, variant, .. } => {
                let name = self.schema.enums.get(&ty)?.variants.get(variant)?.name.clone();
                type_origin(ty, Some(name))
            }
            ShimKind::Function(id) => {
                let function = self.schema.functions.get(&id)?;
                let owner = function.receiver.type_id().map(|t| self.schema.type_name(t));
                Some((
                    *self.function_origin.get(&id)?,
                    function.location.clone(),
                    qualified(owner, &function.name),
                ))
            }
        }
    }

    fn check_symbols(&mut self) {
        let mut seen: IndexMap<String, String> = IndexMap::new();
        let mut clashes = Vec::new();
        for shim in abi::shims(&self.schema, "*") {
            let Some((index, location, subject)) = self.shim_origin(shim.kind) else { continue };
            match seen.get(&shim.symbol) {
                Some(first) if *first != subject => clashes.push((
                    index,
                    location,
                    subject.clone(),
                    format!(
                        "shim symbol `{}` is generated for both `{first}` and `{subject}`",
                        shim.symbol
                    ),
                )),
                Some(_) => {}
                None => {
                    seen.insert(shim.symbol, subject);
                }
            }
        }
        for (index, location, subject, message) in clashes {
            self.report(index, DiagnosticKind::NameCollision, &location, subject, message);
        }
    }

    fn finish(mut self) -> Result<Schema, Diagnostics> {
        if self.pending.is_empty() {
            tracing::debug!(names = self.schema.names.len(), "schema built");
            return Ok(self.schema);
        }
        self.pending.sort_by_key(|(index, _)| *index);
        let mut diagnostics = Diagnostics::new();
        for (_, diagnostic) in self.pending {
            diagnostics.push(diagnostic);
        }
        tracing::warn!(count = diagnostics.len(), "declarations rejected");
        Err(diagnostics)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn qualified(owner: Option<&str>, name: &str) -> String {
    match owner {
        Some(owner) => format!("{owner}::{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ir::PrimitiveKind;

    fn decls(value: serde_json::Value) -> Vec<AnnotatedDecl> {
        serde_json::from_value(value).unwrap()
    }

    fn path(name: &str) -> serde_json::Value {
        json!({"kind": "path", "name": name})
    }

    fn reference(inner: serde_json::Value) -> serde_json::Value {
        json!({"kind": "ref", "inner": inner})
    }

    fn demo() -> serde_json::Value {
        json!([
            {"kind": "struct", "name": "Person", "fields": [
                {"name": "name", "ty": path("String")},
                {"name": "age", "ty": path("u32")}
            ]},
            {"kind": "enum", "name": "Message", "variants": [
                {"name": "NoData"},
                {"name": "Toggle", "payload": {"shape": "tuple", "elems": [path("bool")]}},
                {"name": "KeyValue", "payload": {"shape": "struct", "fields": [
                    {"name": "key", "ty": path("String")},
                    {"name": "value", "ty": path("String")}
                ]}}
            ]},
            {"kind": "function", "name": "greet",
             "params": [{"name": "person", "ty": reference(path("Person"))}],
             "returns": path("String")},
            {"kind": "function", "name": "birthday",
             "receiver": {"type_name": "Person", "mode": "value"},
             "returns": path("Person")},
            {"kind": "function", "name": "adopt",
             "params": [{"name": "person", "ty": path("Person"), "transfer": true}]}
        ])
    }

    fn rejected(value: serde_json::Value) -> Diagnostics {
        build(&decls(value)).expect_err("expected diagnostics")
    }

    #[test]
    fn schema_dumps_as_json() {
        let schema = build(&decls(demo())).unwrap();
        let dump = serde_json::to_value(&schema).unwrap();
        assert_eq!(dump["structs"]["0"]["name"], "Person");
        assert_eq!(dump["structs"]["0"]["fields"][1]["ty"], json!({"kind": "primitive", "of": "u32"}));
        assert_eq!(dump["enums"]["1"]["variants"][1]["payload"]["shape"], "tuple");
    }

    #[test]
    fn builds_a_resolved_schema() {
        let schema = build(&decls(demo())).unwrap();
        let person = &schema.structs[&TypeId(0)];
        assert_eq!(person.fields[1].ty, TypeRef::Primitive(PrimitiveKind::U32));
        let message = &schema.enums[&TypeId(1)];
        let discriminants: Vec<u32> = message.variants.iter().map(|v| v.discriminant).collect();
        assert_eq!(discriminants, [0, 1, 2]);
        let greet = &schema.functions[&FunctionId(0)];
        assert_eq!(greet.params[0].ty, TypeRef::Handle(TypeId(0)));
        assert_eq!(greet.params[0].mode, ParamMode::Borrowed);
        assert_eq!(schema.functions[&FunctionId(1)].receiver, Receiver::ByValue(TypeId(0)));
        assert_eq!(schema.functions[&FunctionId(2)].params[0].mode, ParamMode::Transfer);
        assert_eq!(schema.names["IMessage"].native_name, "Message");
        assert_eq!(schema.names[DEFAULT_FACADE_CLASS].kind, DeclKind::Reserved);
    }

    #[test]
    fn reordering_variants_changes_discriminants() {
        let enum_of = |names: &[&str]| {
            let variants: Vec<_> = names.iter().map(|n| json!({"name": n})).collect();
            let schema =
                build(&decls(json!([{"kind": "enum", "name": "E", "variants": variants}]))).unwrap();
            schema.enums[&TypeId(0)]
                .variants
                .iter()
                .map(|v| (v.name.clone(), v.discriminant))
                .collect::<Vec<_>>()
        };
        let before = enum_of(&["A", "B"]);
        let after = enum_of(&["B", "A"]);
        assert_eq!(before[0], ("A".to_string(), 0));
        assert_eq!(after[1], ("A".to_string(), 1));
    }

    #[test]
    fn every_problem_is_reported_in_declaration_order() {
        let diags = rejected(json!([
            {"kind": "function", "name": "poke", "receiver": {"type_name": "Ghost", "mode": "ref"}},
            {"kind": "struct", "name": "Person", "fields": [
                {"name": "tags", "ty": {"kind": "path", "name": "Vec", "args": [path("String")]}}
            ]},
            {"kind": "enum", "name": "Never"}
        ]));
        let kinds: Vec<DiagnosticKind> = diags.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            [
                DiagnosticKind::InvalidReceiver,
                DiagnosticKind::UnsupportedType,
                DiagnosticKind::EmptyEnum
            ]
        );
        let unsupported = &diags.0[1];
        assert_eq!(unsupported.subject, "Person.tags");
        assert!(unsupported.message.contains("`Vec<String>`"), "{}", unsupported.message);
    }

    #[test]
    fn duplicates_are_rejected() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "Person"},
            {"kind": "enum", "name": "Person", "variants": [{"name": "A"}]},
            {"kind": "function", "name": "age", "receiver": {"type_name": "Person", "mode": "ref"}},
            {"kind": "function", "name": "age", "receiver": {"type_name": "Person", "mode": "value"}},
            {"kind": "function", "name": "age"}
        ]));
        assert_eq!(diags.of_kind(DiagnosticKind::DuplicateDeclaration).count(), 2);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn managed_name_collisions() {
        let cases = [
            json!([{"kind": "struct", "name": "foo_bar"}, {"kind": "struct", "name": "FooBar"}]),
            json!([
                {"kind": "enum", "name": "Shape", "variants": [{"name": "Dot"}]},
                {"kind": "struct", "name": "IShape"}
            ]),
            json!([{"kind": "struct", "name": "RustBuffer"}]),
            json!([{"kind": "struct", "name": "FfiOptionThing"}]),
            json!([{"kind": "struct", "name": "NativeApi"}]),
            json!([{"kind": "struct", "name": "Person", "fields": [{"name": "dispose", "ty": path("u8")}]}]),
            json!([{"kind": "struct", "name": "Person", "fields": [{"name": "person", "ty": path("u8")}]}]),
            json!([{"kind": "struct", "name": "Person", "fields": [
                {"name": "user_id", "ty": path("u8")}, {"name": "userId", "ty": path("u8")}
            ]}]),
            json!([
                {"kind": "struct", "name": "Person", "fields": [{"name": "name", "ty": path("String")}]},
                {"kind": "function", "name": "name", "receiver": {"type_name": "Person", "mode": "ref"},
                 "returns": path("String")}
            ]),
            json!([{"kind": "enum", "name": "Shape", "variants": [{"name": "Shape"}]}]),
            json!([{"kind": "enum", "name": "Shape", "variants": [{"name": "Decode"}]}]),
            json!([{"kind": "enum", "name": "Shape", "variants": [{"name": "Dot", "payload":
                {"shape": "struct", "fields": [{"name": "dot", "ty": path("u8")}]}}]}]),
            json!([{"kind": "function", "name": "f", "params": [
                {"name": "a_b", "ty": path("u8")}, {"name": "aB", "ty": path("u8")}
            ]}]),
        ];
        for case in cases {
            let diags = rejected(case.clone());
            assert!(diags.has_kind(DiagnosticKind::NameCollision), "{case}: {diags:?}");
        }
    }

    #[test]
    fn free_functions_share_the_type_namespace() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "Person"},
            {"kind": "function", "name": "person"}
        ]));
        let collision = diags.of_kind(DiagnosticKind::NameCollision).next().unwrap();
        assert_eq!(collision.subject, "person");
        assert!(collision.message.contains("`person` and `Person`"), "{}", collision.message);

        let schema = build(&decls(demo())).unwrap();
        assert_eq!(schema.names["Greet"].kind, DeclKind::Function);
        assert_eq!(schema.names["Greet"].native_name, "greet");
        assert!(!schema.names.contains_key("Birthday"));
    }

    #[test]
    fn colliding_shim_symbols_are_rejected() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "FooBar", "fields": [{"name": "baz", "ty": path("u8")}]},
            {"kind": "struct", "name": "Foo", "fields": [{"name": "bar_baz", "ty": path("u8")}]}
        ]));
        let collision = diags.of_kind(DiagnosticKind::NameCollision).next().unwrap();
        assert_eq!(collision.subject, "Foo.bar_baz");
        assert!(collision.message.contains("`*_get_foo_bar_baz`"), "{}", collision.message);
    }

    #[test]
    fn invalid_identifiers() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "9lives"},
            {"kind": "function", "name": "f", "params": [{"name": "__handle", "ty": path("u8")}]}
        ]));
        assert_eq!(diags.of_kind(DiagnosticKind::InvalidIdentifier).count(), 2);
    }

    #[test]
    fn exported_types_cannot_shadow_builtins() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "String", "fields": [{"name": "len", "ty": path("u32")}]},
            {"kind": "enum", "name": "u8", "variants": [{"name": "A"}]}
        ]));
        let invalid: Vec<&str> =
            diags.of_kind(DiagnosticKind::InvalidIdentifier).map(|d| d.subject.as_str()).collect();
        assert_eq!(invalid, ["String", "u8"]);
    }

    #[test]
    fn transfer_needs_a_by_value_struct() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "Person"},
            {"kind": "enum", "name": "Mood", "variants": [{"name": "Happy"}]},
            {"kind": "function", "name": "a",
             "params": [{"name": "p", "ty": reference(path("Person")), "transfer": true}]},
            {"kind": "function", "name": "b",
             "params": [{"name": "n", "ty": path("u32"), "transfer": true}]},
            {"kind": "function", "name": "c",
             "params": [{"name": "m", "ty": path("Mood"), "transfer": true}]}
        ]));
        assert_eq!(diags.of_kind(DiagnosticKind::InvalidTransfer).count(), 3);
    }

    #[test]
    fn recursive_types_are_unsupported() {
        let diags = rejected(json!([
            {"kind": "struct", "name": "Node", "fields": [
                {"name": "next", "ty": {"kind": "path", "name": "Option", "args": [path("Node")]}}
            ]}
        ]));
        let d = diags.of_kind(DiagnosticKind::UnsupportedType).next().unwrap();
        assert!(d.message.contains("Node → Node"), "{}", d.message);
    }

    #[test]
    fn methods_and_free_functions_may_share_a_name() {
        let schema = build(&decls(json!([
            {"kind": "struct", "name": "Person"},
            {"kind": "function", "name": "describe", "receiver": {"type_name": "Person", "mode": "ref"}},
            {"kind": "function", "name": "describe"}
        ])))
        .unwrap();
        assert_eq!(schema.free_functions().count(), 1);
        assert_eq!(schema.methods_of(TypeId(0)).count(), 1);
    }
}
