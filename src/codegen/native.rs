//! Native shim generator: one Rust source file of `extern "C"` functions
//! that lift flat arguments, call the exported item and lower the result.
//!
//! The file is meant to be `include!`d into the crate that defines the
//! exported items. Every exported type must be `Clone + Send + Sync`: values
//! live in `static` handle tables and owned arguments are cloned out of them.
use crate::abi::{self, AbiType, HANDLE_PARAM, Shim, ShimKind};
use crate::codegen::writer::SourceWriter;
use crate::config::GeneratorConfig;
use crate::ir::{
    ExportedEnum, ExportedFunction, FieldName, ParamMode, PrimitiveKind, Receiver, Schema, TypeId,
    TypeRef, Variant, VariantPayload,
};
use crate::naming;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

pub struct NativeCodegen<'a> {
    schema: &'a Schema,
    config: &'a GeneratorConfig,
    shims: Vec<Shim>,
    w: SourceWriter,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'a> NativeCodegen<'a> {
    pub fn new(schema: &'a Schema, config: &'a GeneratorConfig) -> Self {
        let shims = abi::shims(schema, &config.symbol_prefix());
        Self { schema, config, shims, w: SourceWriter::new("    ") }
    }

    pub fn emit(&mut self) {
        self.emit_header();
        self.emit_tables();
        self.emit_layout_asserts();
        for shim in std::mem::take(&mut self.shims) {
            self.w.blank();
            self.emit_shim(&shim);
        }
    }

    pub fn into_string(self) -> String {
        self.w.into_string()
    }

    fn emit_header(&mut self) {
        self.w.lines(format!(
            "// @generated by crossbind. Do not edit.\n\
             //\n\
             // Native shims for `{}`. Exported types must be `Clone + Send + Sync`.\n\
             // Include this file in the crate that defines them.",
            self.config.library_name
        ));
        self.w.blank();
        self.w.line(format!("use {} as __rt;", self.config.runtime_crate_path));
        self.w.blank();
    }

    fn emit_tables(&mut self) {
        let types: Vec<(TypeId, String)> = self
            .schema
            .structs
            .values()
            .map(|s| (s.id, s.name.clone()))
            .chain(self.schema.enums.values().map(|e| (e.id, e.name.clone())))
            .collect();
        for (id, name) in types {
            self.w.line(format!(
                "static {}: __rt::HandleMap<{}> = __rt::HandleMap::new();",
                self.table(id),
                self.native_path(&name)
            ));
        }
    }

    fn emit_layout_asserts(&mut self) {
        let mut checked = vec![AbiType::StrView, AbiType::Buffer];
        checked.extend(abi::option_types(&self.shims));
        self.w.blank();
        for ty in checked {
            let layout = ty.layout();
            let rust = ty.rust_type("__rt");
            self.w.line("#[cfg(target_pointer_width = \"64\")]");
            self.w.line(format!(
                "const _: () = assert!(::core::mem::size_of::<{rust}>() == {});",
                layout.size
            ));
            self.w.line("#[cfg(target_pointer_width = \"64\")]");
            self.w.line(format!(
                "const _: () = assert!(::core::mem::align_of::<{rust}>() == {});",
                layout.align
            ));
        }
    }

    fn emit_shim(&mut self, shim: &Shim) {
        let mut params: Vec<String> = shim
            .params
            .iter()
            .map(|p| format!("{}: {}", naming::rust_ident(&p.name), p.ty.rust_type("__rt")))
            .collect();
        params.push("__out_status: &mut __rt::CallStatus".to_string());
        let ret = match &shim.ret {
            AbiType::Void => String::new(),
            other => format!(" -> {}", other.rust_type("__rt")),
        };
        self.w.line("#[unsafe(no_mangle)]");
        self.w.open(format!("pub extern \"C\" fn {}({}){ret} {{", shim.symbol, params.join(", ")));
        self.w.open("__rt::rust_call(__out_status, move || {");
        match shim.kind {
            ShimKind::BufferFree => {
                self.w.line("unsafe { buf.destroy() };");
                self.w.line("Ok(())");
            }
            ShimKind::Ctor(id) => self.emit_struct_ctor(id),
            ShimKind::Free(id) => {
                self.w.line(format!("{}.remove({HANDLE_PARAM});", self.table(id)));
                self.w.line("Ok(())");
            }
            ShimKind::Getter { ty, field } => self.emit_getter(ty, field),
            ShimKind::VariantCtor { ty, variant } => self.emit_variant_ctor(ty, variant),
            ShimKind::Tag(id) => self.emit_tag(id),
            ShimKind::VariantGetter { ty, variant, field } => {
                self.emit_variant_getter(ty, variant, field)
            }
            ShimKind::Function(id) => {
                let schema = self.schema;
                if let Some(function) = schema.functions.get(&id) {
                    self.emit_function(function);
                }
            }
        }
        self.w.close("})");
        self.w.close("}");
    }

    fn emit_struct_ctor(&mut self, id: TypeId) {
        let schema = self.schema;
        let Some(def) = schema.structs.get(&id) else { return };
        let mut inits = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let name = naming::rust_ident(&field.name);
            if needs_lift(&field.ty) {
                let lifted = self.lift(&name, &field.ty, ParamMode::Owned, 0);
                self.w.line(format!("let {name} = {lifted};"));
            }
            inits.push(name);
        }
        let path = self.native_path(&def.name);
        let value = match inits.is_empty() {
            true => format!("{path} {{}}"),
            false => format!("{path} {{ {} }}", inits.join(", ")),
        };
        self.w.line(format!("Ok({}.insert({value}))", self.table(id)));
    }

    fn emit_getter(&mut self, id: TypeId, index: usize) {
        let schema = self.schema;
        let Some(field) = schema.structs.get(&id).and_then(|s| s.fields.get(index)) else {
            return;
        };
        self.w.line(format!("let __this = {}.get({HANDLE_PARAM})?;", self.table(id)));
        let access = format!("__this.{}", naming::rust_ident(&field.name));
        let value = if is_primitive(&field.ty) { access } else { format!("{access}.clone()") };
        self.w.line(format!("let __field = {value};"));
        self.w.line(format!("Ok({})", self.lower("__field", &field.ty, 0)));
    }

    fn emit_variant_ctor(&mut self, id: TypeId, index: usize) {
        let schema = self.schema;
        let Some(def) = schema.enums.get(&id) else { return };
        let Some(variant) = def.variants.get(index) else { return };
        let fields = variant.payload.fields();
        let mut args = Vec::with_capacity(fields.len());
        for field in &fields {
            let name = naming::rust_ident(&abi::payload_param_name(field.name));
            if needs_lift(field.ty) {
                let lifted = self.lift(&name, field.ty, ParamMode::Owned, 0);
                self.w.line(format!("let {name} = {lifted};"));
            }
            args.push(name);
        }
        let path = self.variant_path(def, variant);
        let value = match &variant.payload {
            VariantPayload::Unit => path,
            VariantPayload::Tuple(_) => format!("{path}({})", args.join(", ")),
            VariantPayload::Struct(named) => {
                let inits: Vec<String> = named
                    .iter()
                    .zip(&args)
                    .map(|(field, arg)| {
                        let name = naming::rust_ident(&field.name);
                        if name == *arg { name } else { format!("{name}: {arg}") }
                    })
                    .collect();
                format!("{path} {{ {} }}", inits.join(", "))
            }
        };
        self.w.line(format!("Ok({}.insert({value}))", self.table(id)));
    }

    fn emit_tag(&mut self, id: TypeId) {
        let schema = self.schema;
        let Some(def) = schema.enums.get(&id) else { return };
        self.w.line(format!("let __this = {}.get({HANDLE_PARAM})?;", self.table(id)));
        self.w.open("Ok(match &*__this {");
        for variant in &def.variants {
            let pattern = self.variant_pattern(def, variant, None);
            self.w.line(format!("{pattern} => {},", variant.discriminant));
        }
        self.w.close("})");
    }

    fn emit_variant_getter(&mut self, id: TypeId, variant_index: usize, field_index: usize) {
        let schema = self.schema;
        let Some(def) = schema.enums.get(&id) else { return };
        let Some(variant) = def.variants.get(variant_index) else { return };
        let fields = variant.payload.fields();
        let Some(field) = fields.get(field_index) else { return };
        self.w.line(format!("let __this = {}.get({HANDLE_PARAM})?;", self.table(id)));
        self.w.open("match &*__this {");
        let pattern = self.variant_pattern(def, variant, Some(field.name));
        self.w.open(format!("{pattern} => {{"));
        let value = if is_primitive(field.ty) { "*__field" } else { "__field.clone()" };
        self.w.line(format!("let __value = {value};"));
        self.w.line(format!("Ok({})", self.lower("__value", field.ty, 0)));
        self.w.close("}");
        self.w.line("#[allow(unreachable_patterns)]");
        self.w.line(format!(
            "_ => Err(__rt::CallError::variant_mismatch({:?}, {:?})),",
            def.name, variant.name
        ));
        self.w.close("}");
    }

    fn emit_function(&mut self, function: &ExportedFunction) {
        // Lift everything that can fail before anything is moved out of a table.
        let mut consuming = Vec::new();
        if let Receiver::ByRef(id) = function.receiver {
            self.w.line(format!("let __this = {}.get({HANDLE_PARAM})?;", self.table(id)));
        }
        for param in &function.params {
            if param.mode == ParamMode::Transfer {
                consuming.push(param);
                continue;
            }
            let name = naming::rust_ident(&param.name);
            if needs_lift(&param.ty) {
                let lifted = self.lift(&name, &param.ty, param.mode, 0);
                self.w.line(format!("let {name} = {lifted};"));
            }
        }
        for param in consuming {
            let name = naming::rust_ident(&param.name);
            let lifted = self.lift(&name, &param.ty, param.mode, 0);
            self.w.line(format!("let {name} = {lifted};"));
        }
        if let Receiver::ByValue(id) = function.receiver {
            self.w.line(format!("let __this = {}.take({HANDLE_PARAM})?;", self.table(id)));
        }

        let mut args: Vec<String> = Vec::with_capacity(function.params.len() + 1);
        match function.receiver {
            Receiver::None => {}
            Receiver::ByRef(_) => args.push("&__this".to_string()),
            Receiver::ByValue(_) => args.push("__this".to_string()),
        }
        for param in &function.params {
            let name = naming::rust_ident(&param.name);
            let borrowed_handle =
                param.mode == ParamMode::Borrowed && matches!(param.ty, TypeRef::Handle(_));
            args.push(if borrowed_handle { format!("&{name}") } else { name });
        }
        let callee = match function.receiver.type_id() {
            None => format!("{}::{}", self.config.native_crate_path, naming::rust_ident(&function.name)),
            Some(id) => format!(
                "{}::{}",
                self.native_path(self.schema.type_name(id)),
                naming::rust_ident(&function.name)
            ),
        };
        let call = format!("{callee}({})", args.join(", "));

        match &function.returns {
            TypeRef::Unit => {
                self.w.line(format!("{call};"));
                self.w.line("Ok(())");
            }
            TypeRef::Result(ok, err) => {
                self.w.open(format!("let __result = match {call} {{"));
                self.w.line("Ok(__value) => __value,");
                self.w.open("Err(__error) => {");
                if **err == TypeRef::Unit {
                    self.w.line("let () = __error;");
                    self.w.line("return Err(__rt::CallError::native(Vec::new()));");
                } else {
                    self.w.line("let mut __writer = __rt::WireWriter::new();");
                    self.emit_encode("__error", err, 0);
                    self.w.line("return Err(__rt::CallError::native(__writer.finish()));");
                }
                self.w.close("}");
                self.w.close("};");
                if **ok == TypeRef::Unit {
                    self.w.line("let () = __result;");
                    self.w.line("Ok(())");
                } else {
                    self.w.line(format!("Ok({})", self.lower("__result", ok, 0)));
                }
            }
            other => {
                self.w.line(format!("let __result = {call};"));
                self.w.line(format!("Ok({})", self.lower("__result", other, 0)));
            }
        }
    }

    /// Write `expr` of type `ty` into `__writer` in the wire format.
    fn emit_encode(&mut self, expr: &str, ty: &TypeRef, depth: usize) {
        match ty {
            TypeRef::Unit | TypeRef::Result(..) | TypeRef::Unsupported(_) => {}
            TypeRef::Primitive(PrimitiveKind::Bool) => {
                self.w.line(format!("__writer.write_bool({expr});"));
            }
            TypeRef::Primitive(kind) => {
                self.w.line(format!("__writer.write_{}({expr});", kind.rust_name()));
            }
            TypeRef::Str => {
                self.w.line(format!("__writer.write_str(&{expr})?;"));
            }
            TypeRef::Handle(id) => {
                self.w.line(format!("__writer.write_handle({}.insert({expr}));", self.table(*id)));
            }
            TypeRef::Option(inner) => {
                let binding = format!("__v{depth}");
                self.w.open(format!("match {expr} {{"));
                self.w.open(format!("Some({binding}) => {{"));
                self.w.line("__writer.write_presence(true);");
                self.emit_encode(&binding, inner, depth + 1);
                self.w.close("}");
                self.w.line("None => __writer.write_presence(false),");
                self.w.close("}");
            }
        }
    }

    /// Expression turning the flat argument `var` into its native value.
    fn lift(&self, var: &str, ty: &TypeRef, mode: ParamMode, depth: usize) -> String {
        match ty {
            TypeRef::Primitive(PrimitiveKind::Bool) => format!("{var} != 0"),
            TypeRef::Str if mode == ParamMode::Borrowed => format!("unsafe {{ {var}.as_str() }}?"),
            TypeRef::Str => format!("unsafe {{ {var}.as_str() }}?.to_owned()"),
            TypeRef::Handle(id) => {
                let method = match mode {
                    ParamMode::Borrowed => "get",
                    ParamMode::Owned => "get_cloned",
                    ParamMode::Transfer => "take",
                };
                format!("{}.{method}({var})?", self.table(*id))
            }
            TypeRef::Option(inner) => {
                let binding = format!("__v{depth}");
                let lifted = self.lift(&binding, inner, ParamMode::Owned, depth + 1);
                format!(
                    "match {var}.into_option() {{ Some({binding}) => Some({lifted}), None => None }}"
                )
            }
            _ => var.to_string(),
        }
    }

    /// Expression turning the native value `expr` into its flat return.
    fn lower(&self, expr: &str, ty: &TypeRef, depth: usize) -> String {
        match ty {
            TypeRef::Primitive(PrimitiveKind::Bool) => format!("u8::from({expr})"),
            TypeRef::Str => format!("__rt::RustBuffer::from_string({expr})"),
            TypeRef::Handle(id) => format!("{}.insert({expr})", self.table(*id)),
            TypeRef::Option(inner) => {
                let binding = format!("__v{depth}");
                let lowered = self.lower(&binding, inner, depth + 1);
                format!("__rt::FfiOption::from_option({expr}.map(|{binding}| {lowered}))")
            }
            TypeRef::Result(ok, _) => self.lower(expr, ok, depth),
            _ => expr.to_string(),
        }
    }

    fn table(&self, id: TypeId) -> String {
        format!("{}_HANDLES", naming::to_snake_case(self.schema.type_name(id)).to_uppercase())
    }

    fn native_path(&self, name: &str) -> String {
        format!("{}::{}", self.config.native_crate_path, naming::rust_ident(name))
    }

    fn variant_path(&self, def: &ExportedEnum, variant: &Variant) -> String {
        format!("{}::{}", self.native_path(&def.name), naming::rust_ident(&variant.name))
    }

    /// Match pattern for `variant`, optionally binding one field as `__field`.
    fn variant_pattern(
        &self,
        def: &ExportedEnum,
        variant: &Variant,
        bind: Option<FieldName<'_>>,
    ) -> String {
        let path = self.variant_path(def, variant);
        match (&variant.payload, bind) {
            (VariantPayload::Unit, _) => path,
            (VariantPayload::Tuple(_), Some(FieldName::Index(i))) => {
                format!("{path}({}__field, ..)", "_, ".repeat(i))
            }
            (VariantPayload::Tuple(_), _) => format!("{path}(..)"),
            (VariantPayload::Struct(_), Some(FieldName::Named(name))) => {
                format!("{path} {{ {}: __field, .. }}", naming::rust_ident(name))
            }
            (VariantPayload::Struct(_), _) => format!("{path} {{ .. }}"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn is_primitive(ty: &TypeRef) -> bool {
    matches!(ty, TypeRef::Primitive(_))
}

/// Non-bool primitives cross unchanged and need no `let` rebinding.
fn needs_lift(ty: &TypeRef) -> bool {
    !matches!(ty, TypeRef::Primitive(kind) if *kind != PrimitiveKind::Bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fixtures;

    fn generate() -> String {
        let schema = fixtures::demo_schema();
        let config = GeneratorConfig::new("demo");
        let mut cg = NativeCodegen::new(&schema, &config);
        cg.emit();
        cg.into_string()
    }

    #[test]
    fn one_table_per_exported_type() {
        let src = generate();
        assert!(src.contains(
            "static PERSON_HANDLES: __rt::HandleMap<crate::Person> = __rt::HandleMap::new();"
        ));
        assert!(src.contains("static MESSAGE_HANDLES: __rt::HandleMap<crate::Message>"));
        assert!(src.contains("use ::crossbind_runtime as __rt;"));
    }

    #[test]
    fn struct_constructor_lifts_strings() {
        let src = generate();
        assert!(src.contains(
            "pub extern \"C\" fn demo_ctor_person(name: __rt::FfiStr, age: u32, __out_status: &mut __rt::CallStatus) -> u64 {"
        ));
        assert!(src.contains("let name = unsafe { name.as_str() }?.to_owned();"));
        assert!(src.contains("Ok(PERSON_HANDLES.insert(crate::Person { name, age }))"));
    }

    #[test]
    fn borrowed_handles_are_passed_by_reference() {
        let src = generate();
        assert!(src.contains("let person = PERSON_HANDLES.get(person)?;"));
        assert!(src.contains("let __result = crate::greet(&person);"));
        assert!(src.contains("Ok(__rt::RustBuffer::from_string(__result))"));
    }

    #[test]
    fn enum_accessors_check_the_variant() {
        let src = generate();
        assert!(src.contains("crate::Message::Toggle(..) => 1,"));
        assert!(src.contains("crate::Message::Toggle(__field, ..) => {"));
        assert!(src.contains("Ok(u8::from(__value))"));
        assert!(src.contains("crate::Message::KeyValue { value: __field, .. } => {"));
        assert!(src.contains("_ => Err(__rt::CallError::variant_mismatch(\"Message\", \"Toggle\")),"));
        assert!(src.contains("let item0 = item0 != 0;"));
        assert!(src.contains("Ok(MESSAGE_HANDLES.insert(crate::Message::KeyValue { key, value }))"));
    }

    #[test]
    fn result_errors_are_wire_encoded() {
        let src = generate();
        assert!(src.contains("let __result = match crate::parse_age(text) {"));
        assert!(src.contains("__writer.write_str(&__error)?;"));
        assert!(src.contains("return Err(__rt::CallError::native(__writer.finish()));"));
    }

    #[test]
    fn consuming_lifts_come_last() {
        let src = generate();
        let body = src.split("fn demo_method_person_rename(").nth(1).unwrap();
        let name = body.find("let new_name = unsafe").unwrap();
        let take = body.find("let __this = PERSON_HANDLES.take(__handle)?;").unwrap();
        assert!(name < take);
        assert!(body.contains("crate::Person::rename(__this, new_name)"));
    }

    #[test]
    fn optional_arguments_lift_inside_a_match() {
        let src = generate();
        assert!(src.contains(
            "let flag = match flag.into_option() { Some(__v0) => Some(__v0 != 0), None => None };"
        ));
        assert!(src.contains("Ok(__rt::FfiOption::from_option(__result.map(|__v0| u8::from(__v0))))"));
        assert!(src.contains(
            "let other = match other.into_option() { Some(__v0) => Some(PERSON_HANDLES.get_cloned(__v0)?), None => None };"
        ));
        assert!(src.contains("let __result = crate::elder(&person, other);"));
        assert!(src.contains(
            "Ok(__rt::FfiOption::from_option(__result.map(|__v0| PERSON_HANDLES.insert(__v0))))"
        ));
    }

    #[test]
    fn enum_values_cross_as_handles() {
        let src = generate();
        let flip = src.split("fn demo_fn_flip(").nth(1).unwrap();
        assert!(flip.contains("let message = MESSAGE_HANDLES.get_cloned(message)?;"));
        assert!(flip.contains("Ok(MESSAGE_HANDLES.insert(__result))"));

        let require = src.split("fn demo_fn_require_toggle(").nth(1).unwrap();
        assert!(require.contains("let message = MESSAGE_HANDLES.get(message)?;"));
        assert!(require.contains("__writer.write_handle(MESSAGE_HANDLES.insert(__error));"));
        assert!(require.contains("let () = __result;"));
    }

    #[test]
    fn options_and_layouts() {
        let src = generate();
        assert!(src.contains(
            "Ok(__rt::FfiOption::from_option(__result.map(|__v0| __rt::RustBuffer::from_string(__v0))))"
        ));
        assert!(src.contains(
            "const _: () = assert!(::core::mem::size_of::<__rt::FfiOption<__rt::RustBuffer>>() == 32);"
        ));
        assert!(src.contains("const _: () = assert!(::core::mem::size_of::<__rt::RustBuffer>() == 24);"));
    }

    #[test]
    fn every_shim_reports_through_the_status() {
        let src = generate();
        let shims = src.matches("#[unsafe(no_mangle)]").count();
        assert_eq!(shims, src.matches("__rt::rust_call(__out_status, move || {").count());
        assert!(src.contains("pub extern \"C\" fn demo_rustbuffer_free(buf: __rt::RustBuffer, __out_status: &mut __rt::CallStatus) {"));
    }
}
