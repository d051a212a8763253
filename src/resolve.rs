//! Type Resolver: native type expression → boundary `TypeRef`.
//!
//! Resolution is a pure function of the expression, its syntactic position
//! and the (already complete) table of exported type ids, so resolving the
//! same expression twice in one run always gives the same `TypeRef`.
use indexmap::IndexMap;

use crate::decl::TypeExpr;
use crate::ir::{ParamMode, PrimitiveKind, TypeId, TypeRef};

/// Where a type expression appears; decides which shapes are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Field,
    Param,
    Return,
    ResultOk,
    ResultErr,
    OptionInner,
}

impl Position {
    fn allows_unit(self) -> bool {
        matches!(self, Position::Return | Position::ResultOk | Position::ResultErr)
    }
}

const KNOWN_CONTAINERS: &[&str] = &[
    "Vec", "VecDeque", "HashMap", "BTreeMap", "HashSet", "BTreeSet", "Box", "Rc", "Arc",
    "RefCell", "Cell", "Mutex", "RwLock", "Cow", "PhantomData",
];

/// Names resolved to a fixed meaning before exported types are consulted.
pub fn is_builtin_type_name(name: &str) -> bool {
    PrimitiveKind::from_rust_name(name).is_some()
        || matches!(name, "String" | "str" | "Option" | "Result" | "usize" | "isize" | "char")
}

pub struct TypeResolver<'a> {
    exported: &'a IndexMap<String, TypeId>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(exported: &'a IndexMap<String, TypeId>) -> Self {
        Self { exported }
    }

    pub fn resolve(&self, expr: &TypeExpr, position: Position) -> TypeRef {
        match expr {
            TypeExpr::Path { name, args } => self.resolve_path(expr, name, args, position),
            TypeExpr::Ref { mutable: true, .. } => unsupported(
                expr,
                "mutable references would give native code shared mutable access",
            ),
            TypeExpr::Ref { inner, .. } => self.resolve_ref(expr, inner, position),
            TypeExpr::Tuple { elems } if elems.is_empty() => {
                if position.allows_unit() {
                    TypeRef::Unit
                } else {
                    unsupported(expr, "`()` is only supported as a return type")
                }
            }
            TypeExpr::Tuple { .. } => unsupported(expr, "tuples have no boundary representation"),
            TypeExpr::Ptr { .. } => unsupported(expr, "raw pointers cannot be marshalled safely"),
            TypeExpr::Slice { .. } | TypeExpr::Array { .. } => {
                unsupported(expr, "slices and arrays are not supported")
            }
            TypeExpr::Generic { name } => {
                unsupported(expr, &format!("generic parameter `{name}` has no fixed layout"))
            }
            TypeExpr::TraitObject { .. } => unsupported(expr, "trait objects are not supported"),
        }
    }

    /// How a parameter of this type is handed to the native function.
    pub fn param_mode(expr: &TypeExpr, transfer: bool) -> ParamMode {
        match expr {
            TypeExpr::Ref { .. } => ParamMode::Borrowed,
            _ if transfer => ParamMode::Transfer,
            _ => ParamMode::Owned,
        }
    }

    fn resolve_ref(&self, expr: &TypeExpr, inner: &TypeExpr, position: Position) -> TypeRef {
        if position != Position::Param {
            return unsupported(expr, "references are only supported as top-level parameters");
        }
        match inner {
            TypeExpr::Path { name, args } if args.is_empty() && last_segment(name) == "str" => {
                TypeRef::Str
            }
            TypeExpr::Path { name, args } if self.exported.contains_key(last_segment(name)) => {
                self.resolve_path(inner, name, args, position)
            }
            _ => unsupported(expr, "only `&str` and references to exported types are supported"),
        }
    }

    fn resolve_path(
        &self,
        expr: &TypeExpr,
        name: &str,
        args: &[TypeExpr],
        position: Position,
    ) -> TypeRef {
        let last = last_segment(name);
        if let (Some(kind), true) = (PrimitiveKind::from_rust_name(last), args.is_empty()) {
            return TypeRef::Primitive(kind);
        }
        match (last, args.len()) {
            ("Option", 1) => {
                let inner = self.resolve(&args[0], Position::OptionInner);
                match inner {
                    TypeRef::Unsupported(_) => inner,
                    TypeRef::Option(_) => unsupported(
                        expr,
                        "nested `Option` is not supported; optionality is a single presence tag",
                    ),
                    other => TypeRef::option(other),
                }
            }
            ("Result", 2) => {
                if position == Position::OptionInner {
                    return unsupported(expr, "`Result` nested inside `Option` is not supported");
                }
                if position != Position::Return {
                    return unsupported(expr, "`Result` is only supported as a function return type");
                }
                let ok = self.resolve(&args[0], Position::ResultOk);
                if !ok.is_supported() {
                    return ok;
                }
                let err = self.resolve(&args[1], Position::ResultErr);
                if !err.is_supported() {
                    return err;
                }
                TypeRef::result(ok, err)
            }
            ("Option" | "Result", _) => unsupported(expr, "unexpected number of type arguments"),
            ("String", 0) => TypeRef::Str,
            ("str", 0) => unsupported(expr, "unsized `str` must be passed as `&str`"),
            ("usize" | "isize", 0) => {
                unsupported(expr, "platform-width integers have no fixed boundary width")
            }
            ("char", 0) => unsupported(expr, "`char` is not supported; use `u32` or `String`"),
            (_, n) => match self.exported.get(last) {
                Some(id) if n == 0 => TypeRef::Handle(*id),
                Some(_) => unsupported(expr, "generic exported types are not supported"),
                None if KNOWN_CONTAINERS.contains(&last) => {
                    unsupported(expr, "containers are not supported across the boundary")
                }
                None => unsupported(expr, "not an exported type"),
            },
        }
    }
}

pub(crate) fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

fn unsupported(expr: &TypeExpr, reason: &str) -> TypeRef {
    TypeRef::Unsupported(format!("`{expr}`: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> IndexMap<String, TypeId> {
        let mut t = IndexMap::new();
        t.insert("Person".to_string(), TypeId(0));
        t.insert("Message".to_string(), TypeId(1));
        t
    }

    fn p(name: &str) -> TypeExpr {
        TypeExpr::path(name)
    }

    #[test]
    fn builtin_names_are_recognised() {
        for name in ["String", "str", "Option", "Result", "u8", "f64", "usize", "char"] {
            assert!(is_builtin_type_name(name), "{name}");
        }
        assert!(!is_builtin_type_name("Person"));
        assert!(!is_builtin_type_name("Vec"));
    }

    #[test]
    fn primitives_and_strings() {
        let t = table();
        let r = TypeResolver::new(&t);
        assert_eq!(r.resolve(&p("u32"), Position::Field), TypeRef::Primitive(PrimitiveKind::U32));
        assert_eq!(r.resolve(&p("bool"), Position::Param), TypeRef::Primitive(PrimitiveKind::Bool));
        assert_eq!(r.resolve(&p("std::string::String"), Position::Field), TypeRef::Str);
        assert_eq!(
            r.resolve(&TypeExpr::reference(p("str")), Position::Param),
            TypeRef::Str
        );
    }

    #[test]
    fn exported_types_resolve_to_handles_by_id() {
        let t = table();
        let r = TypeResolver::new(&t);
        assert_eq!(r.resolve(&p("Person"), Position::Field), TypeRef::Handle(TypeId(0)));
        assert_eq!(r.resolve(&p("crate::Message"), Position::Return), TypeRef::Handle(TypeId(1)));
        assert_eq!(
            r.resolve(&TypeExpr::reference(p("Person")), Position::Param),
            TypeRef::Handle(TypeId(0))
        );
    }

    #[test]
    fn resolution_is_referentially_stable() {
        let t = table();
        let r = TypeResolver::new(&t);
        let expr = TypeExpr::option(p("Person"));
        assert_eq!(r.resolve(&expr, Position::Field), r.resolve(&expr, Position::Field));
    }

    #[test]
    fn option_is_flat() {
        let t = table();
        let r = TypeResolver::new(&t);
        assert_eq!(
            r.resolve(&TypeExpr::option(p("String")), Position::Field),
            TypeRef::option(TypeRef::Str)
        );
        let nested = TypeExpr::option(TypeExpr::option(p("u8")));
        assert!(!r.resolve(&nested, Position::Field).is_supported());
    }

    #[test]
    fn result_only_as_return() {
        let t = table();
        let r = TypeResolver::new(&t);
        let res = TypeExpr::result(p("u32"), p("String"));
        assert_eq!(
            r.resolve(&res, Position::Return),
            TypeRef::result(TypeRef::Primitive(PrimitiveKind::U32), TypeRef::Str)
        );
        assert!(!r.resolve(&res, Position::Field).is_supported());
        let TypeRef::Unsupported(reason) =
            r.resolve(&TypeExpr::option(res.clone()), Position::Return)
        else {
            panic!("expected unsupported")
        };
        assert!(reason.contains("nested inside `Option`"), "{reason}");
        assert_eq!(
            r.resolve(&TypeExpr::result(TypeExpr::unit(), p("Message")), Position::Return),
            TypeRef::result(TypeRef::Unit, TypeRef::Handle(TypeId(1)))
        );
    }

    #[test]
    fn everything_else_is_unsupported_with_the_type_named() {
        let t = table();
        let r = TypeResolver::new(&t);
        let cases = [
            TypeExpr::generic_path("Vec", vec![p("String")]),
            TypeExpr::Generic { name: "T".into() },
            TypeExpr::TraitObject { bound: "Fn()".into() },
            TypeExpr::Ptr { mutable: false, inner: Box::new(p("u8")) },
            TypeExpr::Ref { mutable: true, inner: Box::new(p("Person")) },
            TypeExpr::reference(p("String")),
            p("usize"),
            p("Unknown"),
            TypeExpr::unit(),
        ];
        for expr in cases {
            match r.resolve(&expr, Position::Field) {
                TypeRef::Unsupported(reason) => {
                    assert!(reason.contains(&format!("`{expr}`")), "{reason}")
                }
                other => panic!("{expr} resolved to {other:?}"),
            }
        }
    }

    #[test]
    fn references_outside_parameters_are_rejected() {
        let t = table();
        let r = TypeResolver::new(&t);
        let expr = TypeExpr::reference(p("Person"));
        assert!(!r.resolve(&expr, Position::Field).is_supported());
        assert!(!r.resolve(&expr, Position::Return).is_supported());
    }

    #[test]
    fn parameter_modes() {
        assert_eq!(
            TypeResolver::param_mode(&TypeExpr::reference(p("Person")), false),
            ParamMode::Borrowed
        );
        assert_eq!(TypeResolver::param_mode(&p("Person"), true), ParamMode::Transfer);
        assert_eq!(TypeResolver::param_mode(&p("Person"), false), ParamMode::Owned);
    }
}
