//! Identifier rendering between native `snake_case` and managed
//! `PascalCase`/`camelCase`.
//!
//! Every function here is a pure, deterministic transform. Collisions are
//! not resolved here; the schema builder rejects them.
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(r#)?[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
    "where", "while", "gen", "abstract", "become", "box", "do", "final", "macro", "override",
    "priv", "typeof", "unsized", "virtual", "yield", "try",
];

/// Rust keywords that cannot be written as raw identifiers.
const RUST_NON_RAW: &[&str] = &["self", "Self", "super", "crate"];

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && name != "_" && !RUST_NON_RAW.contains(&bare(name))
}

/// Strip a leading `r#`.
pub fn bare(name: &str) -> &str {
    name.strip_prefix("r#").unwrap_or(name)
}

fn words(name: &str) -> Vec<String> {
    bare(name).split('_').flat_map(split_humps).collect()
}

/// Word boundaries inside one `_`-separated segment: `HTTPServer2Go` splits
/// as `HTTP`, `Server2`, `Go`. Digits stick to the word before them.
fn split_humps(segment: &str) -> Vec<String> {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `person_name` → `PersonName`, `http_server` → `HttpServer`.
pub fn to_pascal_case(name: &str) -> String {
    let out: String = words(name).iter().map(|w| capitalize(w)).collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) { format!("_{out}") } else { out }
}

/// `person_name` → `personName`.
pub fn to_camel_case(name: &str) -> String {
    let pascal = to_pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => pascal,
    }
}

/// `PersonName` → `person_name`; used for shim symbol names.
pub fn to_snake_case(name: &str) -> String {
    words(name)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Escape a managed identifier that collides with a C# keyword.
pub fn csharp_ident(name: &str) -> String {
    if CSHARP_KEYWORDS.contains(&name) { format!("@{name}") } else { name.to_string() }
}

/// Render a native identifier so it is valid in generated Rust.
pub fn rust_ident(name: &str) -> String {
    let name = bare(name);
    if RUST_KEYWORDS.contains(&name) { format!("r#{name}") } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_to_pascal_and_camel() {
        assert_eq!(to_pascal_case("person_name"), "PersonName");
        assert_eq!(to_pascal_case("greet"), "Greet");
        assert_eq!(to_camel_case("person_name"), "personName");
        assert_eq!(to_pascal_case("_private_thing"), "PrivateThing");
        assert_eq!(to_pascal_case("r#type"), "Type");
    }

    #[test]
    fn already_cased_names_are_stable() {
        assert_eq!(to_pascal_case("KeyValue"), "KeyValue");
        assert_eq!(to_pascal_case("HTTPServer"), "HttpServer");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("KeyValue"), "key_value");
        assert_eq!(to_snake_case("person"), "person");
    }

    #[test]
    fn distinct_native_names_can_render_identically() {
        // caught by the builder as a collision
        assert_eq!(to_pascal_case("foo_bar"), to_pascal_case("fooBar"));
    }

    #[test]
    fn digits_stay_attached() {
        assert_eq!(to_pascal_case("vec3_length"), "Vec3Length");
        assert_eq!(to_pascal_case("item_0"), "Item0");
        assert_eq!(to_pascal_case("3d"), "_3d");
    }

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(csharp_ident("event"), "@event");
        assert_eq!(csharp_ident("person"), "person");
        assert_eq!(rust_ident("type"), "r#type");
        assert_eq!(rust_ident("r#match"), "r#match");
        assert_eq!(rust_ident("age"), "age");
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("person_name"));
        assert!(is_valid_identifier("r#type"));
        assert!(!is_valid_identifier("9lives"));
        assert!(!is_valid_identifier("with-dash"));
        assert!(!is_valid_identifier("_"));
        assert!(!is_valid_identifier("self"));
        assert!(!is_valid_identifier(""));
    }
}
