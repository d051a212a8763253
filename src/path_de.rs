use serde::de::DeserializeOwned;
use thiserror::Error;

/// A deserialization failure, located by its JSON path inside the document.
#[derive(Debug, Error)]
#[error("at JSON path {path} → {source}")]
pub struct DecodeError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

impl From<serde_path_to_error::Error<serde_json::Error>> for DecodeError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        DecodeError { path, source: err.into_inner() }
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DecodeError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    Ok(serde_path_to_error::deserialize::<_, T>(de)?)
}

/// Same as [`from_str_with_path`], for a document already parsed into a
/// `serde_json::Value` (e.g. the output of a jq pre-processing step).
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, DecodeError> {
    Ok(serde_path_to_error::deserialize::<_, T>(value)?)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::decl::AnnotatedDecl;

    #[derive(Debug, Deserialize)]
    struct Outer {
        #[allow(dead_code)]
        inner: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    struct Inner {
        #[allow(dead_code)]
        count: u32,
    }

    #[test]
    fn errors_name_the_offending_path() {
        let src = r#"{"inner": [{"count": 1}, {"count": "many"}]}"#;
        let err = from_str_with_path::<Outer>(src).unwrap_err();
        assert_eq!(err.path, "inner[1].count");
        assert!(err.to_string().starts_with("at JSON path inner[1].count → "), "{err}");
    }

    #[test]
    fn values_decode_the_same_way() {
        let value = serde_json::json!([{"kind": "function", "name": "reset"}]);
        let decls: Vec<AnnotatedDecl> = from_value_with_path(value).unwrap();
        assert_eq!(decls[0].name(), "reset");
    }
}
