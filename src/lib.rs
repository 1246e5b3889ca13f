//! ucl - Universal Configuration Language
//!
//! A tolerant, nginx-style configuration syntax that is a strict superset of
//! JSON: macros, `${VAR}` expansion, implicit arrays for duplicate keys,
//! numeric unit suffixes, multiple comment styles, and `.include`/`.includes`
//! directives. The same document model backs parsing, multi-format emission
//! (JSON, compact JSON, UCL/config, YAML), and draft-v4 JSON Schema validation.
//!
//! # Example
//!
//! ```rust
//! use ucl::{parse, dumps, Format};
//!
//! let doc = parse(r#"
//!     server {
//!         listen = 8080;
//!         name = "example";
//!         alias = "example";
//!     }
//! "#).unwrap();
//!
//! let server = doc.get_path("server").unwrap();
//! assert_eq!(server.get_path("listen").unwrap().as_int(), Some(8080));
//!
//! println!("{}", dumps(&doc, Format::Json));
//! ```

mod char_table;
mod chunk;
mod emitter;
mod error;
mod lexer;
mod macros;
mod parser;
mod schema;
mod value;

pub use chunk::MAX_CHUNK_DEPTH;
pub use emitter::{emit, emit_full, Format, FormatOptions, StreamEmitter};
pub use error::{Error, Result};
pub use macros::{EnvironmentVariableHandler, Fetcher, MacroEngine, MacroOutcome, VariableHandler};
pub use parser::{priority_merge, Parser, ParserFlags};
pub use schema::validate as validate_schema;
pub use value::{Flags, ObjectMap, Value};

/// Parse `input` as a UCL document with default flags (no key lowercasing, no
/// `NoTime`, borrowing mode not requested). Equivalent to canonical JSON for
/// any input that happens to be JSON.
pub fn parse(input: &str) -> Result<Value> {
    parse_with_flags(input, ParserFlags::empty())
}

/// Parse `input` with the given [`ParserFlags`].
pub fn parse_with_flags(input: &str, flags: ParserFlags) -> Result<Value> {
    let mut parser = Parser::new(flags);
    parser.add_string(input, 0)?;
    parser.get_object()
}

/// Parse a file from disk. Sets `FILENAME`/`CURDIR` on the parser's macro
/// engine before parsing, so `.include` targets and `${FILENAME}`/`${CURDIR}`
/// expansions resolve relative to it.
pub fn parse_file(path: impl AsRef<std::path::Path>) -> Result<Value> {
    let path = path.as_ref();
    let mut parser = Parser::new(ParserFlags::empty());
    parser.macros.set_filevars(&path.display().to_string());
    parser.add_file(path, 0)?;
    parser.get_object()
}

/// Serialize `value` to a `String` in the given format. Thin wrapper around
/// [`emit`] for callers that want the public entry point named the way the
/// spec's external interface does.
pub fn dumps(value: &Value, format: Format) -> String {
    emit(value, format)
}

/// Convert a [`serde_json::Value`] into this crate's [`Value`] tree. Useful
/// for hosts that already parsed JSON via `serde_json` and want schema
/// validation or UCL/YAML emission without re-lexing the source text.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::int(i)
            } else {
                Value::float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let obj = Value::empty_object();
            for (k, v) in map.iter() {
                obj.object_insert(k.clone(), from_json(v));
            }
            obj
        }
    }
}

/// Convert this crate's [`Value`] tree into a [`serde_json::Value`]. Implicit
/// arrays (duplicate keys) are expanded into JSON arrays, matching [`Format::Json`]'s
/// own collapsing rule.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    if let Some(b) = value.as_bool() {
        return J::Bool(b);
    }
    if let Some(i) = value.as_int() {
        return J::Number(i.into());
    }
    if value.is_number() {
        let f = value.as_float().unwrap_or(f64::NAN);
        return serde_json::Number::from_f64(f).map(J::Number).unwrap_or(J::Null);
    }
    if let Some(s) = value.as_str() {
        return J::String(s);
    }
    if let Some(items) = value.with_array(|a| a.clone()) {
        return J::Array(items.iter().map(to_json).collect());
    }
    if let Some(map) = value.with_object(|o| o.clone()) {
        let mut out = serde_json::Map::new();
        for (k, head) in map.iter() {
            let chain: Vec<Value> = head.chain_iter().collect();
            let converted = if chain.len() > 1 {
                J::Array(chain.iter().map(to_json).collect())
            } else {
                to_json(head)
            };
            out.insert(k.clone(), converted);
        }
        return J::Object(out);
    }
    J::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_dump_round_trips_through_json() {
        let doc = parse("a = 1; b = \"two\"; c = [1, 2, 3];").unwrap();
        let json = dumps(&doc, Format::CompactJson);
        let reparsed = parse(&json).unwrap();
        assert!(doc.deep_eq(&reparsed));
    }

    #[test]
    fn from_json_and_to_json_round_trip_preserves_structure() {
        let original: serde_json::Value =
            serde_json::from_str(r#"{"a":1,"b":[true,null,"x"]}"#).unwrap();
        let value = from_json(&original);
        let back = to_json(&value);
        assert_eq!(original, back);
    }

    #[test]
    fn from_json_object_entries_are_reachable_by_path() {
        let value = from_json(&serde_json::json!({"a": 1}));
        assert_eq!(value.get_path("a").unwrap().as_int(), Some(1));
    }

    #[test]
    fn validate_schema_is_reexported_and_usable() {
        let schema = parse(r#"{"type":"integer"}"#).unwrap();
        assert!(validate_schema(&schema, &Value::int(5)).is_ok());
        assert!(validate_schema(&schema, &Value::string("no")).is_err());
    }
}
