//! Generic JSON helpers built on `serde_json`.
//!
//! Typed encode/decode is generic over `serde` traits. The byte-level helpers
//! ([`validate`], [`compact`], [`indent`], [`is_empty`], [`merge`]) operate on
//! already-encoded JSON and keep token text exactly as written.
//!
//! # Examples
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let user = User { id: 1, name: "John".to_string() };
//!
//! let bytes = svckit::json::to_json(&user)?;
//! let back: User = svckit::json::from_json(&bytes)?;
//! assert_eq!(back, user);
//!
//! let pretty = svckit::json::pretty_print(&user)?;
//! assert_eq!(pretty, "{\n  \"id\": 1,\n  \"name\": \"John\"\n}");
//! # Ok::<(), svckit::Error>(())
//! ```

use crate::{Error, Result};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::io;

/// Encodes a value as JSON bytes.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the value cannot be represented as JSON, for
/// example a map with non-string keys.
pub fn to_json<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).map_err(Error::Encode)
}

/// Encodes a value as a JSON string.
pub fn to_string<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(Error::Encode)
}

/// Encodes a value and returns a reader over the encoded bytes.
pub fn to_reader<T>(value: &T) -> Result<io::Cursor<Vec<u8>>>
where
    T: Serialize + ?Sized,
{
    to_json(value).map(io::Cursor::new)
}

/// Decodes JSON bytes into `T`.
///
/// # Errors
///
/// Returns [`Error::Decode`] with the parser diagnostic if the bytes are not
/// valid JSON or do not match the shape of `T`.
pub fn from_json<T>(data: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(data).map_err(Error::Decode)
}

/// Decodes a JSON string into `T`.
pub fn from_str<T>(data: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(data).map_err(Error::Decode)
}

/// Reads a complete JSON document from `reader` and decodes it into `T`.
///
/// I/O failures are reported as [`Error::Decode`] as well.
pub fn from_reader<T, R>(reader: R) -> Result<T>
where
    T: DeserializeOwned,
    R: io::Read,
{
    serde_json::from_reader(reader).map_err(Error::Decode)
}

/// Returns `true` if `data` is a single syntactically valid JSON document.
///
/// Never fails. Empty input is not valid JSON.
///
/// ```
/// assert!(svckit::json::validate(b"null"));
/// assert!(svckit::json::validate(br#"{"id":1}"#));
/// assert!(!svckit::json::validate(br#"{"id":1,"name":}"#));
/// assert!(!svckit::json::validate(b""));
/// ```
pub fn validate(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(text) => validate_str(text),
        Err(_) => false,
    }
}

/// Returns `true` if `data` is a single syntactically valid JSON document.
pub fn validate_str(data: &str) -> bool {
    serde_json::from_str::<IgnoredAny>(data).is_ok()
}

/// Removes insignificant whitespace from JSON bytes.
///
/// # Errors
///
/// Returns [`Error::Decode`] if `data` is not valid JSON.
pub fn compact(data: &[u8]) -> Result<Vec<u8>> {
    ensure_valid(data)?;

    let mut out = Vec::with_capacity(data.len());
    let mut scanner = StringScanner::default();
    for &byte in data {
        if scanner.in_string() {
            scanner.advance(byte);
            out.push(byte);
        } else if !is_json_whitespace(byte) {
            scanner.advance(byte);
            out.push(byte);
        }
    }
    Ok(out)
}

/// Removes insignificant whitespace from a JSON string.
pub fn compact_str(data: &str) -> Result<String> {
    let compacted = compact(data.as_bytes())?;
    into_utf8(compacted)
}

/// Re-indents JSON bytes.
///
/// Each element of an object or array starts on a new line beginning with
/// `prefix` followed by one copy of `indent` per nesting level. The first
/// line is not prefixed. Empty objects and arrays stay on one line.
///
/// # Errors
///
/// Returns [`Error::Decode`] if `data` is not valid JSON.
pub fn indent(data: &[u8], prefix: &str, indent: &str) -> Result<Vec<u8>> {
    let compacted = compact(data)?;

    let mut out = Vec::with_capacity(compacted.len() * 2);
    let mut scanner = StringScanner::default();
    let mut depth = 0usize;
    let mut just_opened = false;

    for &byte in &compacted {
        if scanner.in_string() {
            scanner.advance(byte);
            out.push(byte);
            continue;
        }

        if just_opened {
            just_opened = false;
            if byte == b'}' || byte == b']' {
                depth = depth.saturating_sub(1);
                out.push(byte);
                continue;
            }
            push_newline(&mut out, prefix, indent, depth);
        }

        scanner.advance(byte);
        match byte {
            b'{' | b'[' => {
                out.push(byte);
                depth += 1;
                just_opened = true;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                push_newline(&mut out, prefix, indent, depth);
                out.push(byte);
            }
            b',' => {
                out.push(byte);
                push_newline(&mut out, prefix, indent, depth);
            }
            b':' => {
                out.push(byte);
                out.push(b' ');
            }
            _ => out.push(byte),
        }
    }

    Ok(out)
}

/// Encodes a value as JSON indented with two spaces.
pub fn pretty_print<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string_pretty(value).map_err(Error::Encode)
}

/// Encodes a value as JSON using a custom line prefix and indent unit.
///
/// Every line after the first starts with `prefix`, then one `indent_unit`
/// per nesting level.
///
/// ```
/// let value = serde_json::json!({"a": [1, 2]});
/// let out = svckit::json::pretty_print_with_indent(&value, "", "\t")?;
/// assert_eq!(out, "{\n\t\"a\": [\n\t\t1,\n\t\t2\n\t]\n}");
/// # Ok::<(), svckit::Error>(())
/// ```
pub fn pretty_print_with_indent<T>(value: &T, prefix: &str, indent_unit: &str) -> Result<String>
where
    T: Serialize + ?Sized,
{
    if !prefix.is_empty() {
        let encoded = to_json(value)?;
        return into_utf8(indent(&encoded, prefix, indent_unit)?);
    }

    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent_unit.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer).map_err(Error::Encode)?;
    into_utf8(out)
}

/// Returns `true` if `data` is valid JSON whose trimmed text is exactly
/// `{}`, `[]` or `null`.
///
/// ```
/// assert!(svckit::json::is_empty(b"  {}\n"));
/// assert!(!svckit::json::is_empty(b"[1]"));
/// assert!(!svckit::json::is_empty(b"{"));
/// ```
pub fn is_empty(data: &[u8]) -> bool {
    if !validate(data) {
        return false;
    }
    matches!(data.trim_ascii(), b"{}" | b"[]" | b"null")
}

/// Shallow-merges JSON objects; keys from later objects replace earlier ones.
///
/// Merging nothing yields `{}`. The output has its keys sorted.
///
/// # Errors
///
/// Returns [`Error::Decode`] if any input is invalid JSON or not an object.
///
/// ```
/// let merged = svckit::json::merge([
///     r#"{"a":1,"b":2}"#,
///     r#"{"b":3,"c":4}"#,
///     r#"{"c":5,"d":6}"#,
/// ])?;
/// assert_eq!(merged, br#"{"a":1,"b":3,"c":5,"d":6}"#);
/// # Ok::<(), svckit::Error>(())
/// ```
pub fn merge<I, B>(objects: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut merged = Map::new();
    for object in objects {
        let object: Map<String, Value> = from_json(object.as_ref())?;
        merged.extend(object);
    }
    to_json(&merged)
}

/// Encodes a value as JSON bytes, aborting on failure.
///
/// Only for call sites that already guarantee the value is encodable; the
/// caller gives up any chance to recover from the error.
///
/// # Panics
///
/// Panics if encoding fails.
pub fn must_to_json<T>(value: &T) -> Vec<u8>
where
    T: Serialize + ?Sized,
{
    match to_json(value) {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to marshal JSON: {e}"),
    }
}

/// Decodes JSON bytes into `T`, aborting on failure.
///
/// Only for call sites that already guarantee the input is well formed; the
/// caller gives up any chance to recover from the error.
///
/// # Panics
///
/// Panics if decoding fails.
pub fn must_from_json<T>(data: &[u8]) -> T
where
    T: DeserializeOwned,
{
    match from_json(data) {
        Ok(value) => value,
        Err(e) => panic!("failed to unmarshal JSON: {e}"),
    }
}

/// Pretty-prints a value, aborting on failure.
///
/// # Panics
///
/// Panics if encoding fails.
pub fn must_pretty_print<T>(value: &T) -> String
where
    T: Serialize + ?Sized,
{
    match pretty_print(value) {
        Ok(text) => text,
        Err(e) => panic!("failed to pretty print JSON: {e}"),
    }
}

fn ensure_valid(data: &[u8]) -> Result<()> {
    let text = std::str::from_utf8(data).map_err(|e| Error::Decode(invalid(e)))?;
    serde_json::from_str::<IgnoredAny>(text)
        .map(|_| ())
        .map_err(Error::Decode)
}

fn into_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::Decode(invalid(e)))
}

fn invalid(e: impl std::fmt::Display) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(e)
}

fn is_json_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn push_newline(out: &mut Vec<u8>, prefix: &str, indent: &str, depth: usize) {
    out.push(b'\n');
    out.extend_from_slice(prefix.as_bytes());
    for _ in 0..depth {
        out.extend_from_slice(indent.as_bytes());
    }
}

/// Tracks whether a byte stream is currently inside a JSON string literal.
#[derive(Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    fn in_string(&self) -> bool {
        self.in_string
    }

    fn advance(&mut self, byte: u8) {
        if !self.in_string {
            self.in_string = byte == b'"';
        } else if self.escaped {
            self.escaped = false;
        } else if byte == b'\\' {
            self.escaped = true;
        } else if byte == b'"' {
            self.in_string = false;
        }
    }
}
