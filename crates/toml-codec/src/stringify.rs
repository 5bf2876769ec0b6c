//! Canonical text output for a value graph.
//!
//! Every table is written in two groups:
//!
//! - **Plain entries**: scalars, inline tables, empty tables, and arrays
//!   whose first element is not a table, as `key = value` lines
//! - **Sections**: non-empty tables as `[prefix.key]` blocks, and non-empty
//!   arrays of tables (inline or not) as one `[[prefix.key]]` block per
//!   element
//!
//! Plain entries come first. Sections follow, each preceded by a blank line.
//!
//! # Example
//! ```
//! use toml_codec::{parse, stringify};
//! let doc = parse("name = \"ccjk\"\n[server]\nport = 8080\n").unwrap();
//! assert_eq!(
//!     stringify(&doc).unwrap(),
//!     "name = \"ccjk\"\n\n[server]\nport = 8_080\n"
//! );
//! ```

use crate::error::{CodecError, Result};
use crate::value::{Array, Datetime, InlineArray, Integer, Str, Table, Value};
use std::fmt::Write as _;

/// Formatting knobs for [`stringify_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringifyOptions {
    /// Inline arrays whose joined elements are longer than this many
    /// characters are written one element per line.
    pub array_wrap_width: usize,
}

impl Default for StringifyOptions {
    fn default() -> Self {
        StringifyOptions {
            array_wrap_width: 60,
        }
    }
}

/// Serialize a document with default options.
pub fn stringify(table: &Table) -> Result<String> {
    stringify_with(table, &StringifyOptions::default())
}

/// Serialize a document. Nothing is returned on failure; there is no partial
/// output.
pub fn stringify_with(table: &Table, options: &StringifyOptions) -> Result<String> {
    log::debug!("[toml-codec] stringifying table with {} entries", table.len());
    let mut out = String::new();
    let mut prefix = Vec::new();
    write_table_body(table.entries(), &mut prefix, options, &mut out)?;
    log::debug!("[toml-codec] stringified {} bytes", out.len());
    Ok(out)
}

/// Serialize a document given as a [`Value`]. Only tables can be documents.
pub fn stringify_value(value: &Value) -> Result<String> {
    match value {
        Value::Table(table) => stringify(table),
        Value::InlineTable(table) => stringify(&table.entries().iter().cloned().collect::<Table>()),
        other => Err(CodecError::usage(format!(
            "Can only stringify a table as a document, got {}",
            other.type_name()
        ))),
    }
}

/// Render one value the way it would appear on the right of `=`.
pub fn stringify_scalar(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(value, &StringifyOptions::default(), Layout::Free, &mut out)?;
    Ok(out)
}

/// Render a key: bare when it only uses `A-Z a-z 0-9 _ -`, quoted otherwise.
pub(crate) fn format_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        let mut out = String::with_capacity(key.len() + 2);
        write_basic_string(key, &mut out);
        out
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Whether a value may span lines. Inline tables must stay on one line, so
/// arrays inside them never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Free,
    SingleLine,
}

fn is_section(value: &Value) -> bool {
    match value {
        Value::Table(t) => !t.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::InlineArray(a) => a.get(0).is_some_and(Value::is_table_like),
        _ => false,
    }
}

fn write_table_body(
    entries: &[(String, Value)],
    prefix: &mut Vec<String>,
    options: &StringifyOptions,
    out: &mut String,
) -> Result<()> {
    for (key, value) in entries.iter().filter(|(_, v)| !is_section(v)) {
        out.push_str(&format_key(key));
        out.push_str(" = ");
        write_value(value, options, Layout::Free, out)?;
        out.push('\n');
    }

    for (key, value) in entries.iter().filter(|(_, v)| is_section(v)) {
        prefix.push(key.clone());
        match value {
            Value::Table(child) => {
                write_header(prefix, "[", "]", out);
                write_table_body(child.entries(), prefix, options, out)?;
            }
            Value::Array(array) => {
                for element in array.iter() {
                    write_header(prefix, "[[", "]]", out);
                    write_table_body(element.entries(), prefix, options, out)?;
                }
            }
            Value::InlineArray(array) => {
                check_homogeneous(array)?;
                for element in array.iter() {
                    let Some(body) = element.table_entries() else {
                        return Err(CodecError::semantic(format!(
                            "Inline arrays must be homogeneous: found {} in an array of tables",
                            element.type_name()
                        )));
                    };
                    write_header(prefix, "[[", "]]", out);
                    write_table_body(body, prefix, options, out)?;
                }
            }
            _ => {}
        }
        prefix.pop();
    }
    Ok(())
}

fn write_header(path: &[String], open: &str, close: &str, out: &mut String) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(open);
    out.push_str(&crate::resolver::display_path(path));
    out.push_str(close);
    out.push('\n');
}

// ============================================================================
// Values
// ============================================================================

fn write_value(
    value: &Value,
    options: &StringifyOptions,
    layout: Layout,
    out: &mut String,
) -> Result<()> {
    match value {
        Value::Int(i) => write_integer(i, out),
        Value::Float(f) => write_float(*f, out),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::String(s) => write_string(s, out),
        Value::Datetime(dt) => write_datetime(dt, out),
        Value::Table(t) => write_inline_entries(t.iter(), options, out)?,
        Value::InlineTable(t) => write_inline_entries(t.iter(), options, out)?,
        Value::Array(a) => write_table_array(a, options, layout, out)?,
        Value::InlineArray(a) => write_inline_array(a, options, layout, out)?,
    }
    Ok(())
}

/// Digits grouped by three with `_`.
fn write_integer(value: &Integer, out: &mut String) {
    let text = value.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    out.push_str(sign);
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('_');
        }
        out.push(c);
    }
}

fn write_float(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("nan");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { "inf" } else { "-inf" });
    } else {
        // Debug keeps a `.0` on integral values but writes `1e300` for very
        // large or small magnitudes; the mantissa still needs its point.
        let text = format!("{value:?}");
        match text.split_once('e') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => {
                let _ = write!(out, "{mantissa}.0e{exponent}");
            }
            _ => out.push_str(&text),
        }
    }
}

fn write_datetime(value: &Datetime, out: &mut String) {
    let _ = write!(out, "{value}");
}

fn write_string(value: &Str, out: &mut String) {
    let text = value.value.as_str();
    if text.contains('\n') {
        write_multiline_string(text, out);
    } else if text.contains('"') && !text.contains('\'') && !text.chars().any(needs_escape) {
        out.push('\'');
        out.push_str(text);
        out.push('\'');
    } else {
        write_basic_string(text, out);
    }
}

fn needs_escape(c: char) -> bool {
    (c < ' ' && c != '\t') || c == '\u{7f}'
}

fn write_escaped(c: char, out: &mut String) {
    match c {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        '\u{8}' => out.push_str("\\b"),
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\u{c}' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        c if needs_escape(c) => {
            let _ = write!(out, "\\u{:04X}", u32::from(c));
        }
        c => out.push(c),
    }
}

fn write_basic_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        write_escaped(c, out);
    }
    out.push('"');
}

/// `"""` on its own line, content with raw newlines, closing `"""`.
fn write_multiline_string(text: &str, out: &mut String) {
    out.push_str("\"\"\"\n");
    for c in text.chars() {
        match c {
            '\n' => out.push('\n'),
            c => write_escaped(c, out),
        }
    }
    out.push_str("\"\"\"");
}

fn write_inline_entries<'a>(
    entries: impl Iterator<Item = (&'a str, &'a Value)>,
    options: &StringifyOptions,
    out: &mut String,
) -> Result<()> {
    let mut parts = Vec::new();
    for (key, value) in entries {
        let mut part = format_key(key);
        part.push_str(" = ");
        write_value(value, options, Layout::SingleLine, &mut part)?;
        parts.push(part);
    }
    if parts.is_empty() {
        out.push_str("{}");
    } else {
        out.push_str("{ ");
        out.push_str(&parts.join(", "));
        out.push_str(" }");
    }
    Ok(())
}

/// An array of tables reached from inside an inline value: written as an
/// inline array of inline tables.
fn write_table_array(
    array: &Array,
    options: &StringifyOptions,
    layout: Layout,
    out: &mut String,
) -> Result<()> {
    let mut parts = Vec::with_capacity(array.len());
    for table in array.iter() {
        let mut part = String::new();
        write_inline_entries(table.iter(), options, &mut part)?;
        parts.push(part);
    }
    write_array_parts(&parts, options, layout, out);
    Ok(())
}

fn write_inline_array(
    array: &InlineArray,
    options: &StringifyOptions,
    layout: Layout,
    out: &mut String,
) -> Result<()> {
    check_homogeneous(array)?;
    let mut parts = Vec::with_capacity(array.len());
    for element in array.iter() {
        let mut part = String::new();
        write_value(element, options, Layout::Free, &mut part)?;
        parts.push(part);
    }
    write_array_parts(&parts, options, layout, out);
    Ok(())
}

fn check_homogeneous(array: &InlineArray) -> Result<()> {
    let mut types = array.iter().map(Value::content_type);
    if let Some(first) = types.next() {
        if let Some(other) = types.find(|t| *t != first) {
            return Err(CodecError::semantic(format!(
                "Inline arrays must be homogeneous: found {other} in an array of {first}"
            )));
        }
    }
    Ok(())
}

fn write_array_parts(
    parts: &[String],
    options: &StringifyOptions,
    layout: Layout,
    out: &mut String,
) {
    if parts.is_empty() {
        out.push_str("[]");
        return;
    }
    let joined = parts.join(", ");
    let fits = joined.chars().count() <= options.array_wrap_width && !joined.contains('\n');
    if fits || layout == Layout::SingleLine {
        out.push_str("[ ");
        out.push_str(&joined);
        out.push_str(" ]");
    } else {
        out.push_str("[\n");
        for part in parts {
            out.push_str("  ");
            out.push_str(part);
            out.push_str(",\n");
        }
        out.push(']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::WideInt;

    fn scalar(value: impl Into<Value>) -> String {
        stringify_scalar(&value.into()).unwrap()
    }

    #[test]
    fn groups_integer_digits() {
        assert_eq!(scalar(0), "0");
        assert_eq!(scalar(999), "999");
        assert_eq!(scalar(1000), "1_000");
        assert_eq!(scalar(-1234567), "-1_234_567");
        let wide = WideInt::from_decimal(false, "99999999999999999999").unwrap();
        assert_eq!(
            scalar(Value::Int(Integer::Wide(wide))),
            "99_999_999_999_999_999_999"
        );
    }

    #[test]
    fn floats_keep_a_float_form() {
        assert_eq!(scalar(1.0), "1.0");
        assert_eq!(scalar(-0.0), "-0.0");
        assert_eq!(scalar(0.5), "0.5");
        assert_eq!(scalar(1e300), "1e300");
        assert_eq!(scalar(f64::INFINITY), "inf");
        assert_eq!(scalar(f64::NEG_INFINITY), "-inf");
        assert_eq!(scalar(f64::NAN), "nan");
    }

    #[test]
    fn picks_string_form() {
        assert_eq!(scalar("plain"), "\"plain\"");
        assert_eq!(scalar("say \"hi\""), "'say \"hi\"'");
        assert_eq!(scalar("it's \"x\""), "\"it's \\\"x\\\"\"");
        assert_eq!(scalar("a\nb"), "\"\"\"\na\nb\"\"\"");
        assert_eq!(scalar("tab\there\u{1}"), "\"tab\\there\\u0001\"");
    }

    #[test]
    fn quotes_keys_only_when_needed() {
        assert_eq!(format_key("server-1_x"), "server-1_x");
        assert_eq!(format_key("a.b"), "\"a.b\"");
        assert_eq!(format_key(""), "\"\"");
    }

    #[test]
    fn wraps_long_arrays() {
        let short = InlineArray::from_values(vec![Value::from(1), Value::from(2)]).unwrap();
        assert_eq!(scalar(short), "[ 1, 2 ]");

        let words = (0..10).map(|i| Value::from(format!("word-number-{i}")));
        let long = InlineArray::from_values(words).unwrap();
        let text = scalar(long);
        assert!(text.starts_with("[\n  \"word-number-0\",\n"));
        assert!(text.ends_with("  \"word-number-9\",\n]"));

        assert_eq!(scalar(InlineArray::new()), "[]");
    }

    #[test]
    fn lays_out_plain_entries_before_sections() {
        let mut server = Table::new();
        server.insert("host", "localhost");
        let mut doc = Table::new();
        doc.insert("server", server);
        doc.insert("name", "ccjk");
        doc.insert("empty", Table::new());
        assert_eq!(
            stringify(&doc).unwrap(),
            "name = \"ccjk\"\nempty = {}\n\n[server]\nhost = \"localhost\"\n"
        );
    }

    #[test]
    fn writes_arrays_of_tables_as_repeated_headers() {
        let mut first = Table::new();
        first.insert("a", 1);
        let mut second = Table::new();
        second.insert("a", 2);
        let mut doc = Table::new();
        doc.insert("x", vec![first, second].into_iter().collect::<Array>());
        assert_eq!(
            stringify(&doc).unwrap(),
            "[[x]]\na = 1\n\n[[x]]\na = 2\n"
        );
    }

    #[test]
    fn rejects_non_table_documents() {
        let err = stringify_value(&Value::from(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
    }
}
