//! Multi-format emitter: a single tree traversal driving a format-specific
//! operations table, writing through any `std::io::Write` sink (an
//! in-memory buffer, a file, or a raw descriptor via `File`/`Stdout`), plus
//! a streaming variant that never needs the whole tree in memory (it is
//! driven incrementally by the caller instead).

use crate::char_table::{is_json_unsafe, is_key_continue, is_key_start, is_whitespace_unsafe};
use crate::value::{ObjectMap, Value, ValueData};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    CompactJson,
    Config,
    Yaml,
}

#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub format: Format,
    pub indent_width: usize,
}

impl FormatOptions {
    pub fn new(format: Format) -> Self {
        FormatOptions {
            format,
            indent_width: 4,
        }
    }
}

/// Render `value` to the given format. Convenience wrapper around
/// [`emit_full`] for callers that just want a `String`; builds on a `Vec<u8>`
/// sink internally, so it shares the exact same traversal as the streaming
/// path rather than a separate string-only implementation.
pub fn emit(value: &Value, format: Format) -> String {
    let mut buf = Vec::new();
    emit_full(value, format, &mut buf).expect("writing to a Vec<u8> cannot fail");
    String::from_utf8(buf).expect("emitter only ever writes valid UTF-8")
}

/// Render `value` to the given format, writing incrementally to `sink`
/// instead of building the whole rendered document in memory first. `sink`
/// may be a `Vec<u8>` (in-memory buffer), a `std::fs::File` (file stream), or
/// `std::io::Stdout`/any other raw descriptor wrapper.
pub fn emit_full<W: Write>(value: &Value, format: Format, sink: &mut W) -> io::Result<()> {
    let opts = FormatOptions::new(format);
    match format {
        Format::Json | Format::CompactJson => write_value(sink, value, &opts, 0, true),
        Format::Config => write_config_root(sink, value, &opts),
        Format::Yaml => write_yaml_root(sink, value, &opts),
    }
}

fn indent<W: Write>(out: &mut W, opts: &FormatOptions, depth: usize) -> io::Result<()> {
    if matches!(opts.format, Format::Json | Format::Config | Format::Yaml) {
        for _ in 0..depth * opts.indent_width {
            out.write_all(b" ")?;
        }
    }
    Ok(())
}

fn newline_indent<W: Write>(out: &mut W, opts: &FormatOptions, depth: usize) -> io::Result<()> {
    match opts.format {
        Format::CompactJson => Ok(()),
        _ => {
            out.write_all(b"\n")?;
            indent(out, opts, depth)
        }
    }
}

/// Shared JSON/CompactJSON traversal (identical structurally; only separators differ).
fn write_value<W: Write>(out: &mut W, value: &Value, opts: &FormatOptions, depth: usize, top: bool) -> io::Result<()> {
    match &*value.borrow_data() {
        ValueData::Null => out.write_all(b"null"),
        ValueData::Bool(b) => out.write_all(if *b { b"true" } else { b"false" }),
        ValueData::Int(i) => write!(out, "{i}"),
        ValueData::Float(f) => out.write_all(format_float(*f).as_bytes()),
        ValueData::Time(t) => out.write_all(format_float(*t).as_bytes()),
        ValueData::String(s) => write_json_string(out, s),
        ValueData::Array(items) => write_json_array(out, items, opts, depth),
        ValueData::Object(map) => {
            let _ = top;
            write_json_object_expanding_chains(out, map, opts, depth)
        }
        ValueData::Userdata(_) => out.write_all(b"null"),
    }
}

fn write_json_array<W: Write>(out: &mut W, items: &[Value], opts: &FormatOptions, depth: usize) -> io::Result<()> {
    out.write_all(b"[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        newline_indent(out, opts, depth + 1)?;
        write_value(out, item, opts, depth + 1, false)?;
    }
    if !items.is_empty() {
        newline_indent(out, opts, depth)?;
    }
    out.write_all(b"]")
}

/// Implicit-array-as-JSON-array rendering used when a key's chain has length > 1
/// (JSON/CompactJSON family represents the duplicate-key chain as an array).
fn write_json_object_expanding_chains<W: Write>(
    out: &mut W,
    map: &ObjectMap,
    opts: &FormatOptions,
    depth: usize,
) -> io::Result<()> {
    out.write_all(b"{")?;
    let mut first = true;
    for (key, head) in map.iter() {
        if !first {
            out.write_all(b",")?;
        }
        first = false;
        newline_indent(out, opts, depth + 1)?;
        write_json_string(out, key)?;
        match opts.format {
            Format::CompactJson => out.write_all(b":")?,
            _ => out.write_all(b": ")?,
        }
        if head.chain_len() > 1 {
            out.write_all(b"[")?;
            for (i, item) in head.chain_iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                write_value(out, &item, opts, depth + 1, false)?;
            }
            out.write_all(b"]")?;
        } else {
            write_value(out, &head, opts, depth + 1, false)?;
        }
    }
    if !first {
        newline_indent(out, opts, depth)?;
    }
    out.write_all(b"}")
}

pub fn write_json_string<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    out.write_all(b"\"")?;
    for ch in s.chars() {
        match ch {
            '"' => out.write_all(b"\\\"")?,
            '\\' => out.write_all(b"\\\\")?,
            '\n' => out.write_all(b"\\n")?,
            '\r' => out.write_all(b"\\r")?,
            '\t' => out.write_all(b"\\t")?,
            '\u{8}' => out.write_all(b"\\b")?,
            '\u{c}' => out.write_all(b"\\f")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => write!(out, "{c}")?,
        }
    }
    out.write_all(b"\"")
}

/// `value == floor(value)` -> `X.0`; near-integral -> `%g`-style; else `%f`-style.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if f == f.floor() && f.abs() < i64::MAX as f64 {
        return format!("{:.1}", f);
    }
    if (f - f.round()).abs() < 1e-7 {
        let s = format!("{:.15e}", f);
        if let Ok(parsed) = s.parse::<f64>() {
            if parsed == f {
                return format!("{}", f);
            }
        }
    }
    format!("{}", f)
}

/// Does this key need quoting in Config output. Leans on the same byte
/// classification the lexer uses for bare keys (`is_key_start`/
/// `is_key_continue`), widened to also allow `.`/`-` after the first byte,
/// since Config-format keys (e.g. keys round-tripped from JSON) tolerate
/// those mid-key even though the parser's own bare-key grammar does not.
fn key_needs_quoting(key: &str) -> bool {
    match key.as_bytes().split_first() {
        None => true,
        Some((&first, rest)) => {
            if !is_key_start(first) {
                return true;
            }
            !rest.iter().all(|&b| is_key_continue(b) || b == b'.' || b == b'-')
        }
    }
}

fn write_config_root<W: Write>(out: &mut W, value: &Value, opts: &FormatOptions) -> io::Result<()> {
    match value.with_object(|o| o.clone()) {
        Some(map) => write_config_object_body(out, &map, opts, 0),
        None => write_value(out, value, opts, 0, true),
    }
}

fn write_config_object_body<W: Write>(out: &mut W, map: &ObjectMap, opts: &FormatOptions, depth: usize) -> io::Result<()> {
    for (key, head) in map.iter() {
        for item in head.chain_iter() {
            indent(out, opts, depth)?;
            if key_needs_quoting(key) {
                write_json_string(out, key)?;
            } else {
                out.write_all(key.as_bytes())?;
            }
            write_config_value(out, &item, opts, depth, key)?;
        }
    }
    Ok(())
}

fn write_config_value<W: Write>(out: &mut W, value: &Value, opts: &FormatOptions, depth: usize, _key: &str) -> io::Result<()> {
    match &*value.borrow_data() {
        ValueData::Object(map) => {
            out.write_all(b" {\n")?;
            write_config_object_body(out, map, opts, depth + 1)?;
            indent(out, opts, depth)?;
            out.write_all(b"}\n")
        }
        ValueData::Array(items) => {
            out.write_all(b" [\n")?;
            for item in items {
                indent(out, opts, depth + 1)?;
                write_config_scalar(out, item)?;
                out.write_all(b",\n")?;
            }
            indent(out, opts, depth)?;
            out.write_all(b"]\n")
        }
        _ => {
            out.write_all(b" = ")?;
            write_config_scalar(out, value)?;
            out.write_all(b";\n")
        }
    }
}

fn write_config_scalar<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    match &*value.borrow_data() {
        ValueData::Null => out.write_all(b"null"),
        ValueData::Bool(b) => out.write_all(if *b { b"true" } else { b"false" }),
        ValueData::Int(i) => write!(out, "{i}"),
        ValueData::Float(f) => out.write_all(format_float(*f).as_bytes()),
        ValueData::Time(t) => out.write_all(format_float(*t).as_bytes()),
        ValueData::String(s) => write_json_string(out, s),
        other => {
            let _ = other;
            out.write_all(b"null")
        }
    }
}

fn write_yaml_root<W: Write>(out: &mut W, value: &Value, opts: &FormatOptions) -> io::Result<()> {
    match value.with_object(|o| o.clone()) {
        Some(map) => write_yaml_object_body(out, &map, opts, 0),
        None => write_yaml_value(out, value, opts, 0),
    }
}

/// Does this scalar need quoting in YAML output. `is_whitespace_unsafe` on
/// the leading/trailing byte mirrors the lexer's own "whitespace excluding
/// newlines" class; `is_json_unsafe` catches control bytes and `"`/`\`
/// uniformly rather than special-casing `\n` by hand.
fn yaml_scalar_needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("null") {
        return true;
    }
    if s.parse::<f64>().is_ok() {
        return true;
    }
    let bytes = s.as_bytes();
    if is_whitespace_unsafe(bytes[0]) || is_whitespace_unsafe(bytes[bytes.len() - 1]) {
        return true;
    }
    bytes.iter().any(|&b| is_json_unsafe(b) || matches!(b, b':' | b'#' | b'\'' | b'-'))
}

fn write_yaml_scalar<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    match &*value.borrow_data() {
        ValueData::Null => out.write_all(b"null"),
        ValueData::Bool(b) => out.write_all(if *b { b"true" } else { b"false" }),
        ValueData::Int(i) => write!(out, "{i}"),
        ValueData::Float(f) => out.write_all(format_float(*f).as_bytes()),
        ValueData::Time(t) => out.write_all(format_float(*t).as_bytes()),
        ValueData::String(s) => {
            if yaml_scalar_needs_quoting(s) {
                write_json_string(out, s)
            } else {
                out.write_all(s.as_bytes())
            }
        }
        _ => out.write_all(b"null"),
    }
}

fn write_yaml_object_body<W: Write>(out: &mut W, map: &ObjectMap, opts: &FormatOptions, depth: usize) -> io::Result<()> {
    for (key, head) in map.iter() {
        indent(out, opts, depth)?;
        out.write_all(key.as_bytes())?;
        out.write_all(b":")?;
        if head.chain_len() > 1 {
            out.write_all(b"\n")?;
            for item in head.chain_iter() {
                indent(out, opts, depth + 1)?;
                out.write_all(b"- ")?;
                write_yaml_scalar(out, &item)?;
                out.write_all(b"\n")?;
            }
        } else {
            write_yaml_value(out, &head, opts, depth)?;
        }
    }
    Ok(())
}

fn write_yaml_value<W: Write>(out: &mut W, value: &Value, opts: &FormatOptions, depth: usize) -> io::Result<()> {
    match &*value.borrow_data() {
        ValueData::Object(map) => {
            out.write_all(b"\n")?;
            write_yaml_object_body(out, map, opts, depth + 1)
        }
        ValueData::Array(items) => {
            out.write_all(b"\n")?;
            for item in items {
                indent(out, opts, depth + 1)?;
                out.write_all(b"- ")?;
                write_yaml_scalar(out, item)?;
                out.write_all(b"\n")?;
            }
            Ok(())
        }
        _ => {
            out.write_all(b" ")?;
            write_yaml_scalar(out, value)?;
            out.write_all(b"\n")
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming emitter
// ---------------------------------------------------------------------------

enum Frame {
    Object { first: bool },
    Array { first: bool },
}

/// Incremental emitter: the caller drives `start_container`/`add_object`/
/// `end_container` without ever materializing a [`Value`] tree, and every
/// call writes straight through to `sink` rather than an internal buffer —
/// so a multi-gigabyte document can be streamed to a file or socket a piece
/// at a time. Mirrors the spec's four streaming operations plus
/// `start`/`finish`.
pub struct StreamEmitter<W: Write> {
    sink: W,
    opts: FormatOptions,
    stack: Vec<Frame>,
    depth: usize,
}

impl<W: Write> StreamEmitter<W> {
    pub fn start(format: Format, sink: W) -> Self {
        StreamEmitter {
            sink,
            opts: FormatOptions::new(format),
            stack: Vec::new(),
            depth: 0,
        }
    }

    fn before_item(&mut self) -> io::Result<()> {
        if let Some(frame) = self.stack.last_mut() {
            let first = match frame {
                Frame::Object { first } | Frame::Array { first } => {
                    let was_first = *first;
                    *first = false;
                    was_first
                }
            };
            if !first {
                self.sink.write_all(b",")?;
            }
            newline_indent(&mut self.sink, &self.opts, self.depth)?;
        }
        Ok(())
    }

    pub fn start_container_object(&mut self, key: Option<&str>) -> io::Result<()> {
        self.before_item()?;
        if let Some(k) = key {
            write_json_string(&mut self.sink, k)?;
            self.sink.write_all(b":")?;
        }
        self.sink.write_all(b"{")?;
        self.depth += 1;
        self.stack.push(Frame::Object { first: true });
        Ok(())
    }

    pub fn start_container_array(&mut self, key: Option<&str>) -> io::Result<()> {
        self.before_item()?;
        if let Some(k) = key {
            write_json_string(&mut self.sink, k)?;
            self.sink.write_all(b":")?;
        }
        self.sink.write_all(b"[")?;
        self.depth += 1;
        self.stack.push(Frame::Array { first: true });
        Ok(())
    }

    pub fn add_object(&mut self, key: Option<&str>, value: &Value) -> io::Result<()> {
        self.before_item()?;
        if let Some(k) = key {
            write_json_string(&mut self.sink, k)?;
            self.sink.write_all(b":")?;
        }
        write_value(&mut self.sink, value, &self.opts, self.depth, false)
    }

    pub fn end_container(&mut self) -> io::Result<()> {
        let frame = self.stack.pop().expect("end_container without matching start");
        self.depth -= 1;
        let empty = matches!(&frame, Frame::Object { first: true } | Frame::Array { first: true });
        if !empty {
            newline_indent(&mut self.sink, &self.opts, self.depth)?;
        }
        match frame {
            Frame::Object { .. } => self.sink.write_all(b"}"),
            Frame::Array { .. } => self.sink.write_all(b"]"),
        }
    }

    /// Close any containers still open, flush, and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        while !self.stack.is_empty() {
            self.end_container()?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}
