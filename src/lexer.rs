//! Number and string lexing primitives shared by the parser: suffix-aware
//! number literals, quoted/unquoted/heredoc strings, and boolean recognition.

use crate::char_table::{is_digit, is_escape_char, is_value_end};
use crate::chunk::Chunk;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
    Time(f64),
}

/// Skip `#`/`//` line comments and nested `/* ... */` block comments, plus
/// plain whitespace, until a non-trivial byte or end of chunk is reached.
pub fn skip_whitespace_and_comments(chunk: &mut Chunk) -> Result<()> {
    loop {
        match chunk.peek() {
            Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                chunk.advance();
            }
            Some(b'#') => {
                while let Some(b) = chunk.peek() {
                    if b == b'\n' {
                        break;
                    }
                    chunk.advance();
                }
            }
            Some(b'/') if chunk.peek_at(1) == Some(b'/') => {
                while let Some(b) = chunk.peek() {
                    if b == b'\n' {
                        break;
                    }
                    chunk.advance();
                }
            }
            Some(b'/') if chunk.peek_at(1) == Some(b'*') => {
                skip_block_comment(chunk)?;
            }
            _ => break,
        }
    }
    Ok(())
}

fn skip_block_comment(chunk: &mut Chunk) -> Result<()> {
    chunk.advance(); // '/'
    chunk.advance(); // '*'
    let mut depth = 1usize;
    loop {
        match (chunk.peek(), chunk.peek_at(1)) {
            (Some(b'/'), Some(b'*')) => {
                chunk.advance();
                chunk.advance();
                depth += 1;
            }
            (Some(b'*'), Some(b'/')) => {
                chunk.advance();
                chunk.advance();
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            (Some(_), _) => {
                chunk.advance();
            }
            (None, _) => {
                return Err(Error::syntax(
                    chunk.line(),
                    chunk.column(),
                    "unterminated block comment",
                    None,
                ));
            }
        }
    }
}

/// Quoted string: `"`-delimited, JSON-style escapes including `\uXXXX`.
pub fn lex_quoted_string(chunk: &mut Chunk) -> Result<String> {
    debug_assert_eq!(chunk.peek(), Some(b'"'));
    chunk.advance();
    let mut out = Vec::new();
    loop {
        match chunk.advance() {
            None => {
                return Err(Error::syntax(
                    chunk.line(),
                    chunk.column(),
                    "unterminated quoted string",
                    None,
                ));
            }
            Some(b'"') => return Ok(String::from_utf8_lossy(&out).into_owned()),
            Some(b'\\') => {
                let esc = chunk.advance().ok_or_else(|| {
                    Error::syntax(chunk.line(), chunk.column(), "unterminated escape", None)
                })?;
                if !is_escape_char(esc) {
                    return Err(Error::syntax(
                        chunk.line(),
                        chunk.column(),
                        "invalid escape sequence",
                        Some(esc),
                    ));
                }
                match esc {
                    b'"' => out.push(b'"'),
                    b'\\' => out.push(b'\\'),
                    b'/' => out.push(b'/'),
                    b'b' => out.push(0x8),
                    b'f' => out.push(0xc),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let h = chunk.advance().ok_or_else(|| {
                                Error::syntax(chunk.line(), chunk.column(), "truncated \\u escape", None)
                            })?;
                            let digit = (h as char).to_digit(16).ok_or_else(|| {
                                Error::syntax(chunk.line(), chunk.column(), "invalid hex digit in \\u escape", Some(h))
                            })?;
                            code = code * 16 + digit;
                        }
                        let ch = char::from_u32(code).ok_or_else(|| {
                            Error::syntax(chunk.line(), chunk.column(), "invalid unicode code point", None)
                        })?;
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    _ => unreachable!("validated by is_escape_char above"),
                }
            }
            Some(b) if b < 0x20 => {
                return Err(Error::syntax(
                    chunk.line(),
                    chunk.column(),
                    "raw control byte in quoted string",
                    Some(b),
                ));
            }
            Some(b) => {
                // Input is UTF-8 by convention; collect raw bytes and decode once at the
                // end (matches `lex_unquoted_atom`), so multi-byte sequences survive intact.
                out.push(b);
            }
        }
    }
}

/// Unquoted string: runs to the first value terminator or comment start, with
/// balanced `{}`/`[]` tolerated inside. Leading/trailing whitespace is trimmed.
pub fn lex_unquoted_atom(chunk: &mut Chunk) -> Result<String> {
    let mut depth_brace = 0i32;
    let mut depth_bracket = 0i32;
    let mut bytes = Vec::new();
    loop {
        let b = match chunk.peek() {
            Some(b) => b,
            None => break,
        };
        if depth_brace == 0 && depth_bracket == 0 {
            if is_value_end(b) {
                break;
            }
            if b == b'#' || (b == b'/' && (chunk.peek_at(1) == Some(b'/') || chunk.peek_at(1) == Some(b'*'))) {
                break;
            }
        }
        match b {
            b'{' => depth_brace += 1,
            b'}' => depth_brace = (depth_brace - 1).max(0),
            b'[' => depth_bracket += 1,
            b']' => depth_bracket = (depth_bracket - 1).max(0),
            _ => {}
        }
        bytes.push(b);
        chunk.advance();
    }
    let s = String::from_utf8_lossy(&bytes).trim().to_string();
    Ok(s)
}

/// Heredoc: `<<TAG\n...\nTAG\n`. `TAG` must be all-uppercase ASCII.
pub fn lex_heredoc(chunk: &mut Chunk) -> Result<String> {
    debug_assert_eq!(chunk.peek(), Some(b'<'));
    chunk.advance();
    chunk.advance(); // second '<'
    let mut tag = Vec::new();
    while let Some(b) = chunk.peek() {
        if b == b'\n' {
            break;
        }
        if !b.is_ascii_uppercase() {
            return Err(Error::syntax(
                chunk.line(),
                chunk.column(),
                "heredoc tag must be all-uppercase ASCII",
                Some(b),
            ));
        }
        tag.push(b);
        chunk.advance();
    }
    if tag.is_empty() {
        return Err(Error::syntax(chunk.line(), chunk.column(), "empty heredoc tag", None));
    }
    chunk.advance(); // consume the newline after the tag
    let mut content = Vec::new();
    loop {
        let mut line = Vec::new();
        loop {
            match chunk.peek() {
                None | Some(b'\n') => break,
                Some(b) => {
                    line.push(b);
                    chunk.advance();
                }
            }
        }
        let had_newline = chunk.peek() == Some(b'\n');
        if had_newline {
            chunk.advance();
        }
        if line == tag {
            return Ok(String::from_utf8_lossy(&content).to_string());
        }
        if !had_newline && chunk.at_end() {
            return Err(Error::syntax(
                chunk.line(),
                chunk.column(),
                "unterminated heredoc",
                None,
            ));
        }
        content.extend_from_slice(&line);
        content.push(b'\n');
    }
}

/// After unquoted capture, retype common boolean spellings. Case-insensitive.
pub fn recognize_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Numeric suffix table, checked in the precedence order the spec lists.
/// Returns `None` when no suffix matches so the caller can fall back to bare Int/Float.
fn apply_suffix(mantissa: f64, is_integral: bool, suffix: &str) -> Option<Number> {
    let lower = suffix.to_ascii_lowercase();
    match lower.as_str() {
        "ms" => Some(Number::Time(mantissa * 0.001)),
        "kb" => Some(Number::Int((mantissa * 1024.0) as i64)),
        "mb" => Some(Number::Int((mantissa * 1024.0 * 1024.0) as i64)),
        "gb" => Some(Number::Int((mantissa * 1024.0 * 1024.0 * 1024.0) as i64)),
        "k" => int_or_float(mantissa * 1_000.0, is_integral),
        "m" => int_or_float(mantissa * 1_000_000.0, is_integral),
        "g" => int_or_float(mantissa * 1_000_000_000.0, is_integral),
        "s" => Some(Number::Time(mantissa)),
        "h" => Some(Number::Time(mantissa * 3600.0)),
        "d" => Some(Number::Time(mantissa * 86_400.0)),
        "w" => Some(Number::Time(mantissa * 604_800.0)),
        "y" => Some(Number::Time(mantissa * 31_536_000.0)),
        "min" => Some(Number::Time(mantissa * 60.0)),
        _ => None,
    }
}

fn int_or_float(v: f64, is_integral: bool) -> Option<Number> {
    if is_integral && v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
        Some(Number::Int(v as i64))
    } else {
        Some(Number::Float(v))
    }
}

/// Lex a number at the current position, applying the suffix table. On an
/// unrecognized suffix, rewinds to the mark and re-scans the bare numeric
/// atom only (the spec: "accepted as Int/Float" when followed by a terminator;
/// callers needing the string-fallback behavior check `terminator_ok` via
/// `lex_number_or_atom`).
pub fn lex_number(chunk: &mut Chunk, no_time: bool) -> Result<Number> {
    match lex_number_or_atom(chunk, no_time)? {
        NumberOrAtom::Number(n) => Ok(n),
        NumberOrAtom::FallbackToAtom => Err(Error::syntax(
            chunk.line(),
            chunk.column(),
            "ambiguous numeric atom, falling back to string",
            None,
        )),
    }
}

pub enum NumberOrAtom {
    Number(Number),
    /// Suffix did not match and was not followed by a terminator: the whole
    /// atom must be re-lexed as an unquoted string by the caller. The chunk
    /// cursor has been rewound to the start of the atom.
    FallbackToAtom,
}

pub fn lex_number_or_atom(chunk: &mut Chunk, no_time: bool) -> Result<NumberOrAtom> {
    let mark = chunk.mark();
    let (digits, is_integral, saw_digit) = scan_numeric_body(chunk);

    if !saw_digit {
        chunk.reset(mark);
        return Ok(NumberOrAtom::FallbackToAtom);
    }

    let suffix_start = chunk.mark();
    let mut suffix = String::new();
    while let Some(b) = chunk.peek() {
        if b.is_ascii_alphabetic() {
            suffix.push(b as char);
            chunk.advance();
        } else {
            break;
        }
    }
    let terminator_ok = chunk.peek().map(is_value_end).unwrap_or(true);

    if suffix.is_empty() {
        return Ok(NumberOrAtom::Number(parse_bare(&digits, is_integral, chunk)?));
    }

    if !no_time {
        if let Some(mantissa) = digits.parse::<f64>().ok() {
            if let Some(n) = apply_suffix(mantissa, is_integral, &suffix) {
                return Ok(NumberOrAtom::Number(n));
            }
        }
    }

    if terminator_ok {
        // Unrecognized (or NoTime-suppressed) suffix, but it's followed by a
        // terminator: the suffix bytes are not part of the number at all in
        // that case per spec wording ("accepted as Int/Float"), so drop them.
        chunk.reset(suffix_start);
        return Ok(NumberOrAtom::Number(parse_bare(&digits, is_integral, chunk)?));
    }

    chunk.reset(mark);
    Ok(NumberOrAtom::FallbackToAtom)
}

fn scan_numeric_body(chunk: &mut Chunk) -> (String, bool, bool) {
    let mut digits = String::new();
    if chunk.peek() == Some(b'-') {
        digits.push('-');
        chunk.advance();
    }
    let mut saw_digit = false;
    while let Some(b) = chunk.peek() {
        if is_digit(b) {
            digits.push(b as char);
            saw_digit = true;
            chunk.advance();
        } else {
            break;
        }
    }
    let mut is_integral = true;
    if chunk.peek() == Some(b'.') && chunk.peek_at(1).map(is_digit).unwrap_or(false) {
        is_integral = false;
        digits.push('.');
        chunk.advance();
        while let Some(b) = chunk.peek() {
            if is_digit(b) {
                digits.push(b as char);
                chunk.advance();
            } else {
                break;
            }
        }
    }
    if matches!(chunk.peek(), Some(b'e') | Some(b'E')) {
        let save = chunk.mark();
        let mut exp = String::new();
        exp.push(chunk.advance().unwrap() as char);
        if matches!(chunk.peek(), Some(b'+') | Some(b'-')) {
            exp.push(chunk.advance().unwrap() as char);
        }
        let mut exp_digits = false;
        while let Some(b) = chunk.peek() {
            if is_digit(b) {
                exp.push(b as char);
                exp_digits = true;
                chunk.advance();
            } else {
                break;
            }
        }
        if exp_digits {
            is_integral = false;
            digits.push_str(&exp);
        } else {
            chunk.reset(save);
        }
    }
    (digits, is_integral, saw_digit)
}

fn parse_bare(digits: &str, is_integral: bool, chunk: &Chunk) -> Result<Number> {
    if is_integral {
        digits
            .parse::<i64>()
            .map(Number::Int)
            .map_err(|_| Error::syntax(chunk.line(), chunk.column(), "numeric value out of range", None))
    } else {
        digits
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| Error::syntax(chunk.line(), chunk.column(), "numeric value out of range", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Number {
        let mut c = Chunk::new(input.as_bytes().to_vec(), 0);
        lex_number(&mut c, false).unwrap()
    }

    #[test]
    fn plain_int_and_float() {
        assert_eq!(lex("42"), Number::Int(42));
        assert_eq!(lex("3.5"), Number::Float(3.5));
        assert_eq!(lex("-7"), Number::Int(-7));
    }

    #[test]
    fn suffix_table_matches_spec_boundary_cases() {
        assert_eq!(lex("10k"), Number::Int(10_000));
        assert_eq!(lex("10kb"), Number::Int(10_240));
        assert_eq!(lex("10min"), Number::Time(600.0));
        assert_eq!(lex("0.2s"), Number::Time(0.2));
        assert_eq!(lex("10ms"), Number::Time(0.01));
    }

    #[test]
    fn no_time_mode_treats_suffix_as_bare_terminator_case() {
        let mut c = Chunk::new(b"10s".to_vec(), 0);
        let n = lex_number(&mut c, true).unwrap();
        assert_eq!(n, Number::Int(10));
    }

    #[test]
    fn quoted_string_handles_escapes() {
        let mut c = Chunk::new(br#""a\nb\"c""#.to_vec(), 0);
        assert_eq!(lex_quoted_string(&mut c).unwrap(), "a\nb\"c");
    }

    #[test]
    fn quoted_string_preserves_multibyte_utf8() {
        let mut c = Chunk::new("\"caf\u{e9}\"".as_bytes().to_vec(), 0);
        assert_eq!(lex_quoted_string(&mut c).unwrap(), "caf\u{e9}");
    }

    #[test]
    fn unquoted_atom_stops_at_terminator() {
        let mut c = Chunk::new(b"hello, world".to_vec(), 0);
        assert_eq!(lex_unquoted_atom(&mut c).unwrap(), "hello");
    }

    #[test]
    fn unquoted_atom_tolerates_balanced_braces() {
        let mut c = Chunk::new(b"{a,b},".to_vec(), 0);
        assert_eq!(lex_unquoted_atom(&mut c).unwrap(), "{a,b}");
    }

    #[test]
    fn heredoc_reads_until_tag_line() {
        let mut c = Chunk::new(b"<<EOF\nline one\nline two\nEOF\n".to_vec(), 0);
        assert_eq!(lex_heredoc(&mut c).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn boolean_recognition_is_case_insensitive() {
        assert_eq!(recognize_bool("TRUE"), Some(true));
        assert_eq!(recognize_bool("yes"), Some(true));
        assert_eq!(recognize_bool("Off"), Some(false));
        assert_eq!(recognize_bool("maybe"), None);
    }
}
