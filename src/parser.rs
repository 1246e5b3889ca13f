//! The parser state machine: `Init -> Key -> Value -> AfterValue -> MacroName
//! -> MacroBody -> Error`, driving a stack of open containers over a
//! [`ChunkStack`](crate::chunk::ChunkStack).

use crate::char_table::{
    is_digit_start, is_key_continue, is_key_sep, is_key_start, is_value_str_start,
};
use crate::chunk::ChunkStack;
use crate::error::{Error, Result};
use crate::lexer::{
    lex_heredoc, lex_number_or_atom, lex_quoted_string, lex_unquoted_atom, recognize_bool,
    skip_whitespace_and_comments, Number, NumberOrAtom,
};
use crate::macros::MacroEngine;
use crate::value::Value;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ParserFlags: u8 {
        /// Lowercase every key at insertion time.
        const KEY_LOWERCASE = 1 << 0;
        /// Skip `VALUE_ALLOCATED` flag bookkeeping on string leaves. The tree
        /// still owns its bytes either way; this only affects `Value::flags()`.
        const ZERO_COPY = 1 << 1;
        /// Disable time suffixes; numeric suffixes fall through to unquoted strings.
        const NO_TIME = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Key,
    Value,
    AfterValue,
    MacroName,
    MacroBody,
    Error,
}

enum Container {
    Object(Value),
    Array(Value),
}

/// A scalar token as it comes off the lexer, before `${VAR}` expansion and
/// (for unquoted atoms) boolean/null/NaN reinterpretation are applied.
enum RawScalar {
    Quoted(String),
    Heredoc(String),
    Number(Number),
    Atom(String),
}

/// A single parse. Transitioning to `Error` is terminal: every later call
/// returns `StateError`, matching the spec's propagation policy.
pub struct Parser {
    chunks: ChunkStack,
    stack: Vec<Container>,
    state: State,
    flags: ParserFlags,
    pub macros: MacroEngine,
    pending_key: Option<String>,
    error: Option<Error>,
    root: Option<Value>,
}

impl Parser {
    pub fn new(flags: ParserFlags) -> Self {
        Parser {
            chunks: ChunkStack::new(),
            stack: Vec::new(),
            state: State::Init,
            flags,
            macros: MacroEngine::new(),
            pending_key: None,
            error: None,
            root: None,
        }
    }

    pub fn add_chunk(&mut self, bytes: impl Into<Vec<u8>>, priority: u8) -> Result<()> {
        if self.state == State::Error {
            return Err(Error::StateError);
        }
        self.chunks.push(bytes.into(), priority)
    }

    pub fn add_string(&mut self, s: impl AsRef<str>, priority: u8) -> Result<()> {
        self.add_chunk(s.as_ref().as_bytes().to_vec(), priority)
    }

    pub fn add_file(&mut self, path: impl AsRef<std::path::Path>, priority: u8) -> Result<()> {
        let bytes = std::fs::read(path.as_ref())?;
        self.add_chunk(bytes, priority)
    }

    pub fn get_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Drive the state machine to completion and return the root value.
    pub fn get_object(&mut self) -> Result<Value> {
        if self.state == State::Error {
            return Err(self.error.take().unwrap_or(Error::StateError));
        }
        match self.run() {
            Ok(v) => Ok(v),
            Err(e) => {
                self.state = State::Error;
                self.error = Some(clone_error(&e));
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<Value> {
        loop {
            if !self.chunks.settle() {
                break;
            }
            self.step()?;
        }
        self.root
            .clone()
            .ok_or_else(|| Error::syntax(1, 1, "empty document", None))
    }

    fn step(&mut self) -> Result<()> {
        log::trace!("parser state {:?}", self.state);
        match self.state {
            State::Init => self.step_init(),
            State::Key => self.step_key(),
            State::Value => self.step_value(),
            State::AfterValue => self.step_after_value(),
            State::MacroName => self.step_macro_name(),
            State::MacroBody => self.step_macro_body(),
            State::Error => Err(Error::StateError),
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        skip_whitespace_and_comments(self.chunks.top_mut().expect("chunk present"))
    }

    fn step_init(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let first = self.chunks.top().and_then(|c| c.peek());
        match first {
            Some(b'[') => {
                self.chunks.top_mut().unwrap().advance();
                let arr = Value::empty_array();
                self.root = Some(arr.clone());
                self.stack.push(Container::Array(arr));
                self.state = State::Value;
            }
            Some(b'{') => {
                self.chunks.top_mut().unwrap().advance();
                let obj = Value::empty_object();
                self.root = Some(obj.clone());
                self.stack.push(Container::Object(obj));
                self.state = State::Key;
            }
            _ => {
                let obj = Value::empty_object();
                self.root = Some(obj.clone());
                self.stack.push(Container::Object(obj));
                self.state = State::Key;
            }
        }
        Ok(())
    }

    fn step_key(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let chunk = self.chunks.top_mut().expect("chunk present");
        match chunk.peek() {
            None => {
                // Implicit top-level object with no closing brace is fine.
                self.pop_container_at_eof()
            }
            Some(b'}') => {
                chunk.advance();
                self.close_container()
            }
            Some(b'.') => {
                chunk.advance();
                self.state = State::MacroName;
                Ok(())
            }
            Some(b) if is_value_str_start(b) => {
                let key = lex_quoted_string(chunk)?;
                self.pending_key = Some(self.maybe_lowercase(key));
                self.consume_key_separator()?;
                self.state = State::Value;
                Ok(())
            }
            Some(b) if is_key_start(b) => {
                let key = self.lex_bare_key()?;
                self.pending_key = Some(self.maybe_lowercase(key));
                self.consume_key_separator()?;
                self.state = State::Value;
                Ok(())
            }
            Some(b) => Err(Error::syntax(
                chunk.line(),
                chunk.column(),
                "expected a key",
                Some(b),
            )),
        }
    }

    fn lex_bare_key(&mut self) -> Result<String> {
        let chunk = self.chunks.top_mut().expect("chunk present");
        let mut out = String::new();
        while let Some(b) = chunk.peek() {
            if is_key_continue(b) {
                out.push(b as char);
                chunk.advance();
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn consume_key_separator(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let chunk = self.chunks.top_mut().expect("chunk present");
        match chunk.peek() {
            Some(b) if is_key_sep(b) => {
                chunk.advance();
                Ok(())
            }
            _ => Ok(()), // whitespace-only separator is allowed
        }
    }

    fn maybe_lowercase(&self, s: String) -> String {
        if self.flags.contains(ParserFlags::KEY_LOWERCASE) {
            s.to_lowercase()
        } else {
            s
        }
    }

    fn step_value(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let priority = self.chunks.current_priority();
        let no_time = self.flags.contains(ParserFlags::NO_TIME);
        let chunk = self.chunks.top_mut().expect("chunk present");
        let first = chunk.peek();
        let raw = match first {
            Some(b) if is_value_str_start(b) => RawScalar::Quoted(lex_quoted_string(chunk)?),
            Some(b'{') => {
                chunk.advance();
                let obj = Value::empty_object();
                self.push_pending(obj.clone(), priority);
                self.stack.push(Container::Object(obj));
                self.state = State::Key;
                return Ok(());
            }
            Some(b'[') => {
                chunk.advance();
                let arr = Value::empty_array();
                self.push_pending(arr.clone(), priority);
                self.stack.push(Container::Array(arr));
                self.state = State::Value;
                return Ok(());
            }
            Some(b'<') if chunk.peek_at(1) == Some(b'<') => RawScalar::Heredoc(lex_heredoc(chunk)?),
            Some(b) if is_digit_start(b) => match lex_number_or_atom(chunk, no_time)? {
                NumberOrAtom::Number(n) => RawScalar::Number(n),
                NumberOrAtom::FallbackToAtom => RawScalar::Atom(lex_unquoted_atom(chunk)?),
            },
            Some(_) => RawScalar::Atom(lex_unquoted_atom(chunk)?),
            None => {
                return Err(Error::syntax(chunk.line(), chunk.column(), "unexpected end of input", None));
            }
        };
        let value = self.scalar_to_value(raw);
        self.push_pending(value, priority);
        self.state = State::AfterValue;
        Ok(())
    }

    /// Build the final `Value` for a lexed scalar: numbers pass through as-is,
    /// quoted/unquoted text runs through `${VAR}` expansion first, and unquoted
    /// atoms are then retyped into bool/null/NaN/Inf when they match.
    fn scalar_to_value(&self, raw: RawScalar) -> Value {
        match raw {
            RawScalar::Quoted(s) => self.make_string(self.macros.expand_variables(&s)),
            RawScalar::Heredoc(s) => self.make_string(s),
            RawScalar::Number(Number::Int(i)) => Value::int(i),
            RawScalar::Number(Number::Float(f)) => Value::float(f),
            RawScalar::Number(Number::Time(t)) => Value::time(t),
            RawScalar::Atom(atom) => {
                let expanded = self.macros.expand_variables(&atom);
                if let Some(b) = recognize_bool(&expanded) {
                    Value::bool(b)
                } else if expanded.eq_ignore_ascii_case("null") {
                    Value::null()
                } else if expanded.eq_ignore_ascii_case("nan") {
                    Value::float(f64::NAN)
                } else if expanded.eq_ignore_ascii_case("inf") || expanded.eq_ignore_ascii_case("infinity") {
                    Value::float(f64::INFINITY)
                } else {
                    self.make_string(expanded)
                }
            }
        }
    }

    /// `ParserFlags::ZERO_COPY` opts out of `VALUE_ALLOCATED` flag bookkeeping
    /// on string leaves; the tree itself always owns its bytes either way.
    fn make_string(&self, s: String) -> Value {
        if self.flags.contains(ParserFlags::ZERO_COPY) {
            Value::string_unflagged(s)
        } else {
            Value::string(s)
        }
    }

    /// Insert `value` into the current container, applying implicit-array
    /// merging for duplicate keys inside objects. A key that collides with an
    /// entry inserted while a *different* chunk was on top (i.e. the entry
    /// predates, or postdates, the currently active `.include`) is priority-
    /// merged instead of chained: objects merge recursively, scalars resolve
    /// via `incoming_wins`, with the loser silently dropped. Ordinary
    /// duplicate keys within the same chunk still chain unconditionally.
    fn push_pending(&mut self, value: Value, priority: u8) {
        value.set_priority(priority);
        let depth = self.chunks.depth();
        match self.stack.last() {
            Some(Container::Array(arr)) => {
                arr.with_array_mut(|v| v.push(value));
            }
            Some(Container::Object(obj)) => {
                let key = self.pending_key.take().expect("key set before a value");
                let existing = obj.with_object(|o| o.get(&key).cloned()).flatten();
                match existing {
                    Some(existing_val) if existing_val.origin_depth() != depth => {
                        if existing_val.is_object() && value.is_object() {
                            priority_merge(&existing_val, &value);
                        } else if incoming_wins(&existing_val, &value) {
                            value.set_origin_depth(depth);
                            obj.with_object_mut(|o| {
                                o.insert(key, value);
                            });
                        }
                    }
                    _ => {
                        value.set_origin_depth(depth);
                        obj.object_insert(key, value);
                    }
                }
            }
            None => unreachable!("value produced with no open container"),
        }
    }

    fn step_after_value(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let chunk = self.chunks.top_mut().expect("chunk present");
        match chunk.peek() {
            Some(b',') | Some(b';') => {
                chunk.advance();
                self.skip_trivia()?;
                self.next_state_after_separator()
            }
            Some(b'}') | Some(b']') => self.close_container(),
            None => self.pop_container_at_eof(),
            Some(b) => Err(Error::syntax(
                chunk.line(),
                chunk.column(),
                "expected a separator or closing bracket",
                Some(b),
            )),
        }
    }

    fn next_state_after_separator(&mut self) -> Result<()> {
        // Trailing separators are allowed: if we're immediately at a closer, fall
        // through to close_container via AfterValue rather than demanding another item.
        let chunk = self.chunks.top().expect("chunk present");
        if matches!(chunk.peek(), Some(b'}') | Some(b']')) {
            self.state = State::AfterValue;
            return Ok(());
        }
        self.state = match self.stack.last() {
            Some(Container::Array(_)) => State::Value,
            Some(Container::Object(_)) => State::Key,
            None => State::Key,
        };
        Ok(())
    }

    fn close_container(&mut self) -> Result<()> {
        let chunk = self.chunks.top_mut().expect("chunk present");
        if matches!(chunk.peek(), Some(b'}') | Some(b']')) {
            chunk.advance();
        }
        self.stack.pop();
        self.state = match self.stack.last() {
            Some(_) => State::AfterValue,
            None => State::AfterValue,
        };
        if self.stack.is_empty() {
            // Document complete for this chunk; settle() will pop exhausted chunks.
        }
        Ok(())
    }

    fn pop_container_at_eof(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            self.stack.pop();
        }
        self.state = State::AfterValue;
        Ok(())
    }

    fn step_macro_name(&mut self) -> Result<()> {
        let chunk = self.chunks.top_mut().expect("chunk present");
        let mut name = String::new();
        while let Some(b) = chunk.peek() {
            if is_key_continue(b) {
                name.push(b as char);
                chunk.advance();
            } else {
                break;
            }
        }
        self.pending_key = Some(name);
        self.state = State::MacroBody;
        Ok(())
    }

    fn step_macro_body(&mut self) -> Result<()> {
        self.skip_trivia()?;
        let chunk = self.chunks.top_mut().expect("chunk present");
        let body = match chunk.peek() {
            Some(b) if is_value_str_start(b) => lex_quoted_string(chunk)?,
            _ => lex_unquoted_atom(chunk)?,
        };
        let name = self.pending_key.take().unwrap_or_default();
        let priority = self.chunks.current_priority();
        log::debug!("dispatching macro .{name} at priority {priority}");
        let outcome = self
            .macros
            .dispatch(&name, &body)
            .map_err(|e| Error::MacroError(e))?;
        if let Some(bytes) = outcome.include_bytes {
            log::debug!("macro .{name} included {} bytes", bytes.len());
            self.chunks.push(bytes, outcome.priority.unwrap_or(priority))?;
        }
        self.state = State::Key;
        Ok(())
    }
}

fn clone_error(e: &Error) -> Error {
    // `Error` does not derive Clone (it wraps `std::io::Error`, which cannot
    // losslessly clone); parser error-slot semantics only need a message.
    Error::InternalError(e.to_string())
}

/// Merge `incoming` into `base` per the priority rule: the existing value wins
/// on strictly greater priority; ties go to the incoming (last writer wins).
/// Object-vs-object collisions merge recursively.
pub fn priority_merge(base: &Value, incoming: &Value) {
    if base.is_object() && incoming.is_object() {
        incoming.with_object(|inc| {
            for (k, v) in inc.iter() {
                base.with_object(|b| b.get(k).cloned()).flatten().map_or_else(
                    || base.object_insert(k.clone(), v.clone()),
                    |existing| {
                        if existing.is_object() && v.is_object() {
                            priority_merge(&existing, v);
                        } else if incoming_wins(&existing, v) {
                            base.with_object_mut(|b| {
                                b.insert(k.clone(), v.clone());
                            });
                        }
                    },
                );
            }
        });
    }
}

fn incoming_wins(existing: &Value, incoming: &Value) -> bool {
    incoming.priority() >= existing.priority()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Value {
        let mut p = Parser::new(ParserFlags::empty());
        p.add_string(input, 0).unwrap();
        p.get_object().unwrap()
    }

    #[test]
    fn e1_bare_key_value_with_trailing_semicolon() {
        let v = parse("key = value;");
        assert!(v.is_object());
        let got = v.with_object(|o| o.get("key").cloned()).unwrap().unwrap();
        assert_eq!(got.as_str().unwrap(), "value");
    }

    #[test]
    fn e2_duplicate_keys_form_implicit_array() {
        let v = parse(r#"{ "a":1, "a":2 }"#);
        let head = v.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(head.chain_len(), 2);
        let vals: Vec<i64> = head.chain_iter().map(|x| x.as_int().unwrap()).collect();
        assert_eq!(vals, vec![1, 2]);
    }

    #[test]
    fn e3_numeric_suffix_in_context() {
        let v = parse("size = 2kb;");
        let got = v.with_object(|o| o.get("size").cloned()).unwrap().unwrap();
        assert_eq!(got.as_int().unwrap(), 2048);
    }

    #[test]
    fn e4_implicit_top_level_object_without_braces() {
        let v = parse(r#""param": "v", "param": "w""#);
        let head = v.with_object(|o| o.get("param").cloned()).unwrap().unwrap();
        assert_eq!(head.chain_len(), 2);
    }

    #[test]
    fn trailing_separators_are_allowed() {
        let v = parse("{a=1,}");
        assert_eq!(v.length(), 1);
        let arr = parse("x = [1,2,3,];");
        let got = arr.with_object(|o| o.get("x").cloned()).unwrap().unwrap();
        assert_eq!(got.with_array(|a| a.len()).unwrap(), 3);
    }

    #[test]
    fn nested_block_comment_is_fully_consumed() {
        let v = parse("a = /* /* */ */ 1;");
        let got = v.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(got.as_int().unwrap(), 1);
    }

    #[test]
    fn unterminated_block_comment_is_a_syntax_error() {
        let mut p = Parser::new(ParserFlags::empty());
        p.add_string("a = /* unterminated", 0).unwrap();
        assert!(p.get_object().is_err());
    }

    #[test]
    fn boolean_keywords_are_recognized_case_insensitively() {
        let v = parse("a = YES; b = off; c = true;");
        assert_eq!(v.with_object(|o| o.get("a").cloned()).unwrap().unwrap().as_bool(), Some(true));
        assert_eq!(v.with_object(|o| o.get("b").cloned()).unwrap().unwrap().as_bool(), Some(false));
        assert_eq!(v.with_object(|o| o.get("c").cloned()).unwrap().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn priority_merge_keeps_higher_priority_existing_value() {
        let base = Value::empty_object();
        let existing = Value::int(1);
        existing.set_priority(5);
        base.object_insert("a", existing);
        let incoming = Value::empty_object();
        let new_val = Value::int(2);
        new_val.set_priority(1);
        incoming.object_insert("a", new_val);
        priority_merge(&base, &incoming);
        assert_eq!(
            base.with_object(|o| o.get("a").cloned()).unwrap().unwrap().as_int(),
            Some(1)
        );
    }

    #[test]
    fn priority_merge_ties_let_incoming_win() {
        let base = Value::empty_object();
        base.object_insert("a", Value::int(1));
        let incoming = Value::empty_object();
        incoming.object_insert("a", Value::int(2));
        priority_merge(&base, &incoming);
        assert_eq!(
            base.with_object(|o| o.get("a").cloned()).unwrap().unwrap().as_int(),
            Some(2)
        );
    }

    #[test]
    fn variable_expansion_applies_inside_quoted_strings_during_parse() {
        let mut p = Parser::new(ParserFlags::empty());
        p.macros.register_variable("FILENAME", "app.conf");
        p.add_string(r#"name = "${FILENAME}";"#, 0).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("name").cloned()).unwrap().unwrap();
        assert_eq!(got.as_str().unwrap(), "app.conf");
    }

    #[test]
    fn variable_expansion_applies_inside_unquoted_atoms_during_parse() {
        let mut p = Parser::new(ParserFlags::empty());
        p.macros.register_variable("HOST", "example.com");
        p.add_string("name = ${HOST};", 0).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("name").cloned()).unwrap().unwrap();
        assert_eq!(got.as_str().unwrap(), "example.com");
    }

    struct StubFetcher(Vec<u8>);
    impl crate::macros::Fetcher for StubFetcher {
        fn fetch(&self, _target: &str) -> std::result::Result<Vec<u8>, String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn include_merges_colliding_key_by_priority_instead_of_chaining() {
        // The base document holds priority 5; the include defaults to priority 0,
        // so the existing value must survive unreplaced (no implicit-array chain).
        let mut p = Parser::new(ParserFlags::empty());
        p.macros
            .set_fetcher(Box::new(StubFetcher(b"a = 2;".to_vec())));
        p.add_string(r#"a = 1; .include "child.conf";"#, 5).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(got.chain_len(), 1);
        assert_eq!(got.as_int(), Some(1));
    }

    #[test]
    fn include_merge_lets_equal_priority_incoming_win() {
        let mut p = Parser::new(ParserFlags::empty());
        p.macros
            .set_fetcher(Box::new(StubFetcher(b"a = 2;".to_vec())));
        p.add_string(r#"a = 1; .include "child.conf";"#, 0).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(got.chain_len(), 1);
        assert_eq!(got.as_int(), Some(2));
    }

    #[test]
    fn include_merges_nested_objects_recursively() {
        let mut p = Parser::new(ParserFlags::empty());
        p.macros
            .set_fetcher(Box::new(StubFetcher(b"outer { b = 2; }".to_vec())));
        p.add_string(r#"outer { a = 1; } .include "child.conf";"#, 0)
            .unwrap();
        let v = p.get_object().unwrap();
        let outer = v.with_object(|o| o.get("outer").cloned()).unwrap().unwrap();
        assert_eq!(outer.chain_len(), 1); // merged in place, not chained
        assert_eq!(
            outer.with_object(|o| o.get("a").cloned()).unwrap().unwrap().as_int(),
            Some(1)
        );
        assert_eq!(
            outer.with_object(|o| o.get("b").cloned()).unwrap().unwrap().as_int(),
            Some(2)
        );
    }

    #[test]
    fn duplicate_keys_in_one_document_still_chain_even_during_an_include() {
        // Collisions that are not the include boundary itself (both copies of
        // "a" live inside the included chunk) keep the ordinary implicit-array
        // behavior; only the splice point into the parent is priority-merged.
        let mut p = Parser::new(ParserFlags::empty());
        p.macros
            .set_fetcher(Box::new(StubFetcher(b"a = 1; a = 2;".to_vec())));
        p.add_string(r#".include "child.conf";"#, 0).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(got.chain_len(), 2);
    }

    #[test]
    fn zero_copy_flag_skips_value_allocated_bookkeeping_end_to_end() {
        let mut p = Parser::new(ParserFlags::ZERO_COPY);
        p.add_string(r#"name = "value";"#, 0).unwrap();
        let v = p.get_object().unwrap();
        let got = v.with_object(|o| o.get("name").cloned()).unwrap().unwrap();
        assert!(!got.flags().contains(crate::value::Flags::VALUE_ALLOCATED));
    }

    #[test]
    fn default_flags_still_set_value_allocated_on_strings() {
        let v = parse(r#"name = "value";"#);
        let got = v.with_object(|o| o.get("name").cloned()).unwrap().unwrap();
        assert!(got.flags().contains(crate::value::Flags::VALUE_ALLOCATED));
    }
}
