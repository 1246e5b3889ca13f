//! Macro and variable engine: `.include`/`.includes` builtins, registrable
//! custom macros, and `${VAR}` expansion with the `FILENAME`/`CURDIR` built-ins.
//!
//! The engine never performs I/O itself; a [`Fetcher`] is the host-provided
//! callback boundary for resolving a macro target (local path or URL) to bytes.

use std::collections::HashMap;

/// Host callback that resolves an include target to bytes. Local paths begin
/// with `/` or `.`; anything else is treated as a URL. The core has no opinion
/// on how either is actually fetched.
pub trait Fetcher {
    fn fetch(&self, target: &str) -> Result<Vec<u8>, String>;
    /// Detached-signature check for `.includes`. Hosts that don't support
    /// signatures should return `Err` so the parse surfaces `SignatureError`.
    fn verify_signature(&self, _target: &str, _bytes: &[u8]) -> Result<(), String> {
        Err("signature verification not supported by this host".to_string())
    }
}

/// Fallback handler for variables not found in the registered table.
pub trait VariableHandler {
    /// Return `Some(replacement)` to substitute, or `None` to leave `${NAME}` as a literal.
    fn resolve(&self, name: &str) -> Option<String>;
}

pub struct EnvironmentVariableHandler;

impl VariableHandler for EnvironmentVariableHandler {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// The result of dispatching a macro: optionally bytes to push as a new chunk
/// (for `.include`/`.includes`), and an optional override of the include priority.
pub struct MacroOutcome {
    pub include_bytes: Option<Vec<u8>>,
    pub priority: Option<u8>,
}

impl MacroOutcome {
    fn none() -> Self {
        MacroOutcome {
            include_bytes: None,
            priority: None,
        }
    }
}

pub struct MacroEngine {
    variables: HashMap<String, String>,
    fallback: Option<Box<dyn VariableHandler>>,
    fetcher: Option<Box<dyn Fetcher>>,
    custom: HashMap<String, Box<dyn Fn(&str) -> Result<(), String>>>,
}

impl MacroEngine {
    pub fn new() -> Self {
        MacroEngine {
            variables: HashMap::new(),
            fallback: None,
            fetcher: None,
            custom: HashMap::new(),
        }
    }

    pub fn register_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn set_variables_handler(&mut self, handler: Box<dyn VariableHandler>) {
        self.fallback = Some(handler);
    }

    pub fn set_fetcher(&mut self, fetcher: Box<dyn Fetcher>) {
        self.fetcher = Some(fetcher);
    }

    pub fn register_macro(&mut self, name: impl Into<String>, handler: Box<dyn Fn(&str) -> Result<(), String>>) {
        self.custom.insert(name.into(), handler);
    }

    /// Sets the two built-in variables the host may populate on demand.
    pub fn set_filevars(&mut self, filename: &str) {
        self.register_variable("FILENAME", filename);
        let curdir = std::path::Path::new(filename)
            .parent()
            .map(|p| p.display().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                std::env::current_dir()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            });
        self.register_variable("CURDIR", curdir);
    }

    pub fn dispatch(&self, name: &str, body: &str) -> Result<MacroOutcome, String> {
        match name {
            "include" => self.do_include(body, false),
            "includes" => self.do_include(body, true),
            other => {
                if let Some(handler) = self.custom.get(other) {
                    handler(body)?;
                    Ok(MacroOutcome::none())
                } else {
                    Err(format!("unknown macro .{other}"))
                }
            }
        }
    }

    fn do_include(&self, target: &str, needs_signature: bool) -> Result<MacroOutcome, String> {
        log::debug!("resolving include target {target:?} (signed={needs_signature})");
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| "no fetcher registered for .include".to_string())?;
        let bytes = fetcher.fetch(target)?;
        if needs_signature {
            fetcher.verify_signature(target, &bytes)?;
        }
        log::trace!("include target {target:?} resolved to {} bytes", bytes.len());
        // Included content defaults to priority 0 unless the host overrides it.
        Ok(MacroOutcome {
            include_bytes: Some(bytes),
            priority: Some(0),
        })
    }

    /// Expand every `${NAME}` occurrence in `input`. Unregistered names fall
    /// through to the configured handler; if that also fails to resolve, the
    /// `${NAME}` sequence is left untouched.
    pub fn expand_variables(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                if let Some(end) = input[i + 2..].find('}') {
                    let name = &input[i + 2..i + 2 + end];
                    let resolved = self
                        .variables
                        .get(name)
                        .cloned()
                        .or_else(|| self.fallback.as_ref().and_then(|h| h.resolve(name)));
                    match resolved {
                        Some(v) => {
                            out.push_str(&v);
                            i = i + 2 + end + 1;
                            continue;
                        }
                        None => {
                            out.push_str(&input[i..i + 2 + end + 1]);
                            i = i + 2 + end + 1;
                            continue;
                        }
                    }
                }
            }
            // Advance by one full UTF-8 char, not one byte, so non-ASCII text
            // surrounding a `${VAR}` survives expansion intact.
            let rest = &input[i..];
            let ch = rest.chars().next().expect("i < bytes.len()");
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

impl Default for MacroEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFetcher(Vec<u8>);
    impl Fetcher for StubFetcher {
        fn fetch(&self, _target: &str) -> Result<Vec<u8>, String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn include_dispatches_to_fetcher() {
        let mut engine = MacroEngine::new();
        engine.set_fetcher(Box::new(StubFetcher(b"a = 1;".to_vec())));
        let outcome = engine.dispatch("include", "child.conf").unwrap();
        assert_eq!(outcome.include_bytes.unwrap(), b"a = 1;");
    }

    #[test]
    fn include_defaults_to_priority_zero() {
        let mut engine = MacroEngine::new();
        engine.set_fetcher(Box::new(StubFetcher(b"a = 1;".to_vec())));
        let outcome = engine.dispatch("include", "child.conf").unwrap();
        assert_eq!(outcome.priority, Some(0));
    }

    #[test]
    fn includes_without_signature_support_fails() {
        let mut engine = MacroEngine::new();
        engine.set_fetcher(Box::new(StubFetcher(b"a = 1;".to_vec())));
        assert!(engine.dispatch("includes", "child.conf").is_err());
    }

    #[test]
    fn unknown_macro_errors() {
        let engine = MacroEngine::new();
        assert!(engine.dispatch("bogus", "").is_err());
    }

    #[test]
    fn variable_expansion_substitutes_registered_names() {
        let mut engine = MacroEngine::new();
        engine.register_variable("NAME", "world");
        assert_eq!(engine.expand_variables("hello ${NAME}!"), "hello world!");
    }

    #[test]
    fn variable_expansion_preserves_surrounding_multibyte_utf8() {
        let mut engine = MacroEngine::new();
        engine.register_variable("WHO", "world");
        assert_eq!(engine.expand_variables("caf\u{e9} ${WHO}"), "caf\u{e9} world");
    }

    #[test]
    fn unresolved_variable_is_left_literal() {
        let engine = MacroEngine::new();
        assert_eq!(engine.expand_variables("x=${MISSING}"), "x=${MISSING}");
    }

    #[test]
    fn filevars_sets_filename_and_curdir() {
        let mut engine = MacroEngine::new();
        engine.set_filevars("/etc/app/config.ucl");
        assert_eq!(
            engine.expand_variables("${FILENAME}"),
            "/etc/app/config.ucl"
        );
        assert_eq!(engine.expand_variables("${CURDIR}"), "/etc/app");
    }
}
