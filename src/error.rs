//! Error taxonomy shared by the parser, emitter, and schema validator.

pub type Result<T> = std::result::Result<T, Error>;

/// A parser-side or schema-side failure.
///
/// `SyntaxError` carries line/column because the parser's chunk reader tracks
/// cursor position on every byte advance; schema errors carry the JSON Pointer
/// path to the offending value instead, since there is no byte position there.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error at {line}:{column}: {description} (byte {byte:?})")]
    SyntaxError {
        line: usize,
        column: usize,
        description: String,
        byte: Option<u8>,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("parser reused after a terminal error")]
    StateError,

    #[error("recursion too deep (limit {limit})")]
    RecursionTooDeep { limit: usize },

    #[error("macro error: {0}")]
    MacroError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("signature verification failed for {path}")]
    SignatureError { path: String },

    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("invalid schema at {path}: {reason}")]
    InvalidSchema { path: String, reason: String },

    #[error("missing required property {property:?} at {path}")]
    MissingProperty { path: String, property: String },

    #[error("constraint violated at {path}: {reason}")]
    Constraint { path: String, reason: String },

    #[error("missing dependency {depends_on:?} required by {property:?} at {path}")]
    MissingDependency {
        path: String,
        property: String,
        depends_on: String,
    },

    #[error("unknown schema error at {path}: {reason}")]
    Unknown { path: String, reason: String },
}

impl Error {
    pub fn syntax(line: usize, column: usize, description: impl Into<String>, byte: Option<u8>) -> Self {
        Error::SyntaxError {
            line,
            column,
            description: description.into(),
            byte,
        }
    }

    /// The draft-v4 error code name, for hosts that want to match on it without
    /// destructuring the full variant (mirrors the spec's `(code, message, value)` triple).
    pub fn code(&self) -> &'static str {
        match self {
            Error::SyntaxError { .. } => "SyntaxError",
            Error::IoError(_) => "IOError",
            Error::StateError => "StateError",
            Error::RecursionTooDeep { .. } => "RecursionTooDeep",
            Error::MacroError(_) => "MacroError",
            Error::InternalError(_) => "InternalError",
            Error::SignatureError { .. } => "SignatureError",
            Error::TypeMismatch { .. } => "TypeMismatch",
            Error::InvalidSchema { .. } => "InvalidSchema",
            Error::MissingProperty { .. } => "MissingProperty",
            Error::Constraint { .. } => "Constraint",
            Error::MissingDependency { .. } => "MissingDependency",
            Error::Unknown { .. } => "Unknown",
        }
    }
}
