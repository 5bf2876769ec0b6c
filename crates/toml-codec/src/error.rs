//! Error types for parsing and stringifying.
//!
//! The parser raises [`LexError`], which always knows where in the input it
//! happened. Public entry points wrap it in [`CodecError`], which can also
//! carry a rendered source excerpt for display to an end user.

use crate::cursor::Position;
use std::fmt::Write as _;
use thiserror::Error;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad character, unterminated string/array/table, malformed escape,
    /// number or datetime literal.
    Lexical,
    /// Key redefinition, reopening a declared table, extending a closed
    /// inline table, mixed-type inline array.
    Semantic,
    /// Surrogate or out-of-range codepoint, out-of-range datetime component.
    Range,
    /// The caller handed the codec something it cannot work with.
    Usage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Range => "range",
            ErrorKind::Usage => "usage",
        };
        f.write_str(name)
    }
}

/// A parser error tagged with its location.
///
/// `line` and `column` are 1-based; `position` is the 0-based codepoint
/// offset from the start of the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at row {line}, col {column}, pos {position}")]
pub struct LexError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub position: usize,
}

/// A failure raised inside the parser before its location is known. The
/// driver turns it into a [`LexError`] at the cursor's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn lexical(message: impl Into<String>) -> Self {
        Failure {
            kind: ErrorKind::Lexical,
            message: message.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Failure {
            kind: ErrorKind::Semantic,
            message: message.into(),
        }
    }

    pub fn range(message: impl Into<String>) -> Self {
        Failure {
            kind: ErrorKind::Range,
            message: message.into(),
        }
    }

    pub fn at(self, position: Position) -> LexError {
        LexError {
            kind: self.kind,
            message: self.message,
            line: position.line + 1,
            column: position.column + 1,
            position: position.offset,
        }
    }
}

/// The public error type returned by every codec entry point.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The input document was rejected.
    #[error("TOML parse error: {source}")]
    Parse {
        #[source]
        source: LexError,
        /// Source excerpt with a caret under the failing column, when the
        /// caller had the text at hand.
        context: Option<String>,
    },

    /// A value graph could not be turned into text.
    #[error("TOML stringify error ({kind}): {message}")]
    Stringify { kind: ErrorKind, message: String },

    /// The caller handed the codec something it cannot work with.
    #[error("Invalid use of toml-codec: {0}")]
    Usage(String),

    /// A JSON document could not be represented as TOML.
    #[error("JSON conversion error: {0}")]
    Json(String),

    /// Reading from the underlying source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LexError> for CodecError {
    fn from(source: LexError) -> Self {
        CodecError::Parse {
            source,
            context: None,
        }
    }
}

impl CodecError {
    /// Always `true`; lets callers that juggle several error sources tell
    /// codec failures apart after type erasure.
    pub fn from_codec(&self) -> bool {
        true
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Parse { source, .. } => source.kind,
            CodecError::Stringify { kind, .. } => *kind,
            CodecError::Usage(_) | CodecError::Json(_) | CodecError::Io(_) => ErrorKind::Usage,
        }
    }

    /// The underlying positioned error, for parse failures.
    pub fn lex_error(&self) -> Option<&LexError> {
        match self {
            CodecError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            CodecError::Parse { context, .. } => context.as_deref(),
            _ => None,
        }
    }

    /// Attach a rendered excerpt of `source` to a parse error. Other variants
    /// are returned unchanged.
    pub fn with_source(self, text: &str) -> Self {
        match self {
            CodecError::Parse { source, .. } => {
                let context = Some(render_context(&source, text));
                CodecError::Parse { source, context }
            }
            other => other,
        }
    }

    /// Message plus excerpt, ready for a terminal.
    pub fn pretty(&self) -> String {
        match self.context() {
            Some(context) => format!("{self}\n{context}"),
            None => self.to_string(),
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        CodecError::Usage(message.into())
    }

    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        CodecError::Stringify {
            kind: ErrorKind::Semantic,
            message: message.into(),
        }
    }
}

/// Render the line before, the failing line and the line after, with a caret
/// under the failing column:
///
/// ```text
/// 1: [server]
/// 2> port = 80x
///         ^
/// 3: host = "localhost"
/// ```
pub fn render_context(error: &LexError, text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let current = error.line.saturating_sub(1);
    let first = current.saturating_sub(1);
    let last = (current + 2).min(lines.len());
    let width = last.to_string().len();

    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate().take(last).skip(first) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if idx == current {
            let _ = writeln!(out, "{:>width$}> {}", idx + 1, line);
            let pad = width + 2 + error.column.saturating_sub(1);
            let _ = writeln!(out, "{}^", " ".repeat(pad));
        } else {
            let _ = writeln!(out, "{:>width$}: {}", idx + 1, line);
        }
    }
    out
}

/// Convenience alias used throughout toml-codec.
pub type Result<T> = std::result::Result<T, CodecError>;
