//! The error taxonomies from spec.md §7: `ParseError`, `SemaError`,
//! `RuntimeError`, plus the top-level `FireError` the driver matches on.
//! Grounded in the pack's `repl_error.rs` — manual `Display`/`Error`
//! impls and `From` conversions rather than a derive-macro crate, which
//! matches how the pack's own core crate (not its bindings crates)
//! handles errors.

use crate::lexer::LexError;
use crate::source::Span;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub notes: Vec<(Span, String)>,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, span: Span, note: impl Into<String>) -> Self {
        self.notes.push((span, note.into()));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
pub enum SemaErrorKind {
    UnknownName(String),
    AmbiguousName(String),
    AmbiguousCall(String),
    NoMatch(String),
    MissingArgument(String),
    InvalidInheritance(String),
    BadOverride(String),
    EmptyReturn(String),
    NotWritable,
    TypeMismatch { expected: String, found: String },
    TemplateArgTypeMismatch(String),
    TemplateCannotDeduce(String),
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SemaError {
    pub span: Span,
    pub kind: SemaErrorKind,
    pub notes: Vec<(Span, String)>,
}

impl SemaError {
    pub fn new(span: Span, kind: SemaErrorKind) -> Self {
        Self { span, kind, notes: Vec::new() }
    }

    pub fn with_note(mut self, span: Span, note: impl Into<String>) -> Self {
        self.notes.push((span, note.into()));
        self
    }
}

impl fmt::Display for SemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownName(n) => write!(f, "unknown name `{n}`"),
            Self::AmbiguousName(n) => write!(f, "ambiguous name `{n}`"),
            Self::AmbiguousCall(n) => write!(f, "ambiguous call to `{n}`"),
            Self::NoMatch(n) => write!(f, "no overload of `{n}` matches these arguments"),
            Self::MissingArgument(n) => write!(f, "missing argument `{n}`"),
            Self::InvalidInheritance(msg) => write!(f, "invalid inheritance: {msg}"),
            Self::BadOverride(n) => write!(f, "`{n}` does not override any virtual base method"),
            Self::EmptyReturn(n) => write!(f, "function `{n}` must return a value"),
            Self::NotWritable => write!(f, "expression is not writable"),
            Self::TypeMismatch { expected, found } => write!(f, "expected type `{expected}`, found `{found}`"),
            Self::TemplateArgTypeMismatch(t) => write!(f, "template parameter `{t}` deduced to conflicting types"),
            Self::TemplateCannotDeduce(t) => write!(f, "cannot deduce template parameter `{t}`"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}
impl std::error::Error for SemaError {}

#[derive(Debug, Clone)]
pub enum RuntimeError {
    DividedByZero { span: Span },
    StackOverflow { span: Span },
    IndexOutOfRange { span: Span, index: i64, len: usize },
    KeyNotFound { span: Span },
    /// An `import` could not be resolved or its compilation unit failed to
    /// lex/parse/analyze (SPEC_FULL.md §6, "Import").
    ImportFailed { span: Span, message: String },
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            Self::DividedByZero { span }
            | Self::StackOverflow { span }
            | Self::IndexOutOfRange { span, .. }
            | Self::KeyNotFound { span }
            | Self::ImportFailed { span, .. } => *span,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DividedByZero { .. } => write!(f, "division by zero"),
            Self::StackOverflow { .. } => write!(f, "stack overflow"),
            Self::IndexOutOfRange { index, len, .. } => write!(f, "index {index} out of range (length {len})"),
            Self::KeyNotFound { .. } => write!(f, "key not found"),
            Self::ImportFailed { message, .. } => write!(f, "import failed: {message}"),
        }
    }
}
impl std::error::Error for RuntimeError {}

/// Top-level error the driver matches on to choose an exit code and
/// invoke diagnostic rendering (SPEC_FULL.md §7, "Error trait impls").
#[derive(Debug, Clone)]
pub enum FireError {
    Lex(LexError),
    Parse(ParseError),
    Sema(SemaError),
    Runtime(RuntimeError),
    /// A user `throw`n value that escaped the top level uncaught.
    Uncaught(Span, String),
}

impl FireError {
    pub fn span(&self) -> Span {
        match self {
            Self::Lex(e) => e.span(),
            Self::Parse(e) => e.span,
            Self::Sema(e) => e.span,
            Self::Runtime(e) => e.span(),
            Self::Uncaught(span, _) => *span,
        }
    }

    pub fn notes(&self) -> Vec<(Span, String)> {
        match self {
            Self::Parse(e) => e.notes.clone(),
            Self::Sema(e) => e.notes.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for FireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Sema(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "{e}"),
            Self::Uncaught(_, msg) => write!(f, "uncaught exception: {msg}"),
        }
    }
}
impl std::error::Error for FireError {}

impl From<LexError> for FireError {
    fn from(e: LexError) -> Self {
        Self::Lex(e)
    }
}
impl From<ParseError> for FireError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}
impl From<SemaError> for FireError {
    fn from(e: SemaError) -> Self {
        Self::Sema(e)
    }
}
impl From<RuntimeError> for FireError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}
