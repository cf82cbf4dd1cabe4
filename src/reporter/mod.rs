//! Structured errors for every compilation phase.
//!
//! Each phase has its own `thiserror` enum; [`CompilerError`] folds them
//! together so the pipeline can hand one list back to its caller, and every
//! error knows how to describe itself as a [`Diagnostic`].

use crate::diagnostics::codes::{self, ErrorCode};
use crate::diagnostics::{Diagnostic, Severity};
use crate::utils::Location;
use inkwell::builder::BuilderError;
use thiserror::Error;

/// The top-level error type returned by the pipeline.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Lexical(#[from] LexerError),

    #[error(transparent)]
    Parsing(#[from] ParserError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    CodeGen(#[from] CodeGenError),
}

impl CompilerError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            CompilerError::Lexical(e) => Some(e.location()),
            CompilerError::Parsing(e) => e.location(),
            CompilerError::Type(e) => e.records.first().map(|r| &r.loc),
            CompilerError::CodeGen(e) => e.location(),
        }
    }

    pub fn code(&self) -> &'static ErrorCode {
        match self {
            CompilerError::Lexical(LexerError::UnrecognizedToken { .. }) => &codes::E0001_UNRECOGNIZED_TOKEN,
            CompilerError::Lexical(LexerError::InvalidLiteral { .. }) => &codes::E0002_INVALID_LITERAL,
            CompilerError::Lexical(LexerError::Directive { .. }) => &codes::E0003_DIRECTIVE,
            CompilerError::Lexical(LexerError::UnterminatedComment { .. }) => &codes::E0004_UNTERMINATED_COMMENT,
            CompilerError::Parsing(ParserError::UnexpectedToken { .. }) => &codes::E0100_UNEXPECTED_TOKEN,
            CompilerError::Parsing(ParserError::UnknownType { .. }) => &codes::E0101_UNKNOWN_TYPE,
            CompilerError::Parsing(ParserError::Redefinition { .. }) => &codes::E0102_REDEFINITION,
            CompilerError::Parsing(ParserError::Invalid { .. }) => &codes::E0103_INVALID,
            CompilerError::Parsing(ParserError::UnitNotFound { .. }) => &codes::E0104_UNIT_NOT_FOUND,
            CompilerError::Parsing(ParserError::CircularUnit { .. }) => &codes::E0105_CIRCULAR_UNIT,
            CompilerError::Type(_) => &codes::E0200_TYPE_MISMATCH,
            CompilerError::CodeGen(CodeGenError::UnresolvedReference { .. }) => &codes::E0300_UNRESOLVED,
            CompilerError::CodeGen(CodeGenError::ArgumentCountMismatch { .. }) => &codes::E0301_ARGUMENT_COUNT,
            CompilerError::CodeGen(_) => &codes::E0399_INTERNAL,
        }
    }

    /// Converts the error into a printable diagnostic. Errors that carry
    /// several records only report the first one here; see
    /// [`CompilerError::to_diagnostics`].
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            location: self.location().cloned(),
            severity: Severity::Error,
            code: self.code().code,
            message: match self {
                CompilerError::Type(e) => e.records.first().map(|r| r.message.clone()).unwrap_or_default(),
                other => other.to_string(),
            },
        }
    }

    /// One diagnostic per record.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CompilerError::Type(e) => e
                .records
                .iter()
                .map(|record| Diagnostic {
                    location: Some(record.loc.clone()),
                    severity: Severity::Error,
                    code: self.code().code,
                    message: record.message.clone(),
                })
                .collect(),
            other => vec![other.to_diagnostic()],
        }
    }
}

/// Errors produced while turning text into tokens.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("unrecognized input `{text}`")]
    UnrecognizedToken { text: String, loc: Location },

    #[error("invalid {kind} literal `{text}`")]
    InvalidLiteral { kind: &'static str, text: String, loc: Location },

    #[error("{message}")]
    Directive { message: String, loc: Location },

    #[error("comment is missing its closing `*)`")]
    UnterminatedComment { loc: Location },
}

impl LexerError {
    pub fn location(&self) -> &Location {
        match self {
            LexerError::UnrecognizedToken { loc, .. }
            | LexerError::InvalidLiteral { loc, .. }
            | LexerError::Directive { loc, .. }
            | LexerError::UnterminatedComment { loc } => loc,
        }
    }
}

/// Errors produced while building the tree.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String, loc: Location },

    #[error("unknown type `{name}`")]
    UnknownType { name: String, loc: Location },

    #[error("`{name}` is already defined at {previous}")]
    Redefinition { name: String, previous: Location, loc: Location },

    #[error("{message}")]
    Invalid { message: String, loc: Location },

    #[error("cannot find unit `{name}`")]
    UnitNotFound { name: String, loc: Option<Location> },

    #[error("unit `{name}` is used circularly")]
    CircularUnit { name: String, loc: Option<Location> },
}

impl ParserError {
    pub fn invalid(message: impl Into<String>, loc: &Location) -> Self {
        ParserError::Invalid { message: message.into(), loc: loc.clone() }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            ParserError::UnexpectedToken { loc, .. }
            | ParserError::UnknownType { loc, .. }
            | ParserError::Redefinition { loc, .. }
            | ParserError::Invalid { loc, .. } => Some(loc),
            ParserError::UnitNotFound { loc, .. } | ParserError::CircularUnit { loc, .. } => loc.as_ref(),
        }
    }
}

/// One `(location, message)` pair of a [`TypeError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub loc: Location,
    pub message: String,
}

/// A type-check failure. Raised by `type_check` and fatal for the unit.
#[derive(Debug, Error)]
#[error("{}", summarize(.records))]
pub struct TypeError {
    pub records: Vec<ErrorRecord>,
}

fn summarize(records: &[ErrorRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}: {}", r.loc, r.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl TypeError {
    pub fn new(loc: &Location, message: impl Into<String>) -> Self {
        Self { records: vec![ErrorRecord { loc: loc.clone(), message: message.into() }] }
    }

    /// Adds a secondary record, e.g. the declaration the failure refers to.
    pub fn with_record(mut self, loc: &Location, message: impl Into<String>) -> Self {
        self.records.push(ErrorRecord { loc: loc.clone(), message: message.into() });
        self
    }
}

/// Errors produced while lowering the tree to LLVM IR.
///
/// `UnresolvedReference` and `ArgumentCountMismatch` are soft: they are
/// recorded and lowering continues. Everything else aborts the pass.
#[derive(Debug, Error)]
pub enum CodeGenError {
    #[error("unresolved {kind} `{name}`")]
    UnresolvedReference { kind: &'static str, name: String, loc: Location },

    #[error("`{name}` expects {expected} argument(s), but {found} were given")]
    ArgumentCountMismatch { name: String, expected: usize, found: usize, loc: Location },

    #[error("internal compiler error: {message}")]
    Internal { message: String, loc: Option<Location> },

    #[error("LLVM builder error: {0}")]
    Builder(#[from] BuilderError),

    #[error("LLVM module verification failed: {message}")]
    Verification { message: String },
}

impl CodeGenError {
    pub fn internal(message: impl Into<String>) -> Self {
        CodeGenError::Internal { message: message.into(), loc: None }
    }

    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            CodeGenError::UnresolvedReference { .. } | CodeGenError::ArgumentCountMismatch { .. }
        )
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            CodeGenError::UnresolvedReference { loc, .. } | CodeGenError::ArgumentCountMismatch { loc, .. } => {
                Some(loc)
            }
            CodeGenError::Internal { loc, .. } => loc.as_ref(),
            CodeGenError::Builder(_) | CodeGenError::Verification { .. } => None,
        }
    }
}
