//! # Error & Diagnostic Types
//!
//! This module defines every error kind the compiler can produce and the
//! `Diagnostic` envelope used to accumulate them across a compile instead of
//! aborting on the first problem.
//!
//! ## Error Kinds
//! - `LexError` - malformed token, fatal for the file
//! - `ParseError` - unexpected token or premature EOF, fatal for the statement
//! - `ImportError` - unknown std module, missing file, or import cycle
//! - `PhaseError` - header-only statement in track phase, or vice versa
//! - `TypeError` - built-in argument of the wrong kind
//! - `TrackError` - vocal overlap (fatal) or dangling tie (warning)
//! - `NumericError` - rational overflow or unapproximable tick
//! - `InternalError` - invariant violation inside the evaluator
//!
//! `ImportError` and `InternalError` are catastrophic: they abort the whole
//! compile immediately rather than being recorded and continued past.

use thiserror::Error;

/// Source position, `(line, column, byte-offset)`, all 1-indexed except `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// Reason an import failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportErrorKind {
    UnknownStdModule,
    FileNotFound,
    Cycle,
}

#[derive(Error, Debug, Clone)]
pub enum MfsError {
    /// Malformed token; fatal for the file.
    #[error("lex error at line {line}, column {column}: {message}")]
    LexError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Unexpected token or premature EOF; fatal for the statement.
    #[error("parse error at {position:?}: expected {expected}, found {found}")]
    ParseError {
        expected: String,
        found: String,
        position: Position,
    },

    /// Unknown std module, missing file, or import cycle; fatal for the compile.
    #[error("import error ({kind:?}): {message}")]
    ImportError {
        kind: ImportErrorKind,
        message: String,
        chain: Vec<String>,
    },

    /// Header-only statement in track phase, or vice versa.
    #[error("phase error: {message}")]
    PhaseError { message: String, position: Position },

    /// Built-in argument of the wrong kind.
    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: String,
        got: String,
        position: Position,
    },

    /// Vocal overlap (fatal) or dangling tie target (warning).
    #[error("track error: {message}")]
    TrackError { message: String, position: Position },

    /// Rational overflow or a tick that can't be approximated within tolerance.
    #[error("numeric error: {message}")]
    NumericError { message: String, position: Position },

    /// Invariant violation inside the evaluator; fatal for the compile.
    #[error("internal error: {message}")]
    InternalError { message: String },
}

/// Severity of a `Diagnostic`. Only `Error` suppresses IR emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single reported problem, with enough context to point a user at the
/// offending source.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "filePath")]
    pub file_path: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
            position,
            file_path: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            position,
            file_path: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Classify an `MfsError` into a diagnostic with the matching code/severity.
    pub fn from_error(err: &MfsError) -> Self {
        let (code, severity, position) = match err {
            MfsError::LexError { line, column, .. } => (
                "lex_error",
                Severity::Error,
                Some(Position {
                    line: *line,
                    column: *column,
                    offset: 0,
                }),
            ),
            MfsError::ParseError { position, .. } => ("parse_error", Severity::Error, Some(*position)),
            MfsError::ImportError { .. } => ("import_error", Severity::Error, None),
            MfsError::PhaseError { position, .. } => ("phase_error", Severity::Error, Some(*position)),
            MfsError::TypeError { position, .. } => ("type_error", Severity::Error, Some(*position)),
            MfsError::TrackError { message, position } => {
                let severity = if message.contains("tie") {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                ("track_error", severity, Some(*position))
            }
            MfsError::NumericError { position, .. } => ("numeric_error", Severity::Error, Some(*position)),
            MfsError::InternalError { .. } => ("internal_error", Severity::Error, None),
        };
        Diagnostic {
            severity,
            code: code.to_string(),
            message: err.to_string(),
            position,
            file_path: None,
        }
    }
}
