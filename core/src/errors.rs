//! Crate-wide error types.
//!
//! Each pipeline stage (lexer, parser, compiler, VM) has its own error type
//! defined alongside its module; this module aggregates them into one
//! public [`Error`] so a front-end only has to match on a single type.

use std::fmt;

use crate::compiler::CompileError;
use crate::lexer::LexError;
use crate::parser::ParseError;

/// The seven error kinds surfaced by the compiler and the VM (spec §7).
///
/// `Runtime` is the catch-all; the rest name a more specific failure so a
/// front-end or test can match on the shape of the failure rather than its
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Runtime,
    Type,
    Internal,
    Name,
    Argument,
    Structure,
    Index,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Runtime => "runtime",
            ErrorKind::Type => "type",
            ErrorKind::Internal => "internal",
            ErrorKind::Name => "name",
            ErrorKind::Argument => "argument",
            ErrorKind::Structure => "structure",
            ErrorKind::Index => "index",
        };
        f.write_str(s)
    }
}

/// An error produced while evaluating a value operation or executing
/// bytecode. Carries one of the seven [`ErrorKind`]s plus a human-readable
/// message; this is the error type threaded through [`crate::value`] and
/// [`crate::vm`] (both need it, and [`crate::value`] must not depend on
/// [`crate::vm`], so it lives here rather than beside the VM).
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq)]
#[error("{kind} error: {message}")]
pub struct VmError {
    pub kind: ErrorKind,
    pub message: String,
}

impl VmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        VmError {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Type, message)
    }

    pub fn name_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Name, message)
    }

    pub fn argument_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Argument, message)
    }

    pub fn structure_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Structure, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Index, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Internal, message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        VmError::new(ErrorKind::Runtime, message)
    }
}

/// Top-level error type returned by [`crate::driver`].
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    #[error("lex error: {0}")]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error("compile error: {0}")]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vm(#[from] VmError),
}

impl Error {
    /// The error kind, for front-ends that want to branch on it (e.g. pick
    /// an exit code, or a diagnostic colour).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lex(_) => ErrorKind::Runtime,
            Error::Parse(_) => ErrorKind::Runtime,
            Error::Compile(e) => e.kind,
            Error::Vm(e) => e.kind,
        }
    }
}
