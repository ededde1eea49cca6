//! Structured errors produced by every stage of the pipeline.
//!
//! Each stage attaches a source [`Position`] where it can; the checker and
//! parser collect multiple [`Diagnostic`]s into one compound error rather
//! than failing on the first problem (see spec §4.3/§4.4).

use std::fmt;

use crate::lexer::Position;

/// The kind of problem that occurred, used to classify errors without
/// string matching on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Type,
    Name,
    Argument,
    Runtime,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lex => "lex error",
            Self::Parse => "parse error",
            Self::Type => "type error",
            Self::Name => "name error",
            Self::Argument => "argument error",
            Self::Runtime => "runtime error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One diagnostic message, as collected by the parser and checker.
///
/// `kind` narrows further than the top-level `ErrorKind` for the checker,
/// matching spec §4.4's `{Type, Undefined, Redefinition, Argument, ReturnType}`
/// classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{pos}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The error type returned by every public entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The lexer found an unrecognized character or an unterminated string.
    Lex(Diagnostic),
    /// The parser accumulated one or more diagnostics; no AST escapes.
    Parse(Vec<Diagnostic>),
    /// The checker found one or more type errors.
    Type(Vec<Diagnostic>),
    /// An identifier could not be resolved and `allow_undefined_variables` was not set.
    Name(Diagnostic),
    /// A call's argument count did not match the callee's arity.
    Argument(Diagnostic),
    /// A failure raised while executing compiled bytecode.
    Runtime(Diagnostic),
    /// An external sandbox signalled cancellation via the VM's cancel flag.
    Cancelled,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lex(_) => ErrorKind::Lex,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Type(_) => ErrorKind::Type,
            Self::Name(_) => ErrorKind::Name,
            Self::Argument(_) => ErrorKind::Argument,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn runtime(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::Runtime(Diagnostic::new(message, position))
    }

    pub(crate) fn name(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::Name(Diagnostic::new(message, position))
    }

    pub(crate) fn argument(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::Argument(Diagnostic::new(message, position))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(d) => write!(f, "lex error: {d}"),
            Self::Parse(ds) => {
                writeln!(f, "parse error:")?;
                for d in ds {
                    writeln!(f, "  {d}")?;
                }
                Ok(())
            }
            Self::Type(ds) => {
                writeln!(f, "type error:")?;
                for d in ds {
                    writeln!(f, "  {d}")?;
                }
                Ok(())
            }
            Self::Name(d) => write!(f, "name error: {d}"),
            Self::Argument(d) => write!(f, "argument error: {d}"),
            Self::Runtime(d) => write!(f, "runtime error: {d}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
