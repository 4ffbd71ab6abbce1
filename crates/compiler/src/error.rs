//! Compile-time error type (spec §4.2 "Compilation errors": `{ok=false,
//! error_pointer_into_source, message}`).

use std::fmt;

use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::types::TypeError;

#[derive(Debug, Clone)]
pub struct CompileError {
    /// Byte offset into the *original* (pre-canonicalisation) source.
    pub pos: usize,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile error at byte {}: {}", self.pos, self.message)
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    pub fn at(pos: usize, message: impl Into<String>) -> Self {
        CompileError { pos, message: message.into() }
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError { pos: e.pos, message: e.message }
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError { pos: e.pos, message: e.message }
    }
}

/// A `TypeError` carries no position of its own; callers attach the
/// position of the expression being folded.
pub fn type_error_at(pos: usize, e: TypeError) -> CompileError {
    CompileError { pos, message: e.0 }
}
