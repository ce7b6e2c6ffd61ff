//! # Error Taxonomy
//!
//! Every fallible function returns `eyre::Result`. Category information rides
//! inside the report as a concrete error type so callers can downcast:
//!
//! | Class | Carried type | Examples |
//! |-------|--------------|----------|
//! | Syntax | `SyntaxError` | dangling comma, missing JOIN, unbalanced parenthesis |
//! | Schema | `SchemaError` | unknown table, unresolved attribute, duplicate alias, type mismatch |
//! | Resource | `MemoryError`, `std::io::Error` | arena exhausted, relation file unreadable |
//!
//! `ErrorClass::of` walks the cause chain, so context added with
//! `wrap_err` does not hide the category.

use crate::memory::MemoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "schema error: {}", self.message)
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Syntax,
    Schema,
    Resource,
    Other,
}

impl ErrorClass {
    pub fn of(report: &eyre::Report) -> Self {
        for cause in report.chain() {
            if cause.is::<SyntaxError>() {
                return ErrorClass::Syntax;
            }
            if cause.is::<SchemaError>() {
                return ErrorClass::Schema;
            }
            if cause.is::<MemoryError>() || cause.is::<std::io::Error>() {
                return ErrorClass::Resource;
            }
        }
        ErrorClass::Other
    }

    pub fn is_out_of_memory(report: &eyre::Report) -> bool {
        report.chain().any(|cause| cause.is::<MemoryError>())
    }
}
