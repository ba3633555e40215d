//! Parser Types and Constants
//!
//! Shared error type and limits used across the parser modules.

use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_PARSE_ITERATIONS: usize = 1_000_000; // Max iterations in parsing loops
pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

/// Error produced when a script cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("unexpected {found:?} at line {line}")]
    Unexpected { found: char, line: usize },

    #[error("unsupported construct {what:?} at line {line}")]
    Unsupported { what: String, line: usize },

    #[error("input exceeds maximum size of {MAX_INPUT_SIZE} bytes")]
    InputTooLarge,

    #[error("parser iteration limit exceeded")]
    IterationLimit,

    #[error("parser depth limit exceeded")]
    DepthLimit,
}
