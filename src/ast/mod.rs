//! Abstract Syntax Tree for bash scripts
//!
//! Contains the AST types shared between the parser and the dataflow engine.

pub mod types;

pub use types::*;
