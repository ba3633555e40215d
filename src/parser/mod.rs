//! Parser module for bash scripts
//!
//! Contains the recursive-descent parser and the process-wide parse caches.
//! The caches are keyed on source text so that repeated interpretation of the
//! same script or expression never re-parses; parse failures are cached as
//! `None` to prevent retries.

pub mod parser;
pub mod types;
pub mod word_parser;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ast::types::{File, Word};

// Re-exports
pub use parser::{parse, parse_expr, Parser};
pub use types::ParseError;

lazy_static::lazy_static! {
    /// Cache for whole-script parses.
    static ref SCRIPT_CACHE: Mutex<HashMap<String, Option<File>>> = Mutex::new(HashMap::new());

    /// Cache for expression tokenization.
    static ref EXPR_CACHE: Mutex<HashMap<String, Option<Vec<Word>>>> = Mutex::new(HashMap::new());
}

/// Parse a script, consulting the process-wide cache.
pub fn parse_script_cached(source: &str) -> Option<File> {
    if let Ok(cache) = SCRIPT_CACHE.lock() {
        if let Some(cached) = cache.get(source) {
            return cached.clone();
        }
    }
    let result = match parse(source) {
        Ok(file) => Some(file),
        Err(error) => {
            tracing::debug!(%error, "bash script parse failed");
            None
        }
    };
    if let Ok(mut cache) = SCRIPT_CACHE.lock() {
        cache.insert(source.to_string(), result.clone());
    }
    result
}

/// Tokenize an expression into words, consulting the process-wide cache.
pub fn parse_expr_cached(source: &str) -> Option<Vec<Word>> {
    if let Ok(cache) = EXPR_CACHE.lock() {
        if let Some(cached) = cache.get(source) {
            return cached.clone();
        }
    }
    let result = match parse_expr(source) {
        Ok(words) => Some(words),
        Err(error) => {
            tracing::debug!(%error, "bash expression parse failed");
            None
        }
    };
    if let Ok(mut cache) = EXPR_CACHE.lock() {
        cache.insert(source.to_string(), result.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_returns_same_ast() {
        let first = parse_script_cached("echo cached").expect("parse");
        let second = parse_script_cached("echo cached").expect("parse");
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_stores_failures() {
        assert!(parse_script_cached("while true; do x; done").is_none());
        // A second lookup hits the cached failure.
        assert!(parse_script_cached("while true; do x; done").is_none());
    }

    #[test]
    fn test_expr_cache() {
        let words = parse_expr_cached("one two").expect("parse");
        assert_eq!(words.len(), 2);
        assert!(parse_expr_cached("a | b").is_none());
    }
}
