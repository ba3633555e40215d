//! Workflow Expression Extraction
//!
//! Turns a workflow string that may contain `${{ ... }}` expressions into a
//! dataflow value: literal segments concatenate with reads of the variables
//! the expressions name. Only variable contexts stored in the job variables
//! scope (`matrix.*`, `steps.*`, `needs.*`) resolve; anything else makes the
//! whole string unresolvable and the caller skips that input.

use crate::dataflow::error::ExprValueError;
use crate::dataflow::facts::{Location, LocationSpecifier, ScopeId, Value};

/// Variable context prefixes resolvable against the job variables scope.
const VAR_PREFIXES: &[&str] = &["matrix.", "steps.", "needs."];

/// Extract a value from a workflow expression string.
pub fn extract_value_from_expr_string(
    input: &str,
    var_scope: Option<ScopeId>,
) -> Result<Value, ExprValueError> {
    let mut pieces: Vec<Value> = Vec::new();
    let mut rest = input;
    loop {
        match rest.find("${{") {
            None => {
                if !rest.is_empty() {
                    pieces.push(Value::lit(rest));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    pieces.push(Value::lit(&rest[..start]));
                }
                let after = &rest[start + 3..];
                let Some(end) = after.find("}}") else {
                    return Err(ExprValueError("unterminated expression".into()));
                };
                let expr = after[..end].trim();
                pieces.push(resolve_expr(expr, var_scope)?);
                rest = &after[end + 2..];
            }
        }
    }

    let mut iter = pieces.into_iter();
    let first = iter.next().unwrap_or_else(|| Value::lit(""));
    Ok(iter.fold(first, Value::concat))
}

/// Resolve a single expression to a variable read.
fn resolve_expr(expr: &str, var_scope: Option<ScopeId>) -> Result<Value, ExprValueError> {
    if !VAR_PREFIXES.iter().any(|p| expr.starts_with(p)) {
        return Err(ExprValueError(format!("unsupported expression: {expr}")));
    }
    let Some(scope) = var_scope else {
        return Err(ExprValueError(format!(
            "no variable scope for expression: {expr}"
        )));
    };
    Ok(Value::read(Location::new(
        scope,
        LocationSpecifier::var_named(expr),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::facts::Scopes;

    #[test]
    fn test_plain_literal() {
        let value = extract_value_from_expr_string("temurin", None).unwrap();
        assert_eq!(value, Value::lit("temurin"));
    }

    #[test]
    fn test_matrix_expression() {
        let mut scopes = Scopes::new();
        let vars = scopes.alloc("job_vars", None);
        let value = extract_value_from_expr_string("${{ matrix.java }}", Some(vars)).unwrap();
        assert_eq!(
            value,
            Value::read(Location::new(vars, LocationSpecifier::var_named("matrix.java")))
        );
    }

    #[test]
    fn test_mixed_literal_and_expression() {
        let mut scopes = Scopes::new();
        let vars = scopes.alloc("job_vars", None);
        let value =
            extract_value_from_expr_string("v${{ steps.build.outputs.version }}-rc", Some(vars))
                .unwrap();
        let Value::BinaryStringOp { lhs, rhs, .. } = value else {
            panic!("expected concatenation");
        };
        // Left side is concat("v", read(...)), right side the literal tail.
        assert!(matches!(*lhs, Value::BinaryStringOp { .. }));
        assert_eq!(*rhs, Value::lit("-rc"));
    }

    #[test]
    fn test_unsupported_expression_errors() {
        let mut scopes = Scopes::new();
        let vars = scopes.alloc("job_vars", None);
        assert!(extract_value_from_expr_string("${{ github.sha }}", Some(vars)).is_err());
        assert!(extract_value_from_expr_string("${{ matrix.java }}", None).is_err());
    }
}
