//! Dataflow Facts
//!
//! The storage model of the analysis: scopes, location specifiers, locations
//! and the pure value expressions stored at locations. Scopes live in an
//! arena owned by the analysis; every reference between them is an index.

use std::fmt;

// =============================================================================
// SCOPES
// =============================================================================

/// Index of a scope in the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone)]
struct ScopeData {
    name: String,
    outer: Option<ScopeId>,
}

/// Arena owning every scope created during an analysis run.
#[derive(Debug, Default)]
pub struct Scopes {
    entries: Vec<ScopeData>,
}

impl Scopes {
    pub fn new() -> Self {
        Scopes::default()
    }

    /// Allocate a scope with an optional outer scope to inherit reads from.
    pub fn alloc(&mut self, name: impl Into<String>, outer: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.entries.len() as u32);
        self.entries.push(ScopeData {
            name: name.into(),
            outer,
        });
        id
    }

    pub fn name(&self, id: ScopeId) -> &str {
        self.entries
            .get(id.0 as usize)
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    pub fn outer(&self, id: ScopeId) -> Option<ScopeId> {
        self.entries.get(id.0 as usize).and_then(|s| s.outer)
    }

    /// Whether a read against `read_scope` may observe values stored in
    /// `stored_scope`: the stored scope must appear on the read scope's
    /// outer chain (reflexively).
    pub fn matches(&self, read_scope: ScopeId, stored_scope: ScopeId) -> bool {
        let mut cur = Some(read_scope);
        while let Some(scope) = cur {
            if scope == stored_scope {
                return true;
            }
            cur = self.outer(scope);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// VALUES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnaryStringOperator {
    Basename,
    Base64Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryStringOperator {
    StringConcat,
}

/// Pure expression over locations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    StringLiteral(String),
    /// The possibly-multi-valued contents of a location.
    Read(Box<Location>),
    UnaryStringOp {
        op: UnaryStringOperator,
        operand: Box<Value>,
    },
    BinaryStringOp {
        op: BinaryStringOperator,
        lhs: Box<Value>,
        rhs: Box<Value>,
    },
    /// Asserts the inner value resolves to a single bash word.
    SingleBashTokenConstraint(Box<Value>),
    /// Opaque unique value, e.g. the output of a network fetch or build.
    ArbitraryNewData(u64),
    InstalledPackage {
        name: Box<Value>,
        version: Box<Value>,
        distribution: Box<Value>,
        url: Box<Value>,
    },
    /// A read whose concrete value could not be determined.
    Symbolic(Box<Value>),
    ParameterPlaceholder(String),
}

impl Value {
    pub fn lit(s: impl Into<String>) -> Value {
        Value::StringLiteral(s.into())
    }

    pub fn read(loc: Location) -> Value {
        Value::Read(Box::new(loc))
    }

    pub fn basename(operand: Value) -> Value {
        Value::UnaryStringOp {
            op: UnaryStringOperator::Basename,
            operand: Box::new(operand),
        }
    }

    pub fn base64_decode(operand: Value) -> Value {
        Value::UnaryStringOp {
            op: UnaryStringOperator::Base64Decode,
            operand: Box::new(operand),
        }
    }

    /// Smart constructor for string concatenation: adjacent string literals
    /// are folded into one literal.
    pub fn concat(lhs: Value, rhs: Value) -> Value {
        match (lhs, rhs) {
            (Value::StringLiteral(a), Value::StringLiteral(b)) => {
                Value::StringLiteral(format!("{a}{b}"))
            }
            // A literal tail folds with a following literal, so chained
            // concatenation of literals collapses regardless of grouping.
            (
                Value::BinaryStringOp {
                    op: BinaryStringOperator::StringConcat,
                    lhs: outer_lhs,
                    rhs: outer_rhs,
                },
                Value::StringLiteral(b),
            ) if matches!(outer_rhs.as_ref(), Value::StringLiteral(_)) => {
                let folded = Value::concat(*outer_rhs, Value::StringLiteral(b));
                Value::BinaryStringOp {
                    op: BinaryStringOperator::StringConcat,
                    lhs: outer_lhs,
                    rhs: Box::new(folded),
                }
            }
            (lhs, rhs) => Value::BinaryStringOp {
                op: BinaryStringOperator::StringConcat,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    /// Whether the expression tree contains any symbolic subexpression.
    pub fn contains_symbolic(&self) -> bool {
        match self {
            Value::StringLiteral(_)
            | Value::ArbitraryNewData(_)
            | Value::ParameterPlaceholder(_) => false,
            Value::Symbolic(_) => true,
            Value::Read(loc) => loc.spec.contains_symbolic(),
            Value::UnaryStringOp { operand, .. } => operand.contains_symbolic(),
            Value::BinaryStringOp { lhs, rhs, .. } => {
                lhs.contains_symbolic() || rhs.contains_symbolic()
            }
            Value::SingleBashTokenConstraint(inner) => inner.contains_symbolic(),
            Value::InstalledPackage {
                name,
                version,
                distribution,
                url,
            } => {
                name.contains_symbolic()
                    || version.contains_symbolic()
                    || distribution.contains_symbolic()
                    || url.contains_symbolic()
            }
        }
    }

    /// The literal string, if this is a string literal.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Value::StringLiteral(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::StringLiteral(s) => write!(f, "{s:?}"),
            Value::Read(loc) => write!(f, "read({loc})"),
            Value::UnaryStringOp { op, operand } => match op {
                UnaryStringOperator::Basename => write!(f, "basename({operand})"),
                UnaryStringOperator::Base64Decode => write!(f, "base64decode({operand})"),
            },
            Value::BinaryStringOp { lhs, rhs, .. } => write!(f, "concat({lhs}, {rhs})"),
            Value::SingleBashTokenConstraint(inner) => write!(f, "single_token({inner})"),
            Value::ArbitraryNewData(id) => write!(f, "new_data#{id}"),
            Value::InstalledPackage {
                name,
                version,
                distribution,
                url,
            } => write!(
                f,
                "installed_package({name}, {version}, {distribution}, {url})"
            ),
            Value::Symbolic(inner) => write!(f, "symbolic({inner})"),
            Value::ParameterPlaceholder(name) => write!(f, "param({name})"),
        }
    }
}

// =============================================================================
// LOCATIONS
// =============================================================================

/// What a location denotes within its scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationSpecifier {
    /// A file path.
    Filesystem(Box<Value>),
    /// Wildcard over any path under a directory.
    FilesystemAnyUnderDir(Box<Value>),
    /// A named variable (env var, job output, matrix entry).
    Variable(Box<Value>),
    /// A named pipeline artifact containing a file.
    Artifact { name: Box<Value>, file: Box<Value> },
    /// Any file within a named artifact.
    ArtifactAnyFilename(Box<Value>),
    /// stdin/stdout/stderr stream.
    Console,
    /// An installed toolchain.
    Installed(Box<Value>),
    /// A formal parameter awaiting binding.
    ParameterPlaceholder(String),
}

impl LocationSpecifier {
    pub fn filesystem(path: Value) -> Self {
        LocationSpecifier::Filesystem(Box::new(path))
    }

    pub fn variable(name: Value) -> Self {
        LocationSpecifier::Variable(Box::new(name))
    }

    pub fn var_named(name: impl Into<String>) -> Self {
        LocationSpecifier::Variable(Box::new(Value::lit(name)))
    }

    pub fn contains_symbolic(&self) -> bool {
        match self {
            LocationSpecifier::Filesystem(path)
            | LocationSpecifier::FilesystemAnyUnderDir(path) => path.contains_symbolic(),
            LocationSpecifier::Variable(name)
            | LocationSpecifier::ArtifactAnyFilename(name)
            | LocationSpecifier::Installed(name) => name.contains_symbolic(),
            LocationSpecifier::Artifact { name, file } => {
                name.contains_symbolic() || file.contains_symbolic()
            }
            LocationSpecifier::Console | LocationSpecifier::ParameterPlaceholder(_) => false,
        }
    }
}

impl fmt::Display for LocationSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSpecifier::Filesystem(path) => write!(f, "file({path})"),
            LocationSpecifier::FilesystemAnyUnderDir(dir) => write!(f, "file_under({dir})"),
            LocationSpecifier::Variable(name) => write!(f, "var({name})"),
            LocationSpecifier::Artifact { name, file } => write!(f, "artifact({name}, {file})"),
            LocationSpecifier::ArtifactAnyFilename(name) => write!(f, "artifact_any({name})"),
            LocationSpecifier::Console => write!(f, "console"),
            LocationSpecifier::Installed(name) => write!(f, "installed({name})"),
            LocationSpecifier::ParameterPlaceholder(name) => write!(f, "param_loc({name})"),
        }
    }
}

/// The canonical state key: a scope plus a specifier within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub scope: ScopeId,
    pub spec: LocationSpecifier,
}

impl Location {
    pub fn new(scope: ScopeId, spec: LocationSpecifier) -> Self {
        Location { scope, spec }
    }

    /// Render the location with its scope name for reports.
    pub fn render(&self, scopes: &Scopes) -> String {
        format!("{}#{}:{}", scopes.name(self.scope), self.scope.0, self.spec)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}:{}", self.scope.0, self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_folds_literals() {
        let v = Value::concat(Value::lit("a/"), Value::lit("b.sh"));
        assert_eq!(v, Value::lit("a/b.sh"));
    }

    #[test]
    fn test_concat_associativity_for_literals() {
        let a = Value::lit("x");
        let b = Value::lit("y");
        let c = Value::lit("z");
        let left = Value::concat(Value::concat(a.clone(), b.clone()), c.clone());
        let right = Value::concat(a, Value::concat(b, c));
        assert_eq!(left, right);
        assert_eq!(left, Value::lit("xyz"));
    }

    #[test]
    fn test_scope_matching_walks_outer_chain() {
        let mut scopes = Scopes::new();
        let workflow_env = scopes.alloc("env", None);
        let job_env = scopes.alloc("env", Some(workflow_env));
        let step_env = scopes.alloc("env", Some(job_env));
        let other = scopes.alloc("filesystem", None);

        assert!(scopes.matches(step_env, step_env));
        assert!(scopes.matches(step_env, workflow_env));
        assert!(scopes.matches(job_env, workflow_env));
        assert!(!scopes.matches(workflow_env, job_env));
        assert!(!scopes.matches(step_env, other));
    }
}
