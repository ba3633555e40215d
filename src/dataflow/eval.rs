//! Expression Evaluation
//!
//! Resolves value and location expressions against an abstract storage
//! state. Every resolution records which concrete value was chosen for each
//! read expression (`ReadBindings`), so that alternatives which depend on
//! the same read stay consistent with each other.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use base64::Engine;

use crate::dataflow::facts::{
    BinaryStringOperator, Location, LocationSpecifier, Scopes, UnaryStringOperator, Value,
};
use crate::dataflow::state::{DebugLabel, State, StateTransferFilter};

/// Concatenations longer than this are dropped rather than materialized.
const MAX_CONCAT_LEN: usize = 10_000;

// =============================================================================
// READ BINDINGS
// =============================================================================

/// Immutable set of bindings from read expressions (keyed by the location
/// being read) to the values chosen for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadBindings {
    bindings: BTreeMap<Location, Value>,
}

impl ReadBindings {
    pub fn empty() -> Self {
        ReadBindings::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, &Value)> {
        self.bindings.iter()
    }

    /// Bindings plus one more, or `None` if it conflicts with an existing
    /// binding for the same read.
    pub fn with_binding(&self, read: &Location, value: &Value) -> Option<ReadBindings> {
        if let Some(existing) = self.bindings.get(read) {
            if existing != value {
                return None;
            }
            return Some(self.clone());
        }
        let mut bindings = self.bindings.clone();
        bindings.insert(read.clone(), value.clone());
        Some(ReadBindings { bindings })
    }

    /// Union of two binding sets, or `None` on conflict.
    pub fn with_bindings(&self, other: &ReadBindings) -> Option<ReadBindings> {
        if other.is_empty() {
            return Some(self.clone());
        }
        if self.is_empty() {
            return Some(other.clone());
        }
        for (read, value) in other.bindings.iter() {
            if let Some(existing) = self.bindings.get(read) {
                if existing != value {
                    return None;
                }
            }
        }
        let mut bindings = self.bindings.clone();
        for (read, value) in other.bindings.iter() {
            bindings.insert(read.clone(), value.clone());
        }
        Some(ReadBindings { bindings })
    }

    /// Fold a list of binding sets into one, or `None` on conflict.
    pub fn combine(bindings_list: &[ReadBindings]) -> Option<ReadBindings> {
        let mut current = ReadBindings::empty();
        for bindings in bindings_list {
            current = current.with_bindings(bindings)?;
        }
        Some(current)
    }
}

/// A resolved value with the bindings that produced it.
pub type ResolvedValue = (Value, ReadBindings);
pub type ResolvedLocation = (Location, ReadBindings);
pub type ResolvedSpec = (LocationSpecifier, ReadBindings);

// =============================================================================
// SUBSUMPTION
// =============================================================================

/// Whether a read of `subloc` may be considered a read of `loc` or a part of
/// it.
pub fn location_subsumes(loc: &LocationSpecifier, subloc: &LocationSpecifier) -> bool {
    if loc == subloc {
        return true;
    }
    match (loc, subloc) {
        (LocationSpecifier::Filesystem(a), LocationSpecifier::Filesystem(b)) => {
            // Ignore superficial "./" differences between relative paths.
            match (a.as_literal(), b.as_literal()) {
                (Some(a), Some(b)) => {
                    !a.starts_with('/')
                        && !b.starts_with('/')
                        && a.strip_prefix("./").unwrap_or(a) == b.strip_prefix("./").unwrap_or(b)
                }
                _ => false,
            }
        }
        (LocationSpecifier::FilesystemAnyUnderDir(dir), LocationSpecifier::Filesystem(path)) => {
            match (dir.as_literal(), path.as_literal()) {
                (Some(dir), Some(path)) => {
                    path.starts_with(&format!("{}/", dir.trim_end_matches('/')))
                }
                _ => false,
            }
        }
        _ => false,
    }
}

/// The values a read of `read_spec` observes from a state entry at
/// `state_spec`. A read over any filename of an artifact observes the
/// artifact's filenames rather than its contents.
pub fn values_for_subsumed_read(
    read_spec: &LocationSpecifier,
    state_spec: &LocationSpecifier,
    state_values: &BTreeMap<Value, DebugLabel>,
) -> Vec<Value> {
    if let (
        LocationSpecifier::ArtifactAnyFilename(read_name),
        LocationSpecifier::Artifact { name, file },
    ) = (read_spec, state_spec)
    {
        if read_name == name {
            return vec![file.as_ref().clone()];
        }
    }
    if location_subsumes(state_spec, read_spec) {
        return state_values.keys().cloned().collect();
    }
    Vec::new()
}

// =============================================================================
// EVALUATOR
// =============================================================================

fn is_singleton_no_bindings<T: Ord + Eq>(set: &BTreeSet<(T, ReadBindings)>, elem: &T) -> bool {
    set.len() == 1
        && set
            .iter()
            .next()
            .map(|(v, b)| v == elem && b.is_empty())
            .unwrap_or(false)
}

/// Evaluates expressions against a state, with the scope arena available for
/// scope-chain matching.
pub struct Evaluator<'a> {
    pub state: &'a State,
    pub scopes: &'a Scopes,
}

impl<'a> Evaluator<'a> {
    pub fn new(state: &'a State, scopes: &'a Scopes) -> Self {
        Evaluator { state, scopes }
    }

    /// Resolve a value expression to its set of possible values.
    pub fn transform_value(&self, value: &Value) -> BTreeSet<ResolvedValue> {
        match value {
            Value::StringLiteral(_) | Value::ArbitraryNewData(_) | Value::Symbolic(_) => {
                BTreeSet::from([(value.clone(), ReadBindings::empty())])
            }
            Value::ParameterPlaceholder(_) => BTreeSet::new(),
            Value::Read(loc) => self.transform_read(loc),
            Value::UnaryStringOp { op, operand } => self.transform_unary(*op, operand),
            Value::BinaryStringOp { op, lhs, rhs } => self.transform_binary(*op, lhs, rhs),
            Value::SingleBashTokenConstraint(operand) => self.transform_constraint(operand),
            Value::InstalledPackage {
                name,
                version,
                distribution,
                url,
            } => self.transform_installed_package(value, name, version, distribution, url),
        }
    }

    /// Resolve a read: the symbolic fallback is always included alongside
    /// every state value whose location the read subsumes.
    fn transform_read(&self, loc: &Location) -> BTreeSet<ResolvedValue> {
        let new_locs = self.transform_location(loc);
        let mut result = BTreeSet::new();
        for (new_loc, loc_bindings) in new_locs {
            result.insert((
                Value::Symbolic(Box::new(Value::read(new_loc.clone()))),
                loc_bindings.clone(),
            ));
            for (state_loc, state_values) in self.state.iter() {
                if !self.scopes.matches(new_loc.scope, state_loc.scope) {
                    continue;
                }
                for read_value in
                    values_for_subsumed_read(&new_loc.spec, &state_loc.spec, state_values)
                {
                    if let Some(bindings) = loc_bindings.with_binding(loc, &read_value) {
                        result.insert((read_value, bindings));
                    }
                }
            }
        }
        result
    }

    fn transform_unary(&self, op: UnaryStringOperator, operand: &Value) -> BTreeSet<ResolvedValue> {
        let operands = self.transform_value(operand);
        let mut result = BTreeSet::new();
        match op {
            UnaryStringOperator::Basename => {
                for (resolved, bindings) in operands {
                    if let Value::StringLiteral(s) = resolved {
                        let base = s.rsplit('/').next().unwrap_or("").to_string();
                        result.insert((Value::StringLiteral(base), bindings));
                    }
                }
            }
            UnaryStringOperator::Base64Decode => {
                for (resolved, bindings) in operands {
                    if let Value::StringLiteral(s) = resolved {
                        // Alternatives that fail to decode are dropped.
                        let decoded = base64::engine::general_purpose::STANDARD
                            .decode(s.trim_end_matches('\n'))
                            .ok()
                            .and_then(|bytes| String::from_utf8(bytes).ok());
                        if let Some(text) = decoded {
                            result.insert((Value::StringLiteral(text), bindings));
                        }
                    }
                }
            }
        }
        result
    }

    fn transform_binary(
        &self,
        op: BinaryStringOperator,
        lhs: &Value,
        rhs: &Value,
    ) -> BTreeSet<ResolvedValue> {
        let BinaryStringOperator::StringConcat = op;
        let lhs_values = self.transform_value(lhs);
        let rhs_values = self.transform_value(rhs);
        let mut result = BTreeSet::new();
        for (lhs_value, lhs_bindings) in &lhs_values {
            for (rhs_value, rhs_bindings) in &rhs_values {
                let (Value::StringLiteral(a), Value::StringLiteral(b)) = (lhs_value, rhs_value)
                else {
                    continue;
                };
                let Some(bindings) = lhs_bindings.with_bindings(rhs_bindings) else {
                    continue;
                };
                if a.len() + b.len() >= MAX_CONCAT_LEN {
                    continue;
                }
                result.insert((Value::StringLiteral(format!("{a}{b}")), bindings));
            }
        }
        result
    }

    fn transform_constraint(&self, operand: &Value) -> BTreeSet<ResolvedValue> {
        let operands = self.transform_value(operand);
        let mut result = BTreeSet::new();
        for (resolved, bindings) in operands {
            match resolved {
                Value::StringLiteral(ref literal) => {
                    // The constraint passes iff the literal tokenizes as a
                    // single bash word.
                    if let Some(words) = crate::parser::parse_expr_cached(literal) {
                        if words.len() == 1 {
                            result.insert((resolved, bindings));
                        }
                    }
                }
                // Constraints do not nest.
                Value::SingleBashTokenConstraint(inner) => {
                    result.insert((Value::SingleBashTokenConstraint(inner), bindings));
                }
                other => {
                    result.insert((Value::SingleBashTokenConstraint(Box::new(other)), bindings));
                }
            }
        }
        result
    }

    fn transform_installed_package(
        &self,
        original: &Value,
        name: &Value,
        version: &Value,
        distribution: &Value,
        url: &Value,
    ) -> BTreeSet<ResolvedValue> {
        let names = self.transform_value(name);
        let versions = self.transform_value(version);
        let distributions = self.transform_value(distribution);
        let urls = self.transform_value(url);
        if is_singleton_no_bindings(&names, name)
            && is_singleton_no_bindings(&versions, version)
            && is_singleton_no_bindings(&distributions, distribution)
            && is_singleton_no_bindings(&urls, url)
        {
            return BTreeSet::from([(original.clone(), ReadBindings::empty())]);
        }
        let mut result = BTreeSet::new();
        for (name, name_bindings) in &names {
            for (version, version_bindings) in &versions {
                let Some(bindings) = name_bindings.with_bindings(version_bindings) else {
                    continue;
                };
                for (distribution, distribution_bindings) in &distributions {
                    let Some(bindings) = bindings.with_bindings(distribution_bindings) else {
                        continue;
                    };
                    for (url, url_bindings) in &urls {
                        let Some(bindings) = bindings.with_bindings(url_bindings) else {
                            continue;
                        };
                        result.insert((
                            Value::InstalledPackage {
                                name: Box::new(name.clone()),
                                version: Box::new(version.clone()),
                                distribution: Box::new(distribution.clone()),
                                url: Box::new(url.clone()),
                            },
                            bindings,
                        ));
                    }
                }
            }
        }
        result
    }

    /// Resolve a location expression.
    pub fn transform_location(&self, location: &Location) -> BTreeSet<ResolvedLocation> {
        let specs = self.transform_location_specifier(&location.spec);
        if is_singleton_no_bindings(&specs, &location.spec) {
            return BTreeSet::from([(location.clone(), ReadBindings::empty())]);
        }
        specs
            .into_iter()
            .map(|(spec, bindings)| (Location::new(location.scope, spec), bindings))
            .collect()
    }

    /// Resolve a location specifier expression.
    pub fn transform_location_specifier(
        &self,
        spec: &LocationSpecifier,
    ) -> BTreeSet<ResolvedSpec> {
        match spec {
            LocationSpecifier::Console | LocationSpecifier::ParameterPlaceholder(_) => {
                BTreeSet::from([(spec.clone(), ReadBindings::empty())])
            }
            LocationSpecifier::Filesystem(path) => {
                let paths = self.transform_value(path);
                if is_singleton_no_bindings(&paths, path) {
                    return BTreeSet::from([(spec.clone(), ReadBindings::empty())]);
                }
                paths
                    .into_iter()
                    .map(|(p, b)| (LocationSpecifier::Filesystem(Box::new(p)), b))
                    .collect()
            }
            LocationSpecifier::FilesystemAnyUnderDir(path) => {
                let paths = self.transform_value(path);
                if is_singleton_no_bindings(&paths, path) {
                    return BTreeSet::from([(spec.clone(), ReadBindings::empty())]);
                }
                paths
                    .into_iter()
                    .map(|(p, b)| (LocationSpecifier::FilesystemAnyUnderDir(Box::new(p)), b))
                    .collect()
            }
            LocationSpecifier::Variable(name) => {
                let names = self.transform_value(name);
                if is_singleton_no_bindings(&names, name) {
                    return BTreeSet::from([(spec.clone(), ReadBindings::empty())]);
                }
                names
                    .into_iter()
                    .map(|(n, b)| (LocationSpecifier::Variable(Box::new(n)), b))
                    .collect()
            }
            LocationSpecifier::ArtifactAnyFilename(name) => {
                let names = self.transform_value(name);
                if is_singleton_no_bindings(&names, name) {
                    return BTreeSet::from([(spec.clone(), ReadBindings::empty())]);
                }
                names
                    .into_iter()
                    .map(|(n, b)| (LocationSpecifier::ArtifactAnyFilename(Box::new(n)), b))
                    .collect()
            }
            LocationSpecifier::Artifact { name, file } => {
                let names = self.transform_value(name);
                let files = self.transform_value(file);
                if is_singleton_no_bindings(&names, name) && is_singleton_no_bindings(&files, file)
                {
                    return BTreeSet::from([(spec.clone(), ReadBindings::empty())]);
                }
                let mut result = BTreeSet::new();
                for (n, name_bindings) in &names {
                    for (f, file_bindings) in &files {
                        if let Some(bindings) = name_bindings.with_bindings(file_bindings) {
                            result.insert((
                                LocationSpecifier::Artifact {
                                    name: Box::new(n.clone()),
                                    file: Box::new(f.clone()),
                                },
                                bindings,
                            ));
                        }
                    }
                }
                result
            }
            LocationSpecifier::Installed(name) => self
                .transform_value(name)
                .into_iter()
                .map(|(n, b)| (LocationSpecifier::Installed(Box::new(n)), b))
                .collect(),
        }
    }

    /// Resolve a write's location and value together, keeping only pairs
    /// with consistent bindings.
    pub fn transform_write(
        &self,
        location: &Location,
        value: &Value,
    ) -> BTreeSet<(Location, Value, ReadBindings)> {
        let locations = self.transform_location(location);
        let values = self.transform_value(value);
        let mut result = BTreeSet::new();
        for (loc, loc_bindings) in &locations {
            for (val, val_bindings) in &values {
                if let Some(bindings) = loc_bindings.with_bindings(val_bindings) {
                    result.insert((loc.clone(), val.clone(), bindings));
                }
            }
        }
        result
    }
}

// =============================================================================
// WRITES
// =============================================================================

/// A write of a value to a location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteStatement {
    pub location: Location,
    pub value: Value,
}

impl WriteStatement {
    pub fn new(location: Location, value: Value) -> Self {
        WriteStatement { location, value }
    }

    /// Produce the state containing only the values stored by this write.
    /// Writes never erase previous values; joins accumulate.
    pub fn perform_write(&self, before: &State, scopes: &Scopes, seq: &mut u64) -> State {
        let evaluator = Evaluator::new(before, scopes);
        let mut written = State::new();
        for (loc, value, _) in evaluator.transform_write(&self.location, &self.value) {
            *seq += 1;
            written.insert(
                loc,
                value,
                DebugLabel {
                    seq: *seq,
                    is_copy: false,
                },
            );
        }
        written
    }
}

/// A set of simultaneous writes applied as one transfer function.
#[derive(Debug, Clone, Default)]
pub struct StatementSet {
    pub stmts: Vec<WriteStatement>,
}

impl StatementSet {
    pub fn new(stmts: Vec<WriteStatement>) -> Self {
        StatementSet { stmts }
    }

    /// Apply all writes against the before state and join the result with
    /// the before state itself.
    pub fn apply_effects(&self, before: &State, scopes: &Scopes, seq: &mut u64) -> State {
        let mut after = State::new();
        for stmt in &self.stmts {
            let written = stmt.perform_write(before, scopes, seq);
            crate::dataflow::state::transfer_state(
                &written,
                &mut after,
                &StateTransferFilter::All,
                seq,
                false,
            );
        }
        crate::dataflow::state::transfer_state(
            before,
            &mut after,
            &StateTransferFilter::All,
            seq,
            true,
        );
        after
    }
}

// =============================================================================
// STRING EXPRESSION HELPERS
// =============================================================================

/// Split a string expression on a delimiter appearing in its literal parts.
/// `maxsplit` limits the number of splits (-1 for unlimited).
pub fn split_str_expr(expr: &Value, delimiter: char, maxsplit: i32) -> Vec<Value> {
    match expr {
        Value::StringLiteral(s) => {
            let parts: Vec<&str> = if maxsplit < 0 {
                s.split(delimiter).collect()
            } else {
                s.splitn(maxsplit as usize + 1, delimiter).collect()
            };
            parts.into_iter().map(Value::lit).collect()
        }
        Value::BinaryStringOp {
            op: BinaryStringOperator::StringConcat,
            lhs,
            rhs,
        } => {
            let split_lhs = split_str_expr(lhs, delimiter, maxsplit);
            let rhs_maxsplit = if maxsplit < 0 {
                -1
            } else {
                maxsplit - (split_lhs.len() as i32 - 1)
            };
            let split_rhs = split_str_expr(rhs, delimiter, rhs_maxsplit);
            if split_lhs.len() == 1 && split_rhs.len() == 1 {
                return vec![expr.clone()];
            }
            let mut out: Vec<Value> = Vec::new();
            let last_lhs = split_lhs.len() - 1;
            out.extend(split_lhs[..last_lhs].iter().cloned());
            out.push(Value::concat(
                split_lhs[last_lhs].clone(),
                split_rhs[0].clone(),
            ));
            out.extend(split_rhs[1..].iter().cloned());
            out
        }
        _ => vec![expr.clone()],
    }
}

/// If the set resolves to exactly one non-symbolic string literal, return it.
pub fn get_single_resolved_str(resolved: &BTreeSet<ResolvedValue>) -> Option<String> {
    let concrete: Vec<&Value> = resolved
        .iter()
        .map(|(v, _)| v)
        .filter(|v| !v.contains_symbolic())
        .collect();
    match concrete.as_slice() {
        [Value::StringLiteral(s)] => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::facts::Location;

    fn fixture() -> (Scopes, State, Location) {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let loc = Location::new(env, LocationSpecifier::var_named("VERSION"));
        let mut state = State::new();
        state.insert(
            loc.clone(),
            Value::lit("1.2.3"),
            DebugLabel {
                seq: 1,
                is_copy: false,
            },
        );
        (scopes, state, loc)
    }

    #[test]
    fn test_literal_evaluates_to_itself() {
        let (scopes, state, _) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let result = evaluator.transform_value(&Value::lit("x"));
        assert_eq!(
            result,
            BTreeSet::from([(Value::lit("x"), ReadBindings::empty())])
        );
    }

    #[test]
    fn test_read_returns_value_with_binding_and_symbolic_fallback() {
        let (scopes, state, loc) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let result = evaluator.transform_value(&Value::read(loc.clone()));

        let expected_bindings = ReadBindings::empty()
            .with_binding(&loc, &Value::lit("1.2.3"))
            .unwrap();
        assert!(result.contains(&(Value::lit("1.2.3"), expected_bindings)));
        assert!(result
            .iter()
            .any(|(v, _)| matches!(v, Value::Symbolic(_))));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_read_through_outer_scope() {
        let mut scopes = Scopes::new();
        let outer = scopes.alloc("env", None);
        let inner = scopes.alloc("env", Some(outer));
        let stored = Location::new(outer, LocationSpecifier::var_named("X"));
        let mut state = State::new();
        state.insert(
            stored,
            Value::lit("v"),
            DebugLabel {
                seq: 1,
                is_copy: false,
            },
        );
        let evaluator = Evaluator::new(&state, &scopes);
        let read_loc = Location::new(inner, LocationSpecifier::var_named("X"));
        let result = evaluator.transform_value(&Value::read(read_loc));
        assert!(result.iter().any(|(v, _)| v == &Value::lit("v")));
    }

    #[test]
    fn test_basename_literal() {
        let (scopes, state, _) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let result = evaluator.transform_value(&Value::basename(Value::lit("a/b/c.sh")));
        assert_eq!(
            result,
            BTreeSet::from([(Value::lit("c.sh"), ReadBindings::empty())])
        );
    }

    #[test]
    fn test_base64_decode_failure_drops_alternative() {
        let (scopes, state, _) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let result = evaluator.transform_value(&Value::base64_decode(Value::lit("!!!not-b64!!!")));
        assert!(result.is_empty());
        let ok = evaluator.transform_value(&Value::base64_decode(Value::lit("aGVsbG8=")));
        assert_eq!(
            ok,
            BTreeSet::from([(Value::lit("hello"), ReadBindings::empty())])
        );
    }

    #[test]
    fn test_concat_of_read_and_literal() {
        let (scopes, state, loc) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let expr = Value::concat(Value::lit("v"), Value::read(loc));
        let result = evaluator.transform_value(&expr);
        assert!(result.iter().any(|(v, _)| v == &Value::lit("v1.2.3")));
        // The symbolic operand contributes no concatenation result.
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_conflicting_bindings_are_rejected() {
        let (scopes, mut state, loc) = fixture();
        state.insert(
            loc.clone(),
            Value::lit("9.9.9"),
            DebugLabel {
                seq: 2,
                is_copy: false,
            },
        );
        let evaluator = Evaluator::new(&state, &scopes);
        // read(X) concatenated with read(X) must agree on the chosen value.
        let expr = Value::BinaryStringOp {
            op: BinaryStringOperator::StringConcat,
            lhs: Box::new(Value::read(loc.clone())),
            rhs: Box::new(Value::read(loc)),
        };
        let result = evaluator.transform_value(&expr);
        let literals: BTreeSet<&Value> = result.iter().map(|(v, _)| v).collect();
        assert!(literals.contains(&Value::lit("1.2.31.2.3")));
        assert!(literals.contains(&Value::lit("9.9.99.9.9")));
        assert!(!literals.contains(&Value::lit("1.2.39.9.9")));
        assert!(!literals.contains(&Value::lit("9.9.91.2.3")));
    }

    #[test]
    fn test_single_token_constraint() {
        let (scopes, state, _) = fixture();
        let evaluator = Evaluator::new(&state, &scopes);
        let pass = evaluator.transform_value(&Value::SingleBashTokenConstraint(Box::new(
            Value::lit("one-token"),
        )));
        assert_eq!(pass.len(), 1);
        let fail = evaluator.transform_value(&Value::SingleBashTokenConstraint(Box::new(
            Value::lit("two tokens"),
        )));
        assert!(fail.is_empty());
    }

    #[test]
    fn test_artifact_any_filename_read_observes_filenames() {
        let mut scopes = Scopes::new();
        let artifacts = scopes.alloc("artifacts", None);
        let stored = Location::new(
            artifacts,
            LocationSpecifier::Artifact {
                name: Box::new(Value::lit("jars")),
                file: Box::new(Value::lit("app.jar")),
            },
        );
        let mut state = State::new();
        state.insert(
            stored,
            Value::ArbitraryNewData(7),
            DebugLabel {
                seq: 1,
                is_copy: false,
            },
        );
        let evaluator = Evaluator::new(&state, &scopes);
        let read = Value::read(Location::new(
            artifacts,
            LocationSpecifier::ArtifactAnyFilename(Box::new(Value::lit("jars"))),
        ));
        let result = evaluator.transform_value(&read);
        assert!(result.iter().any(|(v, _)| v == &Value::lit("app.jar")));
    }

    #[test]
    fn test_filesystem_any_under_dir_subsumption() {
        let dir = LocationSpecifier::FilesystemAnyUnderDir(Box::new(Value::lit("target/")));
        let file = LocationSpecifier::filesystem(Value::lit("target/app.jar"));
        assert!(location_subsumes(&dir, &file));
        let other = LocationSpecifier::filesystem(Value::lit("dist/app.jar"));
        assert!(!location_subsumes(&dir, &other));
        // Reflexive.
        assert!(location_subsumes(&file, &file));
    }

    #[test]
    fn test_relative_path_dot_slash_subsumption() {
        let a = LocationSpecifier::filesystem(Value::lit("./out/app.jar"));
        let b = LocationSpecifier::filesystem(Value::lit("out/app.jar"));
        assert!(location_subsumes(&a, &b));
        assert!(location_subsumes(&b, &a));
    }

    #[test]
    fn test_with_binding_idempotent_and_conflicting() {
        let (_, _, loc) = fixture();
        let bindings = ReadBindings::empty()
            .with_binding(&loc, &Value::lit("a"))
            .unwrap();
        let again = bindings.with_binding(&loc, &Value::lit("a")).unwrap();
        assert_eq!(bindings, again);
        assert!(bindings.with_binding(&loc, &Value::lit("b")).is_none());
    }

    #[test]
    fn test_split_str_expr_literal() {
        let parts = split_str_expr(&Value::lit("version=1.2.3"), '=', 1);
        assert_eq!(parts, vec![Value::lit("version"), Value::lit("1.2.3")]);
        // maxsplit=1 keeps later delimiters intact.
        let parts = split_str_expr(&Value::lit("a=b=c"), '=', 1);
        assert_eq!(parts, vec![Value::lit("a"), Value::lit("b=c")]);
    }

    #[test]
    fn test_split_str_expr_across_concat() {
        let (_, _, loc) = fixture();
        let expr = Value::concat(Value::lit("version="), Value::read(loc.clone()));
        let parts = split_str_expr(&expr, '=', 1);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Value::lit("version"));
        assert_eq!(parts[1], Value::read(loc));
    }

    #[test]
    fn test_write_statement_cartesian_with_consistent_bindings() {
        let (scopes, state, loc) = fixture();
        let mut seq = 100;
        let target_scope = loc.scope;
        let write = WriteStatement::new(
            Location::new(
                target_scope,
                LocationSpecifier::Filesystem(Box::new(Value::read(loc.clone()))),
            ),
            Value::read(loc),
        );
        let written = write.perform_write(&state, &scopes, &mut seq);
        // Concrete resolution: path "1.2.3" holding "1.2.3"; symbolic
        // alternatives are retained as separate entries.
        let concrete = Location::new(
            target_scope,
            LocationSpecifier::filesystem(Value::lit("1.2.3")),
        );
        assert!(written.contains(&concrete, &Value::lit("1.2.3")));
        // Consistent-binding filtering: the concrete path never pairs with
        // a different literal.
        for (location, values) in written.iter() {
            if location == &concrete {
                for value in values.keys() {
                    if let Value::StringLiteral(s) = value {
                        assert_eq!(s, "1.2.3");
                    }
                }
            }
        }
    }
}
