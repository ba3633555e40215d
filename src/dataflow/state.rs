//! Abstract Storage State
//!
//! A state maps locations to the set of values that may be stored there.
//! Multiple values at one location represent join points or matrix
//! expansions; absence of a location means "no known value". Each stored
//! value carries a `DebugLabel` used for diagnostics only; labels never
//! affect joins or growth checks.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::dataflow::facts::{Location, ScopeId, Scopes, Value};

/// Diagnostic label attached to a stored value: a monotone sequence number
/// and whether the entry arrived via a state transfer rather than a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLabel {
    pub seq: u64,
    pub is_copy: bool,
}

/// Ordered map from locations to stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    map: BTreeMap<Location, BTreeMap<Value, DebugLabel>>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// Insert a value at a location. Returns whether the entry is new.
    pub fn insert(&mut self, loc: Location, value: Value, label: DebugLabel) -> bool {
        let values = self.map.entry(loc).or_default();
        if values.contains_key(&value) {
            return false;
        }
        values.insert(value, label);
        true
    }

    pub fn values_at(&self, loc: &Location) -> Option<&BTreeMap<Value, DebugLabel>> {
        self.map.get(loc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, &BTreeMap<Value, DebugLabel>)> {
        self.map.iter()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.map.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the given (location, value) entry is present.
    pub fn contains(&self, loc: &Location, value: &Value) -> bool {
        self.map
            .get(loc)
            .map(|vals| vals.contains_key(value))
            .unwrap_or(false)
    }
}

/// Filter applied when a state flows across a node boundary.
#[derive(Debug, Clone, Default)]
pub enum StateTransferFilter {
    /// Transfer everything.
    #[default]
    All,
    /// Drop locations whose scope is in the excluded set (used to tear down
    /// scopes owned by an exiting context).
    ExcludedScopes(BTreeSet<ScopeId>),
    /// Drop specific locations (used for overwriting writes).
    ExcludedLocs(BTreeSet<Location>),
}

impl StateTransferFilter {
    pub fn allows(&self, loc: &Location) -> bool {
        match self {
            StateTransferFilter::All => true,
            StateTransferFilter::ExcludedScopes(scopes) => !scopes.contains(&loc.scope),
            StateTransferFilter::ExcludedLocs(locs) => !locs.contains(loc),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, StateTransferFilter::All)
    }
}

/// Join `src` into `dst` under the filter. Entries already present keep
/// their labels; new entries receive a fresh sequence number with the copy
/// flag set. Returns whether `dst` grew.
pub fn transfer_state(
    src: &State,
    dst: &mut State,
    filter: &StateTransferFilter,
    seq: &mut u64,
    mark_copy: bool,
) -> bool {
    let mut changed = false;
    for (loc, values) in src.iter() {
        if !filter.allows(loc) {
            continue;
        }
        for value in values.keys() {
            if dst.contains(loc, value) {
                continue;
            }
            *seq += 1;
            dst.insert(
                loc.clone(),
                value.clone(),
                DebugLabel {
                    seq: *seq,
                    is_copy: mark_copy,
                },
            );
            changed = true;
        }
    }
    changed
}

/// Render a state for reports, with scope names resolved.
pub fn render_state(state: &State, scopes: &Scopes) -> Vec<String> {
    let mut lines = Vec::new();
    for (loc, values) in state.iter() {
        for value in values.keys() {
            lines.push(format!("{} = {}", loc.render(scopes), value));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::facts::LocationSpecifier;

    fn label(seq: u64) -> DebugLabel {
        DebugLabel {
            seq,
            is_copy: false,
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let loc = Location::new(env, LocationSpecifier::var_named("X"));
        let mut state = State::new();
        assert!(state.insert(loc.clone(), Value::lit("1"), label(1)));
        assert!(!state.insert(loc.clone(), Value::lit("1"), label(2)));
        assert!(state.insert(loc, Value::lit("2"), label(3)));
    }

    #[test]
    fn test_transfer_excluded_scopes() {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let pipe = scopes.alloc("pipe", None);

        let mut src = State::new();
        src.insert(
            Location::new(env, LocationSpecifier::var_named("X")),
            Value::lit("keep"),
            label(1),
        );
        src.insert(
            Location::new(pipe, LocationSpecifier::Console),
            Value::lit("drop"),
            label(2),
        );

        let mut dst = State::new();
        let mut seq = 10;
        let filter = StateTransferFilter::ExcludedScopes(BTreeSet::from([pipe]));
        let changed = transfer_state(&src, &mut dst, &filter, &mut seq, true);
        assert!(changed);
        assert_eq!(dst.len(), 1);
        assert!(dst.contains(
            &Location::new(env, LocationSpecifier::var_named("X")),
            &Value::lit("keep")
        ));
    }

    #[test]
    fn test_transfer_reports_no_growth_when_subset() {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let loc = Location::new(env, LocationSpecifier::var_named("X"));

        let mut src = State::new();
        src.insert(loc.clone(), Value::lit("v"), label(1));
        let mut dst = src.clone();
        let mut seq = 0;
        assert!(!transfer_state(
            &src,
            &mut dst,
            &StateTransferFilter::All,
            &mut seq,
            true
        ));
    }
}
