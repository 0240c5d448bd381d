//! Parameter store
//!
//! The declared states and flags of one builder. A store is plain data: the
//! builder owns it exclusively and `finalise` only ever reads a snapshot.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::names::state_name_is_valid;

/// Declaration of one derived flag
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub name: String,
    /// Boolean expression over state names, e.g. `"READY && !SAVING"`
    #[serde(default)]
    pub statement: Option<String>,
    /// Delay before a `true` value lands, `None` for a synchronous write
    #[serde(default)]
    pub delay_assert_ms: Option<u64>,
    /// Delay before a `false` value lands, `None` for a synchronous write
    #[serde(default)]
    pub delay_negate_ms: Option<u64>,
}

impl FlagSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The delay that applies when the flag's predicate evaluates to `value`
    pub fn delay_for(&self, value: bool) -> Option<u64> {
        if value {
            self.delay_assert_ms
        } else {
            self.delay_negate_ms
        }
    }
}

/// Declared states and flags, in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterStore {
    #[serde(default)]
    states: IndexSet<String>,
    #[serde(default)]
    flags: IndexMap<String, FlagSpec>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a state, returning whether the name was accepted
    ///
    /// Re-declaring an existing state is accepted and changes nothing.
    pub fn insert_state(&mut self, name: &str) -> bool {
        if !state_name_is_valid(name) {
            return false;
        }
        self.states.insert(name.to_string());
        true
    }

    pub fn remove_state(&mut self, name: &str) -> bool {
        self.states.shift_remove(name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(String::as_str)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Get the flag with this name, creating an empty one if needed
    pub fn flag_entry(&mut self, name: &str) -> &mut FlagSpec {
        self.flags
            .entry(name.to_string())
            .or_insert_with(|| FlagSpec::new(name))
    }

    pub fn flag(&self, name: &str) -> Option<&FlagSpec> {
        self.flags.get(name)
    }

    pub fn remove_flag(&mut self, name: &str) -> Option<FlagSpec> {
        self.flags.shift_remove(name)
    }

    pub fn flags(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags.values()
    }

    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }
}
