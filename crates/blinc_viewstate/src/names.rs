//! State name validation

use regex::Regex;
use std::sync::OnceLock;

/// Pattern every state name must match
pub const STATE_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_-]*$";

fn state_name_regex() -> &'static Regex {
    static STATE_NAME: OnceLock<Regex> = OnceLock::new();
    STATE_NAME.get_or_init(|| Regex::new(STATE_NAME_PATTERN).expect("Invalid state name pattern"))
}

/// Check whether `name` can be declared as a state
///
/// Declaring a name that fails this check is a silent no-op.
pub fn state_name_is_valid(name: &str) -> bool {
    state_name_regex().is_match(name)
}
