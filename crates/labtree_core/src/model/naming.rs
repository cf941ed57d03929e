//! Unique sibling name resolution.
//!
//! # Invariants
//! - The result never collides with a given sibling name.
//! - A candidate that does not collide is returned unchanged.
//! - Digit and whitespace classification is ASCII-only, so the result does
//!   not depend on the process locale.

use std::collections::HashSet;

/// How a rename treats a collision with a sibling name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameHandling {
    /// Resolve the collision with [`unique_name_for`] and report it.
    #[default]
    AutoUnique,
    /// Keep the requested name even if a sibling already uses it.
    UniqueNotRequired,
    /// Refuse the rename when the requested name is taken.
    UniqueRequired,
}

/// Makes `candidate` unique among `sibling_names` by incrementing a trailing
/// number.
///
/// Trailing ASCII digits are stripped to get a base (`"Sheet 3"` -> `"Sheet "`,
/// `"Sheet3"` -> `"Sheet"`). A separating space is appended when the base is
/// non-empty and does not already end in whitespace. Numbers are then tried
/// upwards starting after the stripped one (or after 0).
pub fn unique_name_for<'a>(
    candidate: &str,
    sibling_names: impl IntoIterator<Item = &'a str>,
) -> String {
    let taken: HashSet<&str> = sibling_names.into_iter().collect();
    if !taken.contains(candidate) {
        return candidate.to_string();
    }

    let stem = candidate.trim_end_matches(|c: char| c.is_ascii_digit());
    // Overlong digit runs restart from zero instead of failing.
    let mut number: u64 = candidate[stem.len()..].parse().unwrap_or(0);

    let mut base = stem.to_string();
    if !base.is_empty() && !base.ends_with(|c: char| c.is_ascii_whitespace()) {
        base.push(' ');
    }

    loop {
        number = number.wrapping_add(1);
        let name = format!("{base}{number}");
        if !taken.contains(name.as_str()) {
            return name;
        }
    }
}
