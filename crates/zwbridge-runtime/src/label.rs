//! Path-segment allocation for value labels.
//!
//! Value labels come from device descriptors ("Battery Level", "Switch",
//! "Temperature (°C)") and are neither unique nor path-safe.  [`allocate`]
//! turns one into a lower-case segment that is unique among the labels
//! already used under the same node.

use std::collections::HashSet;

/// Replacement for every run of non-word characters.
pub const SEPARATOR: char = '_';

/// Segment used when a label normalises to nothing.
pub const FALLBACK: &str = "value";

/// Normalise a raw label into a path segment.
///
/// Every maximal run of characters that are neither alphanumeric nor `_`
/// becomes a single [`SEPARATOR`]; separators at either end are trimmed and
/// the result is lower-cased.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() || ch == SEPARATOR {
            out.extend(ch.to_lowercase());
            in_run = false;
        } else if !in_run {
            out.push(SEPARATOR);
            in_run = true;
        }
    }
    let trimmed = out.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Allocate a segment for `raw` that does not collide with `used`.
///
/// Collisions are resolved by appending the smallest integer `N >= 2` for
/// which `label + N` is free.  The caller must insert the returned segment
/// into `used` before allocating the next one.
pub fn allocate(raw: &str, used: &HashSet<String>) -> String {
    let label = normalize(raw);
    if !used.contains(&label) {
        return label;
    }
    let mut n: u64 = 2;
    loop {
        let candidate = format!("{label}{n}");
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_runs_and_case() {
        assert_eq!(normalize("Level"), "level");
        assert_eq!(normalize("Battery Level"), "battery_level");
        assert_eq!(normalize("  Temperature (°C) "), "temperature_c");
        assert_eq!(normalize("a - - b"), "a_b");
        assert_eq!(normalize("snake_case"), "snake_case");
    }

    #[test]
    fn unicode_letters_are_word_characters() {
        assert_eq!(normalize("Température"), "température");
    }

    #[test]
    fn empty_label_falls_back() {
        assert_eq!(normalize(""), FALLBACK);
        assert_eq!(normalize("%%%"), FALLBACK);
        assert_eq!(normalize("__"), FALLBACK);
    }

    #[test]
    fn collisions_get_smallest_free_suffix() {
        let mut used = HashSet::new();
        for expected in ["switch", "switch2", "switch3"] {
            let label = allocate("Switch", &used);
            assert_eq!(label, expected);
            used.insert(label);
        }
    }

    #[test]
    fn suffix_skips_taken_numbers() {
        let used: HashSet<String> = ["level", "level2", "level3"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(allocate("LEVEL", &used), "level4");
    }

    #[test]
    fn allocation_is_deterministic() {
        let used: HashSet<String> = ["switch".to_string()].into();
        assert_eq!(allocate("Switch", &used), allocate("Switch", &used));
    }
}
