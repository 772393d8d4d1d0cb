//! Shared helpers: static regexes and markup text extraction.

pub mod markup;

use regex::Regex;
use std::sync::OnceLock;

/// Compiles `pattern` once into `cell`.
///
/// Only ever called with literal patterns that are covered by tests, so a
/// compile failure is a programming error.
pub(crate) fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex pattern must compile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_regex_is_cached() {
        static CELL: OnceLock<Regex> = OnceLock::new();
        let a = static_regex(&CELL, r"\d+");
        let b = static_regex(&CELL, r"ignored");
        assert!(std::ptr::eq(a, b));
        assert!(b.is_match("42"));
    }
}
