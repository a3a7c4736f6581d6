//! Hostmask pattern matching.
//!
//! Patterns use glob semantics over the whole `nick!user@host` string:
//! `*` matches any run of characters, `?` a single character, and `[...]`
//! a character class. Matching is ASCII case-insensitive, as hostnames are.
//! A pattern that does not parse never matches.

use glob::{MatchOptions, Pattern};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Check whether `candidate` matches the glob `pattern`.
pub fn matches(candidate: &str, pattern: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(candidate, OPTIONS),
        Err(_) => false,
    }
}

/// Check whether `candidate` matches any of `patterns`, stopping at the first hit.
pub fn match_any<I, S>(candidate: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .any(|pattern| matches(candidate, pattern.as_ref()))
}

/// Check whether `pattern` would compile.
pub fn is_valid(pattern: &str) -> bool {
    Pattern::new(pattern).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_wildcard() {
        assert!(matches("alice!a@host.example.com", "*!*@*.example.com"));
        assert!(!matches("alice!a@other.net", "*!*@*.example.com"));
    }

    #[test]
    fn test_basic_globs() {
        assert!(matches("anything", "*"));
        assert!(matches("ab", "a*b"));
        assert!(matches("acccb", "a*b"));
        assert!(!matches("acbc", "a*b"));
        assert!(matches("atest", "?test"));
        assert!(!matches("test", "?test"));
        assert!(matches("nick!user@host", "n*!*@h*"));
        assert!(matches("", "*"));
        assert!(!matches("a", ""));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches("Bob!B@Friend.NET", "*!*@friend.net"));
    }

    #[test]
    fn test_slashes_are_ordinary() {
        assert!(matches("dave!d@user/dave", "*!*@user/*"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!is_valid("*!*@[host"));
        assert!(!matches("x!y@[host", "*!*@[host"));
        assert!(!match_any("x!y@[host", ["*!*@[host"]));
    }

    #[test]
    fn test_match_any() {
        let patterns = vec!["*!*@a.net".to_string(), "*!*@b.net".to_string()];
        assert!(match_any("bob!b@b.net", &patterns));
        assert!(!match_any("bob!b@c.net", &patterns));
        assert!(!match_any("bob!b@c.net", Vec::<String>::new()));
    }
}
