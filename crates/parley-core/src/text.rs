//! Small string helpers.

/// Truncate `s` to at most `max_bytes`, backing off to a char boundary.
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First non-blank value among `candidates`, trimmed.
pub fn first_non_blank<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_is_untouched() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundary() {
        // 'é' is two bytes
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("héllo", 3), "hé");
    }

    #[test]
    fn first_non_blank_skips_empty_and_missing() {
        assert_eq!(
            first_non_blank([None, Some("  "), Some(" api "), Some("user")]),
            Some("api")
        );
        assert_eq!(first_non_blank([None, Some("")]), None);
    }
}
