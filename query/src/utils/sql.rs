//! SQL utility functions

/// Escape SQL LIKE metacharacters (%, _, \) in user input
///
/// # Example
///
/// ```
/// use vantage_query::utils::sql::escape_like_pattern;
///
/// let pattern = format!("%{}%", escape_like_pattern("100% match_test"));
/// assert_eq!(pattern, "%100\\% match\\_test%");
/// ```
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Where a LIKE pattern is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMatch {
    Contains,
    Prefix,
    Suffix,
}

/// Build an escaped LIKE pattern for `value`
pub fn like_pattern(value: &str, kind: LikeMatch) -> String {
    let escaped = escape_like_pattern(value);
    match kind {
        LikeMatch::Contains => format!("%{}%", escaped),
        LikeMatch::Prefix => format!("{}%", escaped),
        LikeMatch::Suffix => format!("%{}", escaped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern_no_special_chars() {
        assert_eq!(escape_like_pattern("hello"), "hello");
    }

    #[test]
    fn test_escape_like_pattern_multiple() {
        assert_eq!(escape_like_pattern("100%_\\test"), "100\\%\\_\\\\test");
    }

    #[test]
    fn test_escape_like_pattern_empty() {
        assert_eq!(escape_like_pattern(""), "");
    }

    #[test]
    fn test_like_pattern_anchoring() {
        assert_eq!(like_pattern("a_b", LikeMatch::Contains), "%a\\_b%");
        assert_eq!(like_pattern("gpt", LikeMatch::Prefix), "gpt%");
        assert_eq!(like_pattern("mini", LikeMatch::Suffix), "%mini");
    }
}
