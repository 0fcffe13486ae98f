//! Topic filters and the matchers that decide whether a concrete topic
//! satisfies them.
//!
//! The registry only ever talks to [`TopicMatcher`], so the wildcard dialect
//! can be swapped per client without touching subscription bookkeeping.

use crate::error::{Error, Result};
use std::fmt;

/// Separator between topic levels.
pub const TOPIC_SEPARATOR: char = '/';

/// Matches exactly one topic level.
pub const SINGLE_LEVEL_WILDCARD: &str = "*";

/// Matches one or more trailing topic levels (only with [`TrailingWildcardMatcher`]).
pub const MULTI_LEVEL_WILDCARD: &str = ">";

/// A validated subscription pattern.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TopicFilter {
    pattern: String,
    segments: Vec<String>,
}

impl TopicFilter {
    fn from_pattern(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            segments: pattern.split(TOPIC_SEPARATOR).map(String::from).collect(),
        }
    }

    /// The pattern exactly as it was subscribed.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if any segment is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s == SINGLE_LEVEL_WILDCARD || s == MULTI_LEVEL_WILDCARD)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

/// Single entry point for topic matching.
pub trait TopicMatcher: fmt::Debug + Send + Sync {
    /// Validate `pattern` and turn it into a filter this matcher understands.
    fn compile(&self, pattern: &str) -> Result<TopicFilter>;

    /// Does the concrete `topic` satisfy `filter`?
    fn matches(&self, filter: &TopicFilter, topic: &str) -> bool;
}

/// Strict matcher: `*` occupies exactly one whole level and segment counts
/// must be equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentMatcher;

impl TopicMatcher for SegmentMatcher {
    fn compile(&self, pattern: &str) -> Result<TopicFilter> {
        check_not_empty(pattern)?;
        for segment in pattern.split(TOPIC_SEPARATOR) {
            if segment == MULTI_LEVEL_WILDCARD {
                return Err(Error::InvalidTopicFilter(format!(
                    "{pattern}: multi-level wildcard is not supported by this matcher"
                )));
            }
            check_segment(pattern, segment)?;
        }
        Ok(TopicFilter::from_pattern(pattern))
    }

    fn matches(&self, filter: &TopicFilter, topic: &str) -> bool {
        if !filter.has_wildcard() {
            return filter.pattern == topic;
        }
        let topic_segments: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
        filter.segments.len() == topic_segments.len()
            && levels_match(&filter.segments, &topic_segments)
    }
}

/// Strict matcher plus a trailing `>` that swallows one or more remaining
/// levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingWildcardMatcher;

impl TopicMatcher for TrailingWildcardMatcher {
    fn compile(&self, pattern: &str) -> Result<TopicFilter> {
        check_not_empty(pattern)?;
        let segments: Vec<&str> = pattern.split(TOPIC_SEPARATOR).collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if *segment == MULTI_LEVEL_WILDCARD {
                if i != last {
                    return Err(Error::InvalidTopicFilter(format!(
                        "{pattern}: '>' must be the last level"
                    )));
                }
                continue;
            }
            check_segment(pattern, segment)?;
        }
        Ok(TopicFilter::from_pattern(pattern))
    }

    fn matches(&self, filter: &TopicFilter, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
        match filter.segments.split_last() {
            Some((last, prefix)) if last == MULTI_LEVEL_WILDCARD => {
                topic_segments.len() > prefix.len()
                    && levels_match(prefix, &topic_segments[..prefix.len()])
            }
            _ => SegmentMatcher.matches(filter, topic),
        }
    }
}

fn check_not_empty(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::InvalidTopicFilter("topic filter cannot be empty".into()));
    }
    Ok(())
}

fn check_segment(pattern: &str, segment: &str) -> Result<()> {
    if segment != SINGLE_LEVEL_WILDCARD && segment.contains(SINGLE_LEVEL_WILDCARD) {
        return Err(Error::InvalidTopicFilter(format!(
            "{pattern}: '*' must occupy a whole level, found '{segment}'"
        )));
    }
    if segment != MULTI_LEVEL_WILDCARD && segment.contains(MULTI_LEVEL_WILDCARD) {
        return Err(Error::InvalidTopicFilter(format!(
            "{pattern}: '>' must occupy a whole level, found '{segment}'"
        )));
    }
    Ok(())
}

// Callers guarantee equal lengths.
fn levels_match(filter: &[String], topic: &[&str]) -> bool {
    filter
        .iter()
        .zip(topic)
        .all(|(f, t)| f == SINGLE_LEVEL_WILDCARD || f == t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, topic: &str) -> bool {
        let filter = SegmentMatcher.compile(pattern).unwrap();
        SegmentMatcher.matches(&filter, topic)
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(matches("ai/design/ideas/generated", "ai/design/ideas/generated"));
        assert!(!matches("ai/image/generated", "ai/image/error"));
        assert!(!matches("a/b/c", "a/b/c/"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("a/*/c", "a/b/c"));
        assert!(!matches("a/*/c", "a/b/b/c"));
        assert!(!matches("a/*/c", "x/y/z"));
        assert!(!matches("a/*/c", "a/c"));
        assert!(matches("ai/*/error", "ai/image/error"));
        assert!(matches("*/*", "shopify/product"));
    }

    #[test]
    fn test_wildcard_matches_empty_level() {
        assert!(matches("a/*/c", "a//c"));
    }

    #[test]
    fn test_segment_count_property() {
        let filters = ["a/*/c", "*/b/*", "*/*/*", "a/b/c"];
        let topics = ["a/b/c", "a/x/c", "z/b/q", "a/b", "a/b/c/d", "q/r/s"];
        for pattern in filters {
            let filter_segments: Vec<&str> = pattern.split('/').collect();
            for topic in topics {
                let topic_segments: Vec<&str> = topic.split('/').collect();
                let expected = filter_segments.len() == topic_segments.len()
                    && filter_segments
                        .iter()
                        .zip(&topic_segments)
                        .all(|(f, t)| *f == "*" || f == t);
                assert_eq!(matches(pattern, topic), expected, "{pattern} vs {topic}");
            }
        }
    }

    #[test]
    fn test_rejects_partial_wildcards() {
        assert!(matches!(
            SegmentMatcher.compile("ai/*design"),
            Err(Error::InvalidTopicFilter(_))
        ));
        assert!(SegmentMatcher.compile("a/b*/c").is_err());
        assert!(SegmentMatcher.compile("").is_err());
        assert!(SegmentMatcher.compile("a/>").is_err());
    }

    #[test]
    fn test_trailing_wildcard() {
        let m = TrailingWildcardMatcher;
        let filter = m.compile("ai/>").unwrap();
        assert!(m.matches(&filter, "ai/design/error"));
        assert!(m.matches(&filter, "ai/image"));
        assert!(!m.matches(&filter, "ai"));
        assert!(!m.matches(&filter, "shopify/product/created"));

        let filter = m.compile("ai/*/>").unwrap();
        assert!(m.matches(&filter, "ai/image/error"));
        assert!(!m.matches(&filter, "ai/image"));

        let filter = m.compile("a/*/c").unwrap();
        assert!(m.matches(&filter, "a/b/c"));
        assert!(!m.matches(&filter, "a/b/b/c"));
    }

    #[test]
    fn test_trailing_wildcard_must_be_last() {
        let m = TrailingWildcardMatcher;
        assert!(m.compile("ai/>/error").is_err());
        assert!(m.compile("ai/x>").is_err());
    }

    #[test]
    fn test_display_keeps_pattern() {
        let filter = SegmentMatcher.compile("ai/*/generated").unwrap();
        assert_eq!(filter.to_string(), "ai/*/generated");
        assert!(filter.has_wildcard());
        assert_eq!(filter.segments().len(), 3);
    }
}
