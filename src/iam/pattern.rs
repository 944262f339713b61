//! Pattern matching for actions and resource ARNs
//!
//! Identifiers are segmented by `:` and `/`:
//! - `blog:update`
//! - `arn:app:blog/123/comments`
//!
//! Supports wildcards:
//! - `*` inside a pattern matches any run of characters within one segment
//!   (e.g., `arn:*:blog/123`)
//! - `*` as the final token matches to the end of the candidate, across
//!   segments (e.g., `blog:*`, `arn:app:blog/*`)
//! - `*` on its own matches every non-empty candidate
//!
//! Matching is case-sensitive and fully anchored.

use crate::error::{AuthzError, Result};
use regex::Regex;

/// Regex for a run of characters that stays inside one segment
const SEGMENT_RUN: &str = "[^:/]*";

/// A compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// `*`
    Any,
    /// No wildcard at all
    Literal,
    /// Anchored regex built from the wildcard pattern
    Wildcard(Regex),
}

impl Pattern {
    /// Compile a wildcard pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` for empty or whitespace-padded patterns.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(AuthzError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern cannot be empty".to_string(),
            });
        }
        if pattern.trim() != pattern {
            return Err(AuthzError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern has leading or trailing whitespace".to_string(),
            });
        }

        let kind = if pattern == "*" {
            PatternKind::Any
        } else if !pattern.contains('*') {
            PatternKind::Literal
        } else {
            PatternKind::Wildcard(Self::to_regex(pattern)?)
        };

        Ok(Pattern {
            source: pattern.to_string(),
            kind,
        })
    }

    /// Translate a wildcard pattern into an anchored regex
    fn to_regex(pattern: &str) -> Result<Regex> {
        let parts: Vec<&str> = pattern.split('*').collect();
        let last = parts.len() - 1;

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        for (i, part) in parts.iter().enumerate() {
            expr.push_str(&regex::escape(part));
            if i == last {
                break;
            }
            // A trailing star runs to end of string, any other star stays in its segment
            if i + 1 == last && parts[last].is_empty() {
                expr.push_str(".*");
            } else {
                expr.push_str(SEGMENT_RUN);
            }
        }
        expr.push('$');

        Regex::new(&expr).map_err(|e| AuthzError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check a candidate against this pattern
    pub fn matches(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }

        match &self.kind {
            PatternKind::Any => true,
            PatternKind::Literal => self.source == candidate,
            PatternKind::Wildcard(regex) => regex.is_match(candidate),
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern contains a wildcard
    pub fn is_wildcard(&self) -> bool {
        !matches!(self.kind, PatternKind::Literal)
    }
}

/// Stateless matcher for one-off checks
pub struct PatternMatcher;

impl PatternMatcher {
    /// Check if a candidate identifier matches a pattern
    ///
    /// Invalid patterns never match.
    ///
    /// # Examples
    /// ```
    /// use iam_authz::iam::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("svc:*", "svc:read"));
    /// assert!(PatternMatcher::matches("*", "arn:app:blog/123"));
    /// assert!(!PatternMatcher::matches("svc:Read", "svc:Write"));
    /// ```
    pub fn matches(pattern: &str, candidate: &str) -> bool {
        match Pattern::compile(pattern) {
            Ok(compiled) => compiled.matches(candidate),
            Err(_) => false,
        }
    }

    /// Check if any pattern in the list matches; an empty list never matches
    pub fn matches_any<S: AsRef<str>>(patterns: &[S], candidate: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| Self::matches(pattern.as_ref(), candidate))
    }
}
