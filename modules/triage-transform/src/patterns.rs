//! Matching report URLs against knowledge-base URL patterns.
//!
//! Matching is plain, case-sensitive substring containment over the whole URL:
//! host, path and query are not told apart. Pattern text has its first `*`
//! removed before matching; no other wildcard handling happens.

use triage_common::{RelatedBug, UrlPattern};

/// Strip the first `*` from every pattern, leaving the originals untouched.
pub fn prepare_patterns(patterns: &[UrlPattern]) -> Vec<UrlPattern> {
    patterns
        .iter()
        .map(|pattern| UrlPattern {
            url_pattern: pattern.url_pattern.replacen('*', "", 1),
            ..pattern.clone()
        })
        .collect()
}

/// Every prepared pattern contained in `url`, in pattern order, one entry per
/// matching pattern (two patterns for the same bug yield two entries).
pub fn match_bugs(url: &str, patterns: &[UrlPattern]) -> Vec<RelatedBug> {
    patterns
        .iter()
        .filter(|pattern| url.contains(pattern.url_pattern.as_str()))
        .map(|pattern| RelatedBug {
            number: pattern.bug,
            title: pattern.title.clone(),
        })
        .collect()
}
