//! Grouping reports by root domain and applying each view's selection policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use triage_common::{Prediction, PredictionFilter, PreprocessedReport};

/// Most reports the triage view shows per domain.
pub const ACTIONABLE_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// All reports for one root domain, in incoming order.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainBucket {
    pub root_domain: String,
    pub reports: Vec<PreprocessedReport>,
}

/// Reports for one domain split by whether a known bug already covers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownUnknownGroup {
    pub root_domain: String,
    pub known_reports: Vec<PreprocessedReport>,
    pub unknown_reports: Vec<PreprocessedReport>,
}

/// The per-domain triage worklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableGroup {
    pub root_domain: String,
    /// Count of every report for the domain, before any filtering.
    pub reports_count: usize,
    pub reports: Vec<PreprocessedReport>,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Group by `root_domain`. Buckets come out in first-seen order and keep the
/// incoming order of their reports, so the result is deterministic for a
/// given input.
pub fn group_by_domain(reports: Vec<PreprocessedReport>) -> Vec<DomainBucket> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<DomainBucket> = Vec::new();

    for report in reports {
        match index.get(&report.root_domain) {
            Some(&i) => buckets[i].reports.push(report),
            None => {
                index.insert(report.root_domain.clone(), buckets.len());
                buckets.push(DomainBucket {
                    root_domain: report.root_domain.clone(),
                    reports: vec![report],
                });
            }
        }
    }

    buckets
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Known/unknown split for the inconsistent-entries view.
pub fn partition_known(buckets: Vec<DomainBucket>) -> Vec<KnownUnknownGroup> {
    buckets
        .into_iter()
        .map(|bucket| {
            let (known_reports, unknown_reports): (Vec<_>, Vec<_>) =
                bucket.reports.into_iter().partition(|r| r.is_known());
            KnownUnknownGroup {
                root_domain: bucket.root_domain,
                known_reports,
                unknown_reports,
            }
        })
        .collect()
}

/// Worklist for the user-reports view.
pub fn select_actionable(buckets: Vec<DomainBucket>) -> Vec<ActionableGroup> {
    buckets
        .into_iter()
        .map(|bucket| ActionableGroup {
            root_domain: bucket.root_domain,
            reports_count: bucket.reports.len(),
            reports: actionable_subset(bucket.reports),
        })
        .collect()
}

/// Reports with a comment and a `valid` prediction, cut to the first
/// [`ACTIONABLE_LIMIT`], and only then stripped of already-actioned ones.
///
/// Incoming order is comment length descending, so the cut keeps the same
/// top reports while reviewers work through them; slots freed by actioned
/// reports are not refilled from further down the list.
pub fn actionable_subset(reports: Vec<PreprocessedReport>) -> Vec<PreprocessedReport> {
    reports
        .into_iter()
        .filter(|r| r.fields.has_comment() && r.fields.is_predicted(Prediction::Valid))
        .take(ACTIONABLE_LIMIT)
        .filter(|r| !r.fields.is_actioned())
        .collect()
}

/// Restrict a flat list to one prediction; `All` keeps everything.
pub fn filter_by_prediction(
    reports: Vec<PreprocessedReport>,
    filter: PredictionFilter,
) -> Vec<PreprocessedReport> {
    reports
        .into_iter()
        .filter(|r| filter.admits(&r.fields))
        .collect()
}
