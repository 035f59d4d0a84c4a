//! Raw warehouse rows → [`PreprocessedReport`].

use serde_json::Value;
use tracing::warn;

use triage_common::{PreprocessedReport, RawReport, UrlPattern};

use crate::hostname::HostnameNormalizer;
use crate::patterns::match_bugs;

/// Preprocess a batch of rows against already-prepared URL patterns.
///
/// Rows without a URL are dropped. Malformed per-row data never fails the
/// batch: unparseable URLs get the `[unknown]` domain and undecodable
/// `details` become `null`.
pub fn preprocess(
    raw_reports: Vec<RawReport>,
    prepared_patterns: &[UrlPattern],
    normalizer: &mut HostnameNormalizer,
) -> Vec<PreprocessedReport> {
    raw_reports
        .into_iter()
        .filter_map(|report| preprocess_report(report, prepared_patterns, normalizer))
        .collect()
}

/// Preprocess one row; `None` when it has no URL.
pub fn preprocess_report(
    report: RawReport,
    prepared_patterns: &[UrlPattern],
    normalizer: &mut HostnameNormalizer,
) -> Option<PreprocessedReport> {
    let RawReport {
        reported_at,
        url,
        details,
        fields,
    } = report;

    let url = url.filter(|u| !u.is_empty())?;
    let related_bugs = match_bugs(&url, prepared_patterns);
    let root_domain = normalizer.root_domain_of(&url);
    let details = decode_details(&fields.uuid, details);

    Some(PreprocessedReport {
        reported_at: reported_at.value,
        url,
        details,
        fields,
        related_bugs,
        root_domain,
    })
}

/// `details` may be stored as JSON-in-a-string; decode it, leave anything
/// else as it came.
fn decode_details(uuid: &str, details: Option<Value>) -> Option<Value> {
    match details {
        Some(Value::String(raw)) => match serde_json::from_str(&raw) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(uuid, error = %e, "Report details are not valid JSON");
                Some(Value::Null)
            }
        },
        other => other,
    }
}
