//! The report transformation pipeline.
//!
//! prepare patterns → preprocess reports → group/partition (per view) →
//! sort (per view) → serialize. Every stage is synchronous and pure; the only
//! side channel is [`Progress`], which reports milestones to whoever is
//! waiting on the run.

use serde::Serialize;
use tracing::debug;

use triage_common::{PreprocessedReport, RawReport, ReportView, TriageError, UrlPattern};

use crate::grouping::{
    filter_by_prediction, group_by_domain, partition_known, select_actionable, ActionableGroup,
    KnownUnknownGroup,
};
use crate::hostname::HostnameNormalizer;
use crate::patterns::prepare_patterns;
use crate::preprocess::preprocess;
use crate::ranking::{sort_groups, sort_reports};

/// Receives human-readable milestone messages while a run advances.
pub trait Progress: Send + Sync {
    fn verbose(&self, msg: &str);
}

/// Final structure handed to the UI. Serializes as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewModel {
    Partitioned(Vec<KnownUnknownGroup>),
    Actionable(Vec<ActionableGroup>),
    Flat(Vec<PreprocessedReport>),
}

/// Build the view model for `view`.
///
/// The hostname memo is created here and dropped with the run, so repeated
/// runs on the same input produce identical output.
pub fn transform(
    raw_reports: Vec<RawReport>,
    raw_patterns: Vec<UrlPattern>,
    view: ReportView,
    progress: &dyn Progress,
) -> ViewModel {
    progress.verbose("Pre-processing URL patterns...");
    let patterns = prepare_patterns(&raw_patterns);

    progress.verbose(&format!("Pre-processing {} reports...", raw_reports.len()));
    let mut normalizer = HostnameNormalizer::new();
    let reports = preprocess(raw_reports, &patterns, &mut normalizer);
    debug!(
        reports = reports.len(),
        hosts = normalizer.len(),
        "Preprocessing finished"
    );

    match view {
        ReportView::UserReports => {
            progress.verbose("Grouping reports by root domain...");
            let mut groups = select_actionable(group_by_domain(reports));
            progress.verbose("Sorting by the total number of reports per domain...");
            sort_groups(&mut groups);
            ViewModel::Actionable(groups)
        }
        ReportView::InconsistentEntries => {
            progress.verbose("Grouping reports by root domain...");
            let mut groups = partition_known(group_by_domain(reports));
            progress.verbose("Sorting by the number of reports without a known bug...");
            sort_groups(&mut groups);
            ViewModel::Partitioned(groups)
        }
        ReportView::Classified(filter) => {
            let mut reports = filter_by_prediction(reports, filter);
            progress.verbose(&format!("Sorting {} classified reports...", reports.len()));
            sort_reports(&mut reports, filter);
            ViewModel::Flat(reports)
        }
    }
}

/// Run the pipeline and serialize the result to the JSON the UI consumes.
pub fn run(
    raw_reports: Vec<RawReport>,
    raw_patterns: Vec<UrlPattern>,
    view: ReportView,
    progress: &dyn Progress,
) -> Result<String, TriageError> {
    let model = transform(raw_reports, raw_patterns, view, progress);
    progress.verbose("Writing response...");
    Ok(serde_json::to_string(&model)?)
}
