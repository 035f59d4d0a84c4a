//! Ordering of domain groups and of flat report lists.
//!
//! All sorts are stable: entries that compare equal keep the order grouping
//! produced them in.

use std::cmp::Ordering;

use triage_common::{Prediction, PredictionFilter, PreprocessedReport, ReportFields};

use crate::grouping::{ActionableGroup, KnownUnknownGroup};

// ---------------------------------------------------------------------------
// Domain groups
// ---------------------------------------------------------------------------

/// Key a group view is ranked by; larger keys sort first.
pub trait GroupRank {
    fn rank_key(&self) -> usize;
}

impl GroupRank for KnownUnknownGroup {
    /// Domains with the most reports not yet tied to a bug come first.
    fn rank_key(&self) -> usize {
        self.unknown_reports.len()
    }
}

impl GroupRank for ActionableGroup {
    /// Total reports for the domain, not the size of the worklist.
    fn rank_key(&self) -> usize {
        self.reports_count
    }
}

pub fn sort_groups<G: GroupRank>(groups: &mut [G]) {
    groups.sort_by(|a, b| b.rank_key().cmp(&a.rank_key()));
}

// ---------------------------------------------------------------------------
// Flat report lists
// ---------------------------------------------------------------------------

/// Comparator for the classified-reports list, chosen by the active filter.
///
/// The single-prediction cases sort ascending by probability whichever
/// prediction is selected; this matches the ordering the view has always had
/// and is kept on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrder {
    /// Filter `valid`: probability ascending.
    ValidOnly,
    /// Filter `invalid`: probability ascending.
    InvalidOnly,
    /// No filter: `valid` first (probability descending), then `invalid`
    /// (probability ascending), then anything else (probability ascending).
    All,
}

impl ReportOrder {
    pub fn for_filter(filter: PredictionFilter) -> Self {
        match filter {
            PredictionFilter::Valid => ReportOrder::ValidOnly,
            PredictionFilter::Invalid => ReportOrder::InvalidOnly,
            PredictionFilter::All => ReportOrder::All,
        }
    }

    pub fn compare(self, a: &ReportFields, b: &ReportFields) -> Ordering {
        match self {
            ReportOrder::ValidOnly => a.probability().total_cmp(&b.probability()),
            ReportOrder::InvalidOnly => a.probability().total_cmp(&b.probability()),
            ReportOrder::All => {
                let (rank_a, rank_b) = (prediction_rank(a), prediction_rank(b));
                if rank_a != rank_b {
                    return rank_a.cmp(&rank_b);
                }
                if a.is_predicted(Prediction::Valid) {
                    b.probability().total_cmp(&a.probability())
                } else {
                    a.probability().total_cmp(&b.probability())
                }
            }
        }
    }
}

fn prediction_rank(fields: &ReportFields) -> u8 {
    match fields.prediction {
        Some(Prediction::Valid) => 0,
        Some(Prediction::Invalid) => 1,
        _ => 2,
    }
}

pub fn sort_reports(reports: &mut [PreprocessedReport], filter: PredictionFilter) {
    let order = ReportOrder::for_filter(filter);
    reports.sort_by(|a, b| order.compare(&a.fields, &b.fields));
}
