use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TriageError;

/// Sentinel bucket for reports whose hostname has no registrable domain.
pub const UNKNOWN_DOMAIN: &str = "[unknown]";

// --- Warehouse rows ---

/// The warehouse driver hands temporal columns back as `{"value": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedValue {
    pub value: String,
}

impl WrappedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// ML classification attached to a report.
///
/// Labels other than `valid`/`invalid` are kept verbatim so they serialize
/// back exactly as the warehouse returned them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Prediction {
    Valid,
    Invalid,
    Other(String),
}

impl From<String> for Prediction {
    fn from(label: String) -> Self {
        match label.as_str() {
            "valid" => Prediction::Valid,
            "invalid" => Prediction::Invalid,
            _ => Prediction::Other(label),
        }
    }
}

impl From<Prediction> for String {
    fn from(prediction: Prediction) -> Self {
        match prediction {
            Prediction::Valid => "valid".to_string(),
            Prediction::Invalid => "invalid".to_string(),
            Prediction::Other(label) => label,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Valid => write!(f, "valid"),
            Prediction::Invalid => write!(f, "invalid"),
            Prediction::Other(label) => write!(f, "{label}"),
        }
    }
}

/// Report columns that pass through the pipeline untouched.
///
/// Columns not modelled here are kept in `extra` so that schema additions in
/// the warehouse show up in the response without a code change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFields {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub app_channel: Option<String>,
    #[serde(default)]
    pub app_major_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub ua_string: Option<String>,
    #[serde(default)]
    pub breakage_category: Option<String>,
    #[serde(default)]
    pub tp_status: Option<String>,
    #[serde(default)]
    pub translated_comments: Option<String>,
    #[serde(default)]
    pub translated_from: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub prob: Option<f64>,
    #[serde(default)]
    pub has_actions: Option<bool>,
    /// Type of the most recent moderation action, where the query joins it.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReportFields {
    /// Whether a moderation action has been recorded against this report.
    pub fn is_actioned(&self) -> bool {
        self.has_actions.unwrap_or_else(|| self.action.is_some())
    }

    pub fn has_comment(&self) -> bool {
        self.comments.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn is_predicted(&self, prediction: Prediction) -> bool {
        self.prediction == Some(prediction)
    }

    /// Probability used for ordering; a missing value orders as zero.
    pub fn probability(&self) -> f64 {
        self.prob.unwrap_or(0.0)
    }
}

/// One row of the report query, exactly as the warehouse returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub reported_at: WrappedValue,
    #[serde(default)]
    pub url: Option<String>,
    /// Some report tables store a JSON document as a string.
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(flatten)]
    pub fields: ReportFields,
}

/// Knowledge-base row linking a URL substring to a tracking bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub url_pattern: String,
    pub bug: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedBug {
    pub number: i64,
    pub title: Option<String>,
}

/// A report after preprocessing: timestamp unwrapped, nested JSON decoded,
/// related bugs and root domain attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessedReport {
    pub reported_at: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(flatten)]
    pub fields: ReportFields,
    pub related_bugs: Vec<RelatedBug>,
    pub root_domain: String,
}

impl PreprocessedReport {
    pub fn is_known(&self) -> bool {
        !self.related_bugs.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Request parameters ---

/// Which ML prediction the classified view is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionFilter {
    #[default]
    All,
    Valid,
    Invalid,
}

impl PredictionFilter {
    /// Parse the `prediction` query parameter. Absent, empty and `all` mean no restriction.
    pub fn parse(raw: Option<&str>) -> Result<Self, TriageError> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Ok(PredictionFilter::All),
            Some("valid") => Ok(PredictionFilter::Valid),
            Some("invalid") => Ok(PredictionFilter::Invalid),
            Some(other) => Err(TriageError::Validation(format!(
                "unsupported `prediction` value: {other}"
            ))),
        }
    }

    pub fn prediction(self) -> Option<Prediction> {
        match self {
            PredictionFilter::All => None,
            PredictionFilter::Valid => Some(Prediction::Valid),
            PredictionFilter::Invalid => Some(Prediction::Invalid),
        }
    }

    pub fn admits(self, fields: &ReportFields) -> bool {
        match self.prediction() {
            None => true,
            Some(p) => fields.is_predicted(p),
        }
    }
}

impl fmt::Display for PredictionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionFilter::All => write!(f, "all"),
            PredictionFilter::Valid => write!(f, "valid"),
            PredictionFilter::Invalid => write!(f, "invalid"),
        }
    }
}

/// The dashboard views served by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    /// Per-domain top-N actionable reports.
    UserReports,
    /// Per-domain split into reports with and without a known bug.
    InconsistentEntries,
    /// Flat list ordered by ML prediction.
    Classified(PredictionFilter),
}

impl fmt::Display for ReportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportView::UserReports => write!(f, "user_reports"),
            ReportView::InconsistentEntries => write!(f, "inconsistent_entries"),
            ReportView::Classified(filter) => write!(f, "classified_reports({filter})"),
        }
    }
}

/// Everything the data source needs to select the rows for one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub project_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub view: ReportView,
}

impl ReportQuery {
    /// Validate the raw `from`/`to` query parameters and build a query.
    pub fn parse(
        project_id: &str,
        from: Option<&str>,
        to: Option<&str>,
        view: ReportView,
    ) -> Result<Self, TriageError> {
        let (Some(from), Some(to)) = (from, to) else {
            return Err(TriageError::Validation(
                "`from` and `to` query parameters required".to_string(),
            ));
        };
        Ok(Self {
            project_id: project_id.to_string(),
            from: parse_date("from", from)?,
            to: parse_date("to", to)?,
            view,
        })
    }

    /// Exclusive upper bound of the submission window: the day after `to`.
    pub fn window_end(&self) -> NaiveDate {
        self.to.checked_add_days(Days::new(1)).unwrap_or(self.to)
    }
}

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate, TriageError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| TriageError::Validation(format!("`{name}` must be a YYYY-MM-DD date")))
}
