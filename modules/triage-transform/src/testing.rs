// Test doubles for the data-source seams.
//
// - MemorySource (ReportSource): canned rows, optional failure, optional
//   rendezvous that only releases when both queries are in flight at once
// - MemoryActionLog (ActionLog): records every write in memory
//
// Plus fixture builders for raw and preprocessed reports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::Barrier;

use triage_common::{
    ActionLog, PreprocessedReport, RawReport, ReportFields, ReportQuery, ReportSource, UrlPattern,
    WrappedValue,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A raw row with only a uuid, URL and timestamp set.
pub fn raw_report(uuid: &str, url: Option<&str>) -> RawReport {
    RawReport {
        reported_at: WrappedValue::new("2024-05-01T12:00:00"),
        url: url.map(str::to_string),
        details: None,
        fields: ReportFields {
            uuid: uuid.to_string(),
            ..ReportFields::default()
        },
    }
}

pub fn url_pattern(pattern: &str, bug: i64, title: &str) -> UrlPattern {
    UrlPattern {
        url_pattern: pattern.to_string(),
        bug,
        title: Some(title.to_string()),
        extra: Map::new(),
    }
}

/// A preprocessed report already assigned to `root_domain`.
pub fn preprocessed(uuid: &str, root_domain: &str) -> PreprocessedReport {
    PreprocessedReport {
        reported_at: "2024-05-01T12:00:00".to_string(),
        url: format!("https://{root_domain}/"),
        details: None,
        fields: ReportFields {
            uuid: uuid.to_string(),
            ..ReportFields::default()
        },
        related_bugs: Vec::new(),
        root_domain: root_domain.to_string(),
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

pub struct MemorySource {
    reports: Vec<RawReport>,
    patterns: Vec<UrlPattern>,
    report_error: Option<String>,
    delay: Option<Duration>,
    rendezvous: Option<Arc<Barrier>>,
    queries: Mutex<Vec<ReportQuery>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
            patterns: Vec::new(),
            report_error: None,
            delay: None,
            rendezvous: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reports(mut self, reports: Vec<RawReport>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<UrlPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Make the report query fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.report_error = Some(message.to_string());
        self
    }

    /// Delay both queries.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block each query until the other one is running too. A caller that
    /// issues them one after the other never gets an answer.
    pub fn with_rendezvous(mut self) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(2)));
        self
    }

    /// Every report query received so far.
    pub fn queries(&self) -> Vec<ReportQuery> {
        self.queries.lock().unwrap().clone()
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportSource for MemorySource {
    async fn reports(&self, query: &ReportQuery) -> Result<Vec<RawReport>> {
        self.queries.lock().unwrap().push(query.clone());
        self.wait().await;
        if let Some(message) = &self.report_error {
            bail!("{message}");
        }
        Ok(self.reports.clone())
    }

    async fn url_patterns(&self, _project_id: &str) -> Result<Vec<UrlPattern>> {
        self.wait().await;
        Ok(self.patterns.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryActionLog
// ---------------------------------------------------------------------------

/// Records `(report_uuid, value)` pairs for actions and labels.
#[derive(Default)]
pub struct MemoryActionLog {
    pub actions: Mutex<Vec<(String, String)>>,
    pub labels: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<(String, String)> {
        self.labels.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionLog for MemoryActionLog {
    async fn insert_action(&self, report_uuid: &str, action_type: &str) -> Result<()> {
        if self.fail {
            bail!("insert into report_actions failed");
        }
        self.actions
            .lock()
            .unwrap()
            .push((report_uuid.to_string(), action_type.to_string()));
        Ok(())
    }

    async fn insert_label(&self, report_uuid: &str, label: &str) -> Result<()> {
        if self.fail {
            bail!("insert into labels failed");
        }
        self.labels
            .lock()
            .unwrap()
            .push((report_uuid.to_string(), label.to_string()));
        Ok(())
    }
}
