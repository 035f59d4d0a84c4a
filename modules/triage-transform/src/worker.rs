//! Worker boundary between request handlers and the pipeline.
//!
//! One long-lived worker task owns the data source and takes `fetch` requests
//! from a bounded queue, one job at a time. Each request carries its own reply
//! port, so concurrent callers can never see each other's messages. A job
//! replies with zero or more `verbose` messages followed by exactly one
//! `done` or `error`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use triage_common::{ReportQuery, ReportSource, TriageError};

use crate::pipeline::{self, Progress};

/// Requests that may queue up behind the running job.
const QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Messages sent back on a request's reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Verbose { msg: String },
    Done { result: String },
    Error { error: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Verbose { .. })
    }
}

/// Sending half of a per-request reply channel.
pub type Port = mpsc::UnboundedSender<WorkerMessage>;

pub struct FetchRequest {
    pub query: ReportQuery,
    pub port: Port,
}

pub enum WorkerRequest {
    Fetch(FetchRequest),
}

/// Forwards pipeline milestones to the caller's port.
struct PortProgress {
    port: Port,
}

impl Progress for PortProgress {
    fn verbose(&self, msg: &str) {
        // A closed port means the caller gave up; the job still finishes.
        let _ = self.port.send(WorkerMessage::Verbose {
            msg: msg.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the worker; shared by every request handler.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    /// Start the worker task on the current runtime.
    pub fn spawn(source: Arc<dyn ReportSource>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_worker(source, rx));
        Self { tx }
    }

    /// Queue a fetch and return the receiving end of its private reply port.
    pub async fn submit(
        &self,
        query: ReportQuery,
    ) -> Result<mpsc::UnboundedReceiver<WorkerMessage>, TriageError> {
        let (port, rx) = mpsc::unbounded_channel();
        self.tx
            .send(WorkerRequest::Fetch(FetchRequest { query, port }))
            .await
            .map_err(|_| TriageError::Worker("report worker has shut down".to_string()))?;
        Ok(rx)
    }

    /// Submit a fetch and wait for its terminal message, logging progress on the way.
    pub async fn fetch(&self, query: ReportQuery) -> Result<String, TriageError> {
        let view = query.view;
        let mut rx = self.submit(query).await?;
        while let Some(msg) = rx.recv().await {
            match msg {
                WorkerMessage::Verbose { msg } => debug!(%view, "{msg}"),
                WorkerMessage::Done { result } => return Ok(result),
                WorkerMessage::Error { error } => return Err(TriageError::Upstream(error)),
            }
        }
        Err(TriageError::Worker(
            "report worker dropped the reply port without a result".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn run_worker(source: Arc<dyn ReportSource>, mut rx: mpsc::Receiver<WorkerRequest>) {
    info!("Report worker started");
    while let Some(request) = rx.recv().await {
        match request {
            WorkerRequest::Fetch(job) => handle_fetch(source.as_ref(), job).await,
        }
    }
    info!("Report worker stopped");
}

/// Run one job to completion and send its terminal message.
pub async fn handle_fetch(source: &dyn ReportSource, job: FetchRequest) {
    let FetchRequest { query, port } = job;
    let view = query.view;

    let terminal = match fetch_and_transform(source, query, port.clone()).await {
        Ok(result) => WorkerMessage::Done { result },
        Err(e) => {
            warn!(%view, error = %e, "Report job failed");
            WorkerMessage::Error {
                error: error_message(&e),
            }
        }
    };

    if port.send(terminal).is_err() {
        debug!(%view, "Caller went away before the report job finished");
    }
}

async fn fetch_and_transform(
    source: &dyn ReportSource,
    query: ReportQuery,
    port: Port,
) -> Result<String, TriageError> {
    let progress = PortProgress { port };

    // Both queries have a noticeable fixed latency, so run them side by side.
    progress.verbose("Starting queries...");
    let (raw_reports, raw_patterns) =
        tokio::try_join!(source.reports(&query), source.url_patterns(&query.project_id))
            .map_err(|e| TriageError::Upstream(format!("{e:#}")))?;
    progress.verbose(&format!(
        "Received {} user reports and {} URL patterns.",
        raw_reports.len(),
        raw_patterns.len()
    ));

    let view = query.view;
    tokio::task::spawn_blocking(move || {
        pipeline::run(raw_reports, raw_patterns, view, &progress)
    })
    .await
    .map_err(|e| TriageError::Worker(format!("transform task failed: {e}")))?
}

/// Text for the `error` message; upstream causes are passed through bare so
/// the caller does not wrap them twice.
fn error_message(err: &TriageError) -> String {
    match err {
        TriageError::Upstream(cause) => cause.clone(),
        other => other.to_string(),
    }
}
