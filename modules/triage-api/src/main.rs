use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bigquery_client::{BigQueryClient, TokenSource};
use triage_common::{ActionLog, AppConfig};
use triage_transform::WorkerHandle;
use triage_warehouse::Warehouse;

mod auth;
mod error;
mod rest;
mod router;

pub struct AppState {
    pub worker: WorkerHandle,
    pub actions: Arc<dyn ActionLog>,
    pub project_id: String,
    pub skip_auth: bool,
    pub write_allowlist: Option<Vec<String>>,
}

/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` from the config.
fn env_filter(rust_log: Option<&str>, log_level: &str) -> Result<EnvFilter> {
    let filter = match rust_log.filter(|v| !v.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_new(log_level)?.add_directive("tower_http=debug".parse()?),
    };
    Ok(filter)
}

fn init_tracing(config: &AppConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(rust_log.as_deref(), &config.log_level)?;
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config)?;
    config.log_keys();

    let token_source = match &config.bq_access_token {
        Some(token) => TokenSource::Static(token.clone()),
        None => TokenSource::Metadata,
    };
    let client = BigQueryClient::new(token_source).with_location(config.bq_location.clone());
    let warehouse = Arc::new(Warehouse::new(client, config.bq_project_id.clone()));

    let state = Arc::new(AppState {
        worker: WorkerHandle::spawn(warehouse.clone()),
        actions: warehouse,
        project_id: config.bq_project_id.clone(),
        skip_auth: config.skip_auth,
        write_allowlist: config.write_allowlist.clone(),
    });

    let app = router::build_router(state, &config.cors_origins);

    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    info!("Triage API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
