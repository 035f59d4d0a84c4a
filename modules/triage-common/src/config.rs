use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Warehouse
    pub bq_project_id: String,
    pub bq_access_token: Option<String>,
    pub bq_location: Option<String>,

    // Web server
    pub listen_host: String,
    pub listen_port: u16,

    // Logging
    pub log_level: String,
    pub log_json: bool,

    // Write access
    pub skip_auth: bool,
    /// `None` when MOZLDAP_STATE_ACCESS is unset; every write is refused then.
    pub write_allowlist: Option<Vec<String>>,

    // CORS
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut cors_origins: Vec<String> = std::env::var("FRONTEND_WEB_ROOT")
            .ok()
            .into_iter()
            .collect();
        cors_origins.extend(split_list(
            &std::env::var("ADDITIONAL_CORS_ORIGINS").unwrap_or_default(),
        ));
        for origin in &mut cors_origins {
            *origin = origin.to_lowercase();
        }

        let config = Self {
            bq_project_id: std::env::var("BQ_PROJECT_ID").context("BQ_PROJECT_ID is required")?,
            bq_access_token: std::env::var("BQ_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            bq_location: std::env::var("BQ_LOCATION").ok().filter(|l| !l.is_empty()),
            listen_host: std::env::var("LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            listen_port: std::env::var("LISTEN_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("LISTEN_PORT must be a number")?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: std::env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            skip_auth: std::env::var("SKIP_AUTH")
                .map(|v| v == "true")
                .unwrap_or(false),
            write_allowlist: std::env::var("MOZLDAP_STATE_ACCESS")
                .ok()
                .map(|v| split_list(&v)),
            cors_origins,
        };

        Ok(config)
    }

    /// Log the loaded configuration with secrets reduced to a short preview.
    pub fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  BQ_PROJECT_ID: {}", self.bq_project_id);
        tracing::info!(
            "  BQ_ACCESS_TOKEN: {}",
            self.bq_access_token
                .as_deref()
                .map(preview)
                .unwrap_or_else(|| "<metadata server>".to_string())
        );
        tracing::info!("  LISTEN: {}:{}", self.listen_host, self.listen_port);
        tracing::info!("  SKIP_AUTH: {}", self.skip_auth);
        match &self.write_allowlist {
            Some(list) => tracing::info!("  MOZLDAP_STATE_ACCESS: {} entries", list.len()),
            None => tracing::info!("  MOZLDAP_STATE_ACCESS: <not set>"),
        }
        tracing::info!("  CORS origins: {:?}", self.cors_origins);
    }
}

/// First five characters of a secret plus its length.
fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{}...({} chars)", head, val.chars().count())
}

/// Split a comma-separated env value, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
