use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Warehouse error: {0}")]
    Upstream(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TriageError {
    /// True for errors caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TriageError::Validation(_))
    }
}
