use thiserror::Error;

pub type Result<T> = std::result::Result<T, BigQueryError>;

#[derive(Debug, Error)]
pub enum BigQueryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Auth error: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for BigQueryError {
    fn from(err: reqwest::Error) -> Self {
        BigQueryError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for BigQueryError {
    fn from(err: serde_json::Error) -> Self {
        BigQueryError::Parse(err.to_string())
    }
}
