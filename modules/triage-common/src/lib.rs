pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use error::TriageError;
pub use source::{ActionLog, ReportSource};
pub use types::*;
