pub mod grouping;
pub mod hostname;
pub mod patterns;
pub mod pipeline;
pub mod preprocess;
pub mod ranking;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use pipeline::{run, transform, Progress, ViewModel};
pub use worker::{WorkerHandle, WorkerMessage};
