//! wf-results: report tables and run storage.
//!
//! A simulation run produces a [`RunReport`]: per-node and per-link
//! tables sampled on the reporting grid, plus solver diagnostics. This
//! crate owns those types and a small JSON store for persisting them.

pub mod diagnostics;
pub mod store;
pub mod types;

pub use diagnostics::{RunDiagnostics, StepDiagnostics};
pub use store::ReportStore;
pub use types::{LinkRecord, NodeRecord, RunReport};

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report not found: {name}")]
    ReportNotFound { name: String },
}
