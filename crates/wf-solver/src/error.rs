//! Error types for solver operations.

use thiserror::Error;

/// Errors that can occur during a hydraulic solve.
///
/// Only fatal conditions are errors. A Newton iteration that fails after
/// at least one successful update is not an error; it degrades into
/// [`crate::SolveOutcome::Degraded`] so callers cannot lose the last
/// iterate by accident.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Newton diverged at the very first iteration of a time step; there
    /// is no fallback iterate. The condition number of the Schur matrix
    /// is attached for diagnosis.
    #[error("Newton diverged at first iteration: {what} (Schur condition number {condition:.3e})")]
    FirstIterationDiverged { what: String, condition: f64 },

    /// The Schur matrix could not be factorized.
    #[error("Schur matrix factorization failed: {what}")]
    Singular { what: String },

    /// The damped line search exhausted its correction budget.
    #[error("Line search failed after {corrections} step halvings")]
    DampingFailed { corrections: usize },

    /// The Newton direction was not a descent direction for the
    /// weighted-least-squares objective.
    #[error("Newton step is not a descent direction")]
    NoDescent,

    /// A regularization polynomial fit did not converge.
    #[error("Root finding failed: {what}")]
    RootFind { what: String },

    #[error("Non-finite value encountered in {what}")]
    NonFinite { what: &'static str },
}

pub type SolverResult<T> = Result<T, SolverError>;
