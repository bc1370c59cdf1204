//! Error types for simulation runs.

use thiserror::Error;

/// Errors that abort a simulation run.
///
/// Non-converged time steps are not errors; they degrade the run and
/// surface through [`wf_results::RunDiagnostics`]. Only structural
/// problems and first-iteration solver failures abort.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("network error: {0}")]
    Network(#[from] wf_network::NetworkError),

    #[error("solver error: {0}")]
    Solver(#[from] wf_solver::SolverError),

    #[error(transparent)]
    Core(#[from] wf_core::WfError),
}

pub type SimResult<T> = Result<T, SimError>;
