//! Extended-period simulation driver.
//!
//! Ties the pieces together: extract a network snapshot, build the
//! per-run context and demand schedule, walk the hydraulic time grid
//! with tank integration, and resample onto the reporting grid.
//!
//! - [`demand`]: per-junction demand curves from patterns
//! - [`tank`]: tank level dynamics (Heun predictor/corrector)
//! - [`eps`]: the causal hydraulic-grid loop
//! - [`report`]: reporting-grid resampling and table construction

pub mod demand;
pub mod eps;
pub mod error;
pub mod report;
pub mod tank;

pub use demand::DemandSchedule;
pub use eps::{HydraulicRun, SimOptions, run_hydraulics};
pub use error::{SimError, SimResult};
pub use report::build_report;

use wf_core::Timer;
use wf_network::{Network, extract};
use wf_results::RunReport;
use wf_solver::RunContext;

/// Run a full extended-period simulation for one network snapshot.
///
/// All per-run state (incidence matrix, regularization polynomials,
/// demand interpolators) is built fresh here and dropped on return, so
/// independent runs can execute concurrently with no shared state.
pub fn run_simulation(network: &Network, options: &SimOptions) -> SimResult<RunReport> {
    let timer = Timer::start();
    let model = extract(network)?;
    let ctx = RunContext::new(&model)?;
    let schedule = DemandSchedule::new(&model)?;
    let run = run_hydraulics(&ctx, &schedule, options)?;
    let mut report = build_report(&ctx, &schedule, &run, options)?;
    report.diagnostics.total_elapsed_s = timer.elapsed_s();
    Ok(report)
}
