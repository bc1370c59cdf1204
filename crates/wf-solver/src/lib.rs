//! Pressure-driven hydraulic network solver.
//!
//! This crate is the numerical core of waterflow. For one set of boundary
//! data (junction demands, tank heads, reservoir heads) it solves the
//! coupled energy/mass system `R(q, h) = 0` with a damped Newton
//! iteration on the head-only Schur complement:
//! - [`roots`]: a small general-purpose Newton root finder with
//!   finite-difference Jacobian, used to fit the smoothing polynomials
//! - [`smoothing`]: C¹ regularization of the Hazen-Williams reduced
//!   headloss and the pressure-consumption law near their
//!   non-differentiable points
//! - [`residual`]: pure evaluators for energy/mass residuals and their
//!   analytic derivatives over an immutable per-run context
//! - [`hydraulic`]: the Newton/Schur iteration with Goldstein line
//!   search, sparse Cholesky linear solves, and explicit
//!   converged/degraded outcomes

pub mod error;
pub mod hydraulic;
pub mod residual;
pub mod roots;
pub mod smoothing;

pub use error::{SolverError, SolverResult};
pub use hydraulic::{HydraulicState, SolveOptions, SolveOutcome, SolveStats, solve_step};
pub use residual::{Boundary, RunContext};
pub use roots::{NewtonConfig, newton_root};
pub use smoothing::{FLOW_BAND, FRACTION_BAND, SmoothingPolys};
