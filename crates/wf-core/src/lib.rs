//! wf-core: stable foundation for waterflow.
//!
//! Contains:
//! - numeric (Real + float helpers)
//! - interp (monotone cubic interpolation over time grids)
//! - timing (wall-clock timers for solver diagnostics)
//! - error (shared error types)
//!
//! Everything in the engine works in one consistent SI unit system:
//! lengths in meters, flows in cubic meters per second, times in seconds,
//! and heads/pressures expressed as meters of water column.

pub mod error;
pub mod interp;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{WfError, WfResult};
pub use interp::MonotoneCubic;
pub use numeric::*;
pub use timing::Timer;
