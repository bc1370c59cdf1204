//! Network snapshot data model and parameter extraction.
//!
//! A [`Network`] is an immutable description of a water distribution
//! system: junctions with demands, tanks with storage geometry,
//! reservoirs with fixed heads, pipes with friction properties, demand
//! patterns, and solver options. [`extract`] flattens a snapshot into the
//! numeric arrays and signed incidence matrix the solver consumes.
//!
//! Parsing and writing of textual network formats is deliberately not
//! here; this crate starts from an in-memory snapshot.

pub mod builder;
pub mod error;
pub mod extract;
pub mod model;

pub use builder::NetworkBuilder;
pub use error::{NetworkError, NetworkResult};
pub use extract::{
    ExtractedModel, ExtractionWarning, Incidence, NodeKind, PdaSettings, extract, HW_COEFF,
    HW_EXPONENT,
};
pub use model::{
    HydraulicOptions, Junction, Network, Pattern, Pipe, Pump, Reservoir, Tank, TimeOptions, Valve,
};
