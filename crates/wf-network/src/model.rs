//! Network snapshot types.
//!
//! All quantities are SI: meters, cubic meters per second, seconds.
//! Pressures and heads are meters of water column.

use wf_core::Real;

/// A demand node.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub id: String,
    pub elevation: Real,
    /// Nominal (fully satisfied) demand, m³/s.
    pub base_demand: Real,
    /// Demand pattern id; falls back to the options' default pattern.
    pub pattern: Option<String>,
}

/// A storage node with level-dependent head.
#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub id: String,
    pub elevation: Real,
    pub init_level: Real,
    pub min_level: Real,
    pub max_level: Real,
    /// Cylindrical tank diameter, m.
    pub diameter: Real,
}

impl Tank {
    /// Wetted cross-section area of the (cylindrical) tank, m².
    pub fn area(&self) -> Real {
        std::f64::consts::PI * self.diameter * self.diameter / 4.0
    }

    /// Hydraulic head at the initial level.
    pub fn init_head(&self) -> Real {
        self.elevation + self.init_level
    }
}

/// A fixed-head boundary node.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservoir {
    pub id: String,
    pub head: Real,
}

/// A friction link between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub id: String,
    pub start: String,
    pub end: String,
    pub length: Real,
    pub diameter: Real,
    /// Hazen-Williams roughness coefficient (dimensionless).
    pub roughness: Real,
}

impl Pipe {
    /// Flow cross-section area, m².
    pub fn area(&self) -> Real {
        std::f64::consts::PI * self.diameter * self.diameter / 4.0
    }
}

/// A pump link. Present in the snapshot for completeness; the hydraulic
/// core does not model pumps and drops them with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Pump {
    pub id: String,
    pub start: String,
    pub end: String,
}

/// A valve link. Like pumps, carried but not solved.
#[derive(Debug, Clone, PartialEq)]
pub struct Valve {
    pub id: String,
    pub start: String,
    pub end: String,
}

/// A multiplier time pattern applied to junction demands.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    pub multipliers: Vec<Real>,
}

/// Pressure-driven-analysis and demand options.
#[derive(Debug, Clone, PartialEq)]
pub struct HydraulicOptions {
    /// Global multiplier applied to every junction demand.
    pub demand_multiplier: Real,
    /// Pattern used by junctions without an explicit pattern.
    pub default_pattern: Option<String>,
    /// Pressure head below which consumption is zero, m.
    pub minimum_pressure: Real,
    /// Pressure head at which demand is fully satisfied, m.
    pub service_pressure: Real,
    /// Exponent of the consumption law between the two thresholds.
    pub pressure_exponent: Real,
}

impl Default for HydraulicOptions {
    fn default() -> Self {
        Self {
            demand_multiplier: 1.0,
            default_pattern: None,
            minimum_pressure: 0.0,
            service_pressure: 20.0,
            pressure_exponent: 0.5,
        }
    }
}

/// Simulation time grid settings, all in whole seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeOptions {
    pub duration: u64,
    pub hydraulic_timestep: u64,
    pub pattern_timestep: u64,
    pub pattern_start: u64,
    pub report_timestep: u64,
    pub report_start: u64,
    /// Clock time of simulation start, seconds past midnight.
    pub start_clocktime: u64,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            duration: 0,
            hydraulic_timestep: 3600,
            pattern_timestep: 3600,
            pattern_start: 0,
            report_timestep: 3600,
            report_start: 0,
            start_clocktime: 0,
        }
    }
}

/// An immutable network snapshot.
///
/// Construct through [`crate::NetworkBuilder`] (which enforces id
/// uniqueness) or directly from fields when the caller has already
/// validated the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    pub junctions: Vec<Junction>,
    pub tanks: Vec<Tank>,
    pub reservoirs: Vec<Reservoir>,
    pub pipes: Vec<Pipe>,
    pub pumps: Vec<Pump>,
    pub valves: Vec<Valve>,
    pub patterns: Vec<Pattern>,
    pub hydraulics: HydraulicOptions,
    pub times: TimeOptions,
}

impl Network {
    pub fn node_count(&self) -> usize {
        self.junctions.len() + self.tanks.len() + self.reservoirs.len()
    }

    pub fn link_count(&self) -> usize {
        self.pipes.len() + self.pumps.len() + self.valves.len()
    }
}

impl Default for Junction {
    fn default() -> Self {
        Self {
            id: String::new(),
            elevation: 0.0,
            base_demand: 0.0,
            pattern: None,
        }
    }
}
