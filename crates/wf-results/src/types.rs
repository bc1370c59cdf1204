//! Report table types.
//!
//! One row per (report time, object). All quantities are SI: meters,
//! cubic meters per second, seconds; pressures as meters of water
//! column.

use serde::{Deserialize, Serialize};

use crate::diagnostics::RunDiagnostics;
use wf_core::Real;

/// One node row of the report table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub time_s: u64,
    pub node_id: String,
    pub elevation_m: Real,
    /// Nominal demand at this time (pattern and multiplier applied).
    pub demand_m3_s: Real,
    pub head_m: Real,
    pub pressure_m: Real,
    /// Pressure-reduced delivery actually drawn at the node.
    pub consumption_m3_s: Real,
    /// Consumption over demand, in percent; 100 when demand is zero.
    pub percent_satisfied: Real,
}

/// One link row of the report table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub time_s: u64,
    pub link_id: String,
    pub length_m: Real,
    pub diameter_m: Real,
    pub flow_m3_s: Real,
    pub velocity_m_s: Real,
    pub headloss_m: Real,
    /// Unit headloss, m per 1000 m of pipe.
    pub headloss_per_1000m: Real,
    /// Darcy-Weisbach friction factor implied by the headloss.
    pub friction_factor: Real,
}

/// Complete output of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Node rows, grouped by report time in ascending order.
    pub nodes: Vec<NodeRecord>,
    /// Link rows, grouped by report time in ascending order.
    pub links: Vec<LinkRecord>,
    /// True for a zero-duration (single instant) run.
    pub single_period: bool,
    pub diagnostics: RunDiagnostics,
}

impl RunReport {
    /// Report times present in the node table, deduplicated, ascending.
    pub fn times(&self) -> Vec<u64> {
        let mut times: Vec<u64> = self.nodes.iter().map(|r| r.time_s).collect();
        times.dedup();
        times
    }

    /// Node rows for one report time.
    pub fn nodes_at(&self, time_s: u64) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter().filter(move |r| r.time_s == time_s)
    }

    /// Link rows for one report time.
    pub fn links_at(&self, time_s: u64) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter().filter(move |r| r.time_s == time_s)
    }
}
