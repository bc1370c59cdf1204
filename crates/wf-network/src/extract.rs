//! Topology and parameter extraction.
//!
//! Flattens an immutable [`Network`] snapshot into the numeric vectors
//! and the signed incidence matrix the hydraulic solver consumes. The
//! result is a pure function of the snapshot: extracting twice yields
//! bit-identical arrays.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{DMatrix, DMatrixView, DVector};
use tracing::warn;

use crate::error::{NetworkError, NetworkResult};
use crate::model::Network;
use wf_core::Real;

/// Hazen-Williams headloss exponent.
pub const HW_EXPONENT: Real = 1.852;
/// Hazen-Williams resistance coefficient for SI units (m, m³/s).
pub const HW_COEFF: Real = 10.667;

/// Node category, driving which incidence row block and which head rule
/// (solved, integrated, fixed) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Junction,
    Tank,
    Reservoir,
}

/// Signed node-by-pipe incidence matrix.
///
/// Rows are ordered junctions-then-tanks-then-reservoirs; the entry is
/// +1 if the pipe points away from the node and -1 if toward it. Built
/// once per run and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Incidence {
    matrix: DMatrix<Real>,
    n_junctions: usize,
    n_tanks: usize,
    n_reservoirs: usize,
}

impl Incidence {
    pub fn full(&self) -> &DMatrix<Real> {
        &self.matrix
    }

    /// Junction row block.
    pub fn reduced_to_junctions(&self) -> DMatrixView<'_, Real> {
        self.matrix.rows(0, self.n_junctions)
    }

    /// Tank row block.
    pub fn reduced_to_tanks(&self) -> DMatrixView<'_, Real> {
        self.matrix.rows(self.n_junctions, self.n_tanks)
    }

    /// Reservoir row block.
    pub fn reduced_to_reservoirs(&self) -> DMatrixView<'_, Real> {
        self.matrix
            .rows(self.n_junctions + self.n_tanks, self.n_reservoirs)
    }

    pub fn n_pipes(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Pressure-driven-analysis thresholds, copied out of the options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdaSettings {
    pub minimum_pressure: Real,
    pub service_pressure: Real,
    pub exponent: Real,
}

/// Non-fatal findings during extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionWarning {
    /// A pump or valve was dropped from the incidence matrix; the solver
    /// only models pipes.
    UnsupportedLinkType { link: String, kind: &'static str },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionWarning::UnsupportedLinkType { link, kind } => {
                write!(f, "{kind} '{link}' is not modeled and was dropped")
            }
        }
    }
}

/// Flat numeric view of a network snapshot.
///
/// Node indexing is global: junctions occupy `0..n_junctions`, tanks the
/// next `n_tanks` slots, reservoirs the rest. `pipe_endpoints` uses this
/// global numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedModel {
    pub junction_ids: Vec<String>,
    pub tank_ids: Vec<String>,
    pub reservoir_ids: Vec<String>,
    pub pipe_ids: Vec<String>,

    // Per junction
    pub elevations: DVector<Real>,
    pub base_demands: DVector<Real>,
    /// Pattern index per junction (into `patterns`), already defaulted.
    pub demand_patterns: Vec<Option<usize>>,

    // Per pipe
    pub pipe_lengths: DVector<Real>,
    pub pipe_diameters: DVector<Real>,
    pub pipe_roughness: DVector<Real>,
    /// Full Hazen-Williams resistance `f·L` per pipe.
    pub pipe_resistances: DVector<Real>,
    /// (start, end) global node indices per pipe.
    pub pipe_endpoints: Vec<(usize, usize)>,

    // Per tank
    pub tank_elevations: DVector<Real>,
    pub tank_init_levels: DVector<Real>,
    pub tank_min_levels: DVector<Real>,
    pub tank_max_levels: DVector<Real>,
    pub tank_areas: DVector<Real>,

    // Per reservoir
    pub reservoir_heads: DVector<Real>,

    pub incidence: Incidence,

    // Patterns, copied for self-containment.
    pub patterns: Vec<Vec<Real>>,

    // Derived scalars
    pub duration_s: u64,
    pub hydraulic_step_s: u64,
    pub pattern_step_s: u64,
    pub pattern_start_s: u64,
    pub report_step_s: u64,
    pub report_start_s: u64,
    pub demand_multiplier: Real,
    pub pda: PdaSettings,

    pub warnings: Vec<ExtractionWarning>,
}

impl ExtractedModel {
    pub fn n_junctions(&self) -> usize {
        self.junction_ids.len()
    }

    pub fn n_tanks(&self) -> usize {
        self.tank_ids.len()
    }

    pub fn n_reservoirs(&self) -> usize {
        self.reservoir_ids.len()
    }

    pub fn n_pipes(&self) -> usize {
        self.pipe_ids.len()
    }

    /// Node kind and category-local index for a global node index.
    pub fn node_kind(&self, global: usize) -> (NodeKind, usize) {
        let nj = self.n_junctions();
        let nt = self.n_tanks();
        if global < nj {
            (NodeKind::Junction, global)
        } else if global < nj + nt {
            (NodeKind::Tank, global - nj)
        } else {
            (NodeKind::Reservoir, global - nj - nt)
        }
    }

    /// Hydraulic time grid: multiples of the hydraulic timestep plus the
    /// final instant. A zero duration yields the single instant 0.
    pub fn hydraulic_times(&self) -> Vec<u64> {
        time_grid(0, self.hydraulic_step_s, self.duration_s)
    }

    /// Reporting time grid, offset by the report start.
    pub fn report_times(&self) -> Vec<u64> {
        time_grid(self.report_start_s, self.report_step_s, self.duration_s)
    }

    /// Whether this is a single-instant (non-extended-period) run.
    pub fn single_period(&self) -> bool {
        self.duration_s == 0
    }
}

fn time_grid(start: u64, step: u64, end: u64) -> Vec<u64> {
    let mut times = Vec::new();
    let mut t = start;
    while t < end {
        times.push(t);
        t += step;
    }
    times.push(end.max(start));
    times
}

/// Extract flat parameter vectors and the incidence matrix from a
/// snapshot.
///
/// Fails with [`NetworkError::MissingComponent`] if any link endpoint is
/// undefined. Pumps and valves are dropped from the incidence matrix with
/// an [`ExtractionWarning::UnsupportedLinkType`].
pub fn extract(network: &Network) -> NetworkResult<ExtractedModel> {
    let nj = network.junctions.len();
    let nt = network.tanks.len();
    let nr = network.reservoirs.len();
    let np = network.pipes.len();

    // Global node numbering: junctions, then tanks, then reservoirs.
    let mut node_index: HashMap<&str, usize> = HashMap::with_capacity(nj + nt + nr);
    for (i, junction) in network.junctions.iter().enumerate() {
        node_index.insert(junction.id.as_str(), i);
    }
    for (i, tank) in network.tanks.iter().enumerate() {
        node_index.insert(tank.id.as_str(), nj + i);
    }
    for (i, reservoir) in network.reservoirs.iter().enumerate() {
        node_index.insert(reservoir.id.as_str(), nj + nt + i);
    }

    let resolve = |link: &str, node: &str| -> NetworkResult<usize> {
        node_index
            .get(node)
            .copied()
            .ok_or_else(|| NetworkError::MissingComponent {
                link: link.to_owned(),
                node: node.to_owned(),
            })
    };

    // Resolve every link endpoint, including dropped pumps/valves, so a
    // dangling reference is always fatal rather than silently ignored.
    let mut pipe_endpoints = Vec::with_capacity(np);
    for pipe in &network.pipes {
        let start = resolve(&pipe.id, &pipe.start)?;
        let end = resolve(&pipe.id, &pipe.end)?;
        pipe_endpoints.push((start, end));
    }
    let mut warnings = Vec::new();
    for pump in &network.pumps {
        resolve(&pump.id, &pump.start)?;
        resolve(&pump.id, &pump.end)?;
        warnings.push(ExtractionWarning::UnsupportedLinkType {
            link: pump.id.clone(),
            kind: "pump",
        });
    }
    for valve in &network.valves {
        resolve(&valve.id, &valve.start)?;
        resolve(&valve.id, &valve.end)?;
        warnings.push(ExtractionWarning::UnsupportedLinkType {
            link: valve.id.clone(),
            kind: "valve",
        });
    }
    for warning in &warnings {
        warn!("{warning}");
    }

    // Signed incidence: +1 leaving the node, -1 entering, pipes only.
    let mut matrix = DMatrix::zeros(nj + nt + nr, np);
    for (p, &(start, end)) in pipe_endpoints.iter().enumerate() {
        matrix[(start, p)] = 1.0;
        matrix[(end, p)] = -1.0;
    }

    // Pattern lookup; junctions without a pattern use the default one.
    let pattern_index: HashMap<&str, usize> = network
        .patterns
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();
    let default_pattern = network
        .hydraulics
        .default_pattern
        .as_deref()
        .and_then(|id| pattern_index.get(id).copied());
    let mut demand_patterns = Vec::with_capacity(nj);
    for junction in &network.junctions {
        let idx = match &junction.pattern {
            Some(id) => Some(pattern_index.get(id.as_str()).copied().ok_or_else(|| {
                NetworkError::MissingPattern {
                    junction: junction.id.clone(),
                    pattern: id.clone(),
                }
            })?),
            None => default_pattern,
        };
        demand_patterns.push(idx);
    }

    let pipe_resistances = DVector::from_iterator(
        np,
        network.pipes.iter().map(|pipe| {
            HW_COEFF
                * pipe.roughness.powf(-HW_EXPONENT)
                * pipe.diameter.powf(-4.871)
                * pipe.length
        }),
    );

    let times = &network.times;
    Ok(ExtractedModel {
        junction_ids: network.junctions.iter().map(|j| j.id.clone()).collect(),
        tank_ids: network.tanks.iter().map(|t| t.id.clone()).collect(),
        reservoir_ids: network.reservoirs.iter().map(|r| r.id.clone()).collect(),
        pipe_ids: network.pipes.iter().map(|p| p.id.clone()).collect(),

        elevations: DVector::from_iterator(nj, network.junctions.iter().map(|j| j.elevation)),
        base_demands: DVector::from_iterator(nj, network.junctions.iter().map(|j| j.base_demand)),
        demand_patterns,

        pipe_lengths: DVector::from_iterator(np, network.pipes.iter().map(|p| p.length)),
        pipe_diameters: DVector::from_iterator(np, network.pipes.iter().map(|p| p.diameter)),
        pipe_roughness: DVector::from_iterator(np, network.pipes.iter().map(|p| p.roughness)),
        pipe_resistances,
        pipe_endpoints,

        tank_elevations: DVector::from_iterator(nt, network.tanks.iter().map(|t| t.elevation)),
        tank_init_levels: DVector::from_iterator(nt, network.tanks.iter().map(|t| t.init_level)),
        tank_min_levels: DVector::from_iterator(nt, network.tanks.iter().map(|t| t.min_level)),
        tank_max_levels: DVector::from_iterator(nt, network.tanks.iter().map(|t| t.max_level)),
        tank_areas: DVector::from_iterator(nt, network.tanks.iter().map(|t| t.area())),

        reservoir_heads: DVector::from_iterator(nr, network.reservoirs.iter().map(|r| r.head)),

        incidence: Incidence {
            matrix,
            n_junctions: nj,
            n_tanks: nt,
            n_reservoirs: nr,
        },

        patterns: network
            .patterns
            .iter()
            .map(|p| p.multipliers.clone())
            .collect(),

        duration_s: times.duration,
        hydraulic_step_s: times.hydraulic_timestep,
        pattern_step_s: times.pattern_timestep,
        pattern_start_s: times.pattern_start,
        report_step_s: times.report_timestep,
        report_start_s: times.report_start,
        demand_multiplier: network.hydraulics.demand_multiplier,
        pda: PdaSettings {
            minimum_pressure: network.hydraulics.minimum_pressure,
            service_pressure: network.hydraulics.service_pressure,
            exponent: network.hydraulics.pressure_exponent,
        },

        warnings,
    })
}
