//! Residual evaluation for the hydraulic system.
//!
//! Pure functions over an immutable per-run context: given trial flows
//! and junction heads plus the current boundary data, they return the
//! per-pipe energy residual and per-junction mass residual whose common
//! root the Newton solver seeks.

use nalgebra::DVector;
use tracing::warn;

use crate::error::SolverResult;
use crate::smoothing::SmoothingPolys;
use wf_core::Real;
use wf_network::{ExtractedModel, HW_EXPONENT, NodeKind};

/// Boundary data for one hydraulic time step.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Per-junction demand at the current time, global multiplier already
    /// applied, m³/s.
    pub demands: DVector<Real>,
    /// Per-tank head, m.
    pub tank_heads: DVector<Real>,
    /// Per-reservoir head, m.
    pub reservoir_heads: DVector<Real>,
}

/// Immutable per-run context shared by every Newton iteration and every
/// time step. Holding all run-scoped scalars here (rather than in any
/// shared mutable state) is what makes independent runs trivially
/// parallelizable by callers.
pub struct RunContext<'a> {
    pub model: &'a ExtractedModel,
    pub smoothing: SmoothingPolys,
}

impl<'a> RunContext<'a> {
    /// Build the context, fitting the regularization polynomials once.
    pub fn new(model: &'a ExtractedModel) -> SolverResult<Self> {
        let smoothing = SmoothingPolys::build(HW_EXPONENT, model.pda.exponent)?;
        Ok(Self { model, smoothing })
    }

    /// Head at a global node index: solved for junctions, boundary data
    /// for tanks and reservoirs.
    pub fn head_at(&self, global: usize, h: &DVector<Real>, boundary: &Boundary) -> Real {
        match self.model.node_kind(global) {
            (NodeKind::Junction, i) => h[i],
            (NodeKind::Tank, i) => boundary.tank_heads[i],
            (NodeKind::Reservoir, i) => boundary.reservoir_heads[i],
        }
    }

    /// Normalized position of the junction's pressure head between the
    /// minimum and service thresholds.
    pub fn pressure_fraction(&self, head: Real, elevation: Real) -> Real {
        let pda = &self.model.pda;
        (head - elevation - pda.minimum_pressure) / (pda.service_pressure - pda.minimum_pressure)
    }

    /// Pressure-dependent consumption per junction, m³/s.
    ///
    /// Negative values cannot come out of the solver itself (the
    /// regularized fraction is non-negative); they can appear when this
    /// is evaluated on heads interpolated across reporting grids, and are
    /// clamped to zero with a warning.
    pub fn consumption(&self, h: &DVector<Real>, boundary: &Boundary) -> DVector<Real> {
        let model = self.model;
        DVector::from_fn(model.n_junctions(), |i, _| {
            let z = self.pressure_fraction(h[i], model.elevations[i]);
            let c = boundary.demands[i] * self.smoothing.consumption_fraction(z);
            if c < 0.0 {
                warn!(
                    junction = model.junction_ids[i].as_str(),
                    consumption = c,
                    "negative consumption clamped to zero"
                );
                0.0
            } else {
                c
            }
        })
    }

    /// Friction headloss along pipe `p` at flow `q`, m (signed).
    pub fn headloss(&self, p: usize, q: Real) -> Real {
        self.model.pipe_resistances[p] * self.smoothing.reduced_headloss(q)
    }

    /// Per-pipe energy residual: friction headloss minus the head drop
    /// implied by the current node heads.
    pub fn energy_residuals(
        &self,
        q: &DVector<Real>,
        h: &DVector<Real>,
        boundary: &Boundary,
    ) -> DVector<Real> {
        DVector::from_fn(self.model.n_pipes(), |p, _| {
            let (start, end) = self.model.pipe_endpoints[p];
            let head_drop = self.head_at(start, h, boundary) - self.head_at(end, h, boundary);
            self.headloss(p, q[p]) - head_drop
        })
    }

    /// Per-junction mass residual: net inflow minus consumption.
    pub fn mass_residuals(
        &self,
        q: &DVector<Real>,
        h: &DVector<Real>,
        boundary: &Boundary,
    ) -> DVector<Real> {
        let model = self.model;
        let nj = model.n_junctions();
        let mut mass = self.consumption(h, boundary);
        mass.neg_mut();
        // -(incidence row)·flows: +q entering the junction, -q leaving.
        for (p, &(start, end)) in model.pipe_endpoints.iter().enumerate() {
            if start < nj {
                mass[start] -= q[p];
            }
            if end < nj {
                mass[end] += q[p];
            }
        }
        mass
    }

    /// Concatenated residual vector, energy rows then mass rows. This is
    /// the root of the nonlinear system `R(q, h) = 0`.
    pub fn residuals(
        &self,
        q: &DVector<Real>,
        h: &DVector<Real>,
        boundary: &Boundary,
    ) -> DVector<Real> {
        let energy = self.energy_residuals(q, h, boundary);
        let mass = self.mass_residuals(q, h, boundary);
        let mut all = DVector::zeros(energy.len() + mass.len());
        all.rows_mut(0, energy.len()).copy_from(&energy);
        all.rows_mut(energy.len(), mass.len()).copy_from(&mass);
        all
    }

    /// d(friction headloss)/dq per pipe. Strictly positive.
    pub fn d_headloss_dq(&self, q: &DVector<Real>) -> DVector<Real> {
        DVector::from_fn(self.model.n_pipes(), |p, _| {
            self.model.pipe_resistances[p] * self.smoothing.d_reduced_headloss(q[p])
        })
    }

    /// d(consumption)/dh per junction. Non-negative.
    pub fn d_consumption_dh(&self, h: &DVector<Real>, boundary: &Boundary) -> DVector<Real> {
        let model = self.model;
        let pda = &model.pda;
        let scale = 1.0 / (pda.service_pressure - pda.minimum_pressure);
        DVector::from_fn(model.n_junctions(), |i, _| {
            let z = self.pressure_fraction(h[i], model.elevations[i]);
            boundary.demands[i] * self.smoothing.d_consumption_fraction(z) * scale
        })
    }

    /// Boundary data with demands at full nominal value and tank heads at
    /// their initial levels. The starting point of every run.
    pub fn initial_boundary(&self) -> Boundary {
        let model = self.model;
        Boundary {
            demands: &model.base_demands * model.demand_multiplier,
            tank_heads: &model.tank_elevations + &model.tank_init_levels,
            reservoir_heads: model.reservoir_heads.clone(),
        }
    }
}
