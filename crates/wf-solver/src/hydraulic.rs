//! Damped Newton iteration on the head-only Schur complement.
//!
//! The full Newton system over (flows, junction heads) is block
//! `[D, -Aᵀ; -A, -C]` with D = diag(d headloss/dq) and C =
//! diag(d consumption/dh). Eliminating the flow block leaves the SPD
//! Schur matrix `A·D⁻¹·Aᵀ + C` over junction heads, which is factorized
//! with faer's sparse Cholesky; flows are recovered by back-substitution.
//! Steps are damped with a Goldstein ratio test on the weighted
//! least-squares residual objective.

use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::{SparseColMat, Triplet};
use faer::{Mat, Side};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::residual::{Boundary, RunContext};
use wf_core::{Real, Timer, rel_inf_change};
use wf_network::ExtractedModel;

/// Newton iteration controls.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Newton iteration cap per time step.
    pub max_iterations: usize,
    /// Convergence threshold on the residual infinity norm.
    pub residual_tol: Real,
    /// Convergence threshold on the relative step size of flows and heads.
    pub step_tol: Real,
    /// Minimum accepted ratio of actual to predicted objective decrease.
    pub goldstein_ratio: Real,
    /// Step halvings allowed per iteration before giving up.
    pub max_damping: usize,
    /// Headloss derivatives are floored this many decades below the
    /// largest one, keeping D⁻¹ bounded.
    pub clip_decades: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            residual_tol: 1e-3,
            step_tol: 1e-6,
            goldstein_ratio: 0.1,
            max_damping: 10,
            clip_decades: 10.0,
        }
    }
}

/// One hydraulic operating point: per-pipe flows and per-junction heads.
#[derive(Debug, Clone, PartialEq)]
pub struct HydraulicState {
    pub flows: DVector<Real>,
    pub heads: DVector<Real>,
}

impl HydraulicState {
    /// Flat-start guess: a small uniform flow through every pipe and
    /// every junction at full service pressure.
    pub fn flat_start(model: &ExtractedModel) -> Self {
        Self {
            flows: DVector::from_element(model.n_pipes(), 1e-3),
            heads: DVector::from_fn(model.n_junctions(), |i, _| {
                model.elevations[i] + model.pda.service_pressure
            }),
        }
    }
}

/// Per-step solver diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub damping_corrections: usize,
    pub residual_norm_1: Real,
    pub residual_norm_2: Real,
    pub residual_norm_inf: Real,
    /// Observed convergence order, estimated from the last three residual
    /// norms when enough history exists.
    pub convergence_order: Option<Real>,
    pub elapsed_s: Real,
    pub messages: Vec<String>,
}

/// Result of one time-step solve that produced a usable state.
///
/// A step that runs out of iterations (or whose line search fails after
/// at least one accepted update) still carries its best iterate; the
/// variant forces callers to acknowledge the degradation instead of
/// silently consuming a non-converged state.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Converged { state: HydraulicState, stats: SolveStats },
    Degraded { state: HydraulicState, stats: SolveStats },
}

impl SolveOutcome {
    pub fn state(&self) -> &HydraulicState {
        match self {
            SolveOutcome::Converged { state, .. } | SolveOutcome::Degraded { state, .. } => state,
        }
    }

    pub fn stats(&self) -> &SolveStats {
        match self {
            SolveOutcome::Converged { stats, .. } | SolveOutcome::Degraded { stats, .. } => stats,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, SolveOutcome::Converged { .. })
    }
}

/// Weighted objective values at or below this are numerically zero: the
/// residuals are scaled relative to the boundary magnitudes, so this
/// corresponds to a relative residual of 1e-10, far inside the
/// convergence tolerance. The Goldstein ratio is undefined there.
const OBJECTIVE_FLOOR: Real = 1e-20;

fn objective(residual: &DVector<Real>, n_pipes: usize, w_energy: Real, w_mass: Real) -> Real {
    let energy = residual.rows(0, n_pipes);
    let mass = residual.rows(n_pipes, residual.len() - n_pipes);
    w_energy * energy.norm_squared() + w_mass * mass.norm_squared()
}

fn norm_1(v: &DVector<Real>) -> Real {
    v.iter().map(|x| x.abs()).sum()
}

/// Condition number of the (symmetrized) Schur matrix, via dense SVD.
/// Diagnostic only, computed on the fatal path.
fn schur_condition(triplets: &[Triplet<usize, usize, Real>], n: usize) -> Real {
    let mut dense = DMatrix::<Real>::zeros(n, n);
    for t in triplets {
        dense[(t.row, t.col)] += t.val;
        if t.row != t.col {
            dense[(t.col, t.row)] += t.val;
        }
    }
    let svd = dense.svd(false, false);
    let mut s_max: Real = 0.0;
    let mut s_min = Real::INFINITY;
    for &s in svd.singular_values.iter() {
        s_max = s_max.max(s);
        s_min = s_min.min(s);
    }
    if s_min > 0.0 { s_max / s_min } else { Real::INFINITY }
}

/// Observed convergence order from the last three residual norms.
fn convergence_order(history: &[Real]) -> Option<Real> {
    let n = history.len();
    if n < 3 {
        return None;
    }
    let (r0, r1, r2) = (history[n - 3], history[n - 2], history[n - 1]);
    if r0 <= 0.0 || r1 <= 0.0 || r2 <= 0.0 || r1 >= r0 || r2 >= r1 {
        return None;
    }
    let denom = (r1 / r0).ln();
    if denom == 0.0 {
        return None;
    }
    Some((r2 / r1).ln() / denom)
}

/// Solve `R(q, h) = 0` for one set of boundary data, starting from
/// `initial`.
///
/// Failures at the very first iteration are fatal (there is no usable
/// iterate to return); later failures and iteration exhaustion degrade
/// into [`SolveOutcome::Degraded`] carrying the best state reached.
pub fn solve_step(
    ctx: &RunContext<'_>,
    boundary: &Boundary,
    initial: &HydraulicState,
    options: &SolveOptions,
) -> SolverResult<SolveOutcome> {
    let timer = Timer::start();
    let model = ctx.model;
    let np = model.n_pipes();
    let nj = model.n_junctions();

    // Weighted-least-squares scales: residuals are compared against the
    // magnitudes of the boundary data that drives them.
    let max_fixed_head = boundary
        .tank_heads
        .iter()
        .chain(boundary.reservoir_heads.iter())
        .fold(0.0 as Real, |acc, &head| acc.max(head.abs()));
    let w_energy = if max_fixed_head > 0.0 { 1.0 / (max_fixed_head * max_fixed_head) } else { 1.0 };
    let max_demand = boundary.demands.amax();
    let w_mass = if max_demand > 0.0 { 1.0 / (max_demand * max_demand) } else { 1.0 };

    let mut q = initial.flows.clone();
    let mut h = initial.heads.clone();
    let mut residual = ctx.residuals(&q, &h, boundary);
    if !residual.iter().all(|r| r.is_finite()) {
        return Err(SolverError::NonFinite { what: "initial residual" });
    }
    let mut phi = objective(&residual, np, w_energy, w_mass);

    let mut symbolic: Option<SymbolicLlt<usize>> = None;
    let mut triplets: Vec<Triplet<usize, usize, Real>> = Vec::with_capacity(nj + 3 * np);
    let mut residual_history = vec![residual.amax()];
    let mut damping_total = 0;
    let mut iterations = 0;
    let mut converged = false;
    let mut failure: Option<SolverError> = None;

    'newton: for iter in 0..options.max_iterations {
        // An iterate already at the root cannot be improved; certify it
        // here instead of asking the line search for a fractional
        // decrease of nothing. Covers warm starts from a converged
        // state and the iteration that lands exactly on the root.
        if residual.amax() < options.residual_tol && phi <= OBJECTIVE_FLOOR {
            converged = true;
            break 'newton;
        }

        let d_true = ctx.d_headloss_dq(&q);
        let floor = d_true.amax() * (10.0 as Real).powf(-options.clip_decades);
        let d_clipped = d_true.map(|d| d.max(floor));
        let c = ctx.d_consumption_dh(&h, boundary);
        let energy = residual.rows(0, np).clone_owned();
        let mass = residual.rows(np, nj).clone_owned();

        // Lower triangle of the Schur matrix A·D⁻¹·Aᵀ + C, plus the
        // right-hand side M + A·D⁻¹·E. Duplicate triplets are summed.
        triplets.clear();
        let mut rhs = mass.clone();
        for i in 0..nj {
            triplets.push(Triplet::new(i, i, c[i]));
        }
        for p in 0..np {
            let inv_d = 1.0 / d_clipped[p];
            let (start, end) = model.pipe_endpoints[p];
            if start < nj {
                triplets.push(Triplet::new(start, start, inv_d));
                rhs[start] += inv_d * energy[p];
            }
            if end < nj {
                triplets.push(Triplet::new(end, end, inv_d));
                rhs[end] -= inv_d * energy[p];
            }
            if start < nj && end < nj {
                let (row, col) = if start > end { (start, end) } else { (end, start) };
                triplets.push(Triplet::new(row, col, -inv_d));
            }
        }

        let schur = match SparseColMat::try_new_from_triplets(nj, nj, &triplets) {
            Ok(mat) => mat,
            Err(e) => {
                let what = format!("Schur assembly failed: {e:?}");
                if iter == 0 {
                    return Err(SolverError::FirstIterationDiverged {
                        what,
                        condition: schur_condition(&triplets, nj),
                    });
                }
                failure = Some(SolverError::Singular { what });
                break 'newton;
            }
        };
        if symbolic.is_none() {
            match SymbolicLlt::try_new(schur.symbolic(), Side::Lower) {
                Ok(sym) => symbolic = Some(sym),
                Err(e) => {
                    return Err(SolverError::FirstIterationDiverged {
                        what: format!("symbolic factorization failed: {e:?}"),
                        condition: schur_condition(&triplets, nj),
                    });
                }
            }
        }
        let sym = symbolic
            .clone()
            .ok_or(SolverError::NonFinite { what: "symbolic factorization" })?;
        let llt = match Llt::try_new_with_symbolic(sym, schur.as_ref(), Side::Lower) {
            Ok(llt) => llt,
            Err(e) => {
                let what = format!("Cholesky factorization failed: {e:?}");
                if iter == 0 {
                    return Err(SolverError::FirstIterationDiverged {
                        what,
                        condition: schur_condition(&triplets, nj),
                    });
                }
                failure = Some(SolverError::Singular { what });
                break 'newton;
            }
        };
        let solution = llt.solve(&Mat::from_fn(nj, 1, |r, _| rhs[r]));
        let dh = DVector::from_fn(nj, |i, _| solution[(i, 0)]);

        // Back-substitute the flow update: Δq = D⁻¹(-E + AᵀΔh), where
        // fixed-head nodes contribute nothing to AᵀΔh.
        let at_dh = DVector::from_fn(np, |p, _| {
            let (start, end) = model.pipe_endpoints[p];
            let hs = if start < nj { dh[start] } else { 0.0 };
            let he = if end < nj { dh[end] } else { 0.0 };
            hs - he
        });
        let dq = DVector::from_fn(np, |p, _| (-energy[p] + at_dh[p]) / d_clipped[p]);

        if !dq.iter().chain(dh.iter()).all(|x| x.is_finite()) {
            let what = "non-finite Newton direction".to_string();
            if iter == 0 {
                return Err(SolverError::FirstIterationDiverged {
                    what,
                    condition: schur_condition(&triplets, nj),
                });
            }
            failure = Some(SolverError::NonFinite { what: "Newton direction" });
            break 'newton;
        }

        // Descent guard with the unclipped derivatives. By construction
        // the direction gives dΦ = -2Φ, so anything non-negative means
        // the linearization has broken down.
        let d_phi = {
            let mut acc = 0.0;
            for p in 0..np {
                let jd = d_true[p] * dq[p] - at_dh[p];
                acc += w_energy * energy[p] * jd;
            }
            for i in 0..nj {
                let mut a_dq = 0.0;
                for (p, &(start, end)) in model.pipe_endpoints.iter().enumerate() {
                    if start == i {
                        a_dq += dq[p];
                    }
                    if end == i {
                        a_dq -= dq[p];
                    }
                }
                acc += w_mass * mass[i] * (-a_dq - c[i] * dh[i]);
            }
            2.0 * acc
        };
        if phi > OBJECTIVE_FLOOR && d_phi >= 0.0 {
            if iter == 0 {
                return Err(SolverError::FirstIterationDiverged {
                    what: "Newton step is not a descent direction".to_string(),
                    condition: schur_condition(&triplets, nj),
                });
            }
            failure = Some(SolverError::NoDescent);
            break 'newton;
        }

        // Goldstein damping: accept once the realized decrease is a
        // sufficient fraction of the first-order prediction 2λΦ.
        let mut lambda: Real = 1.0;
        let mut corrections = 0;
        let (q_new, h_new, residual_new, phi_new) = loop {
            let q_trial = &q + lambda * &dq;
            let h_trial = &h + lambda * &dh;
            let r_trial = ctx.residuals(&q_trial, &h_trial, boundary);
            let finite = r_trial.iter().all(|r| r.is_finite());
            if finite {
                let phi_trial = objective(&r_trial, np, w_energy, w_mass);
                let predicted = 2.0 * lambda * phi;
                // A trial at numerical zero is accepted unconditionally;
                // the ratio test cannot resolve decreases that small.
                if phi_trial <= OBJECTIVE_FLOOR
                    || phi <= 0.0
                    || (phi - phi_trial) / predicted >= options.goldstein_ratio
                {
                    break (q_trial, h_trial, r_trial, phi_trial);
                }
            }
            corrections += 1;
            if corrections > options.max_damping {
                if iter == 0 {
                    return Err(SolverError::FirstIterationDiverged {
                        what: format!("line search failed after {} halvings", corrections - 1),
                        condition: schur_condition(&triplets, nj),
                    });
                }
                failure = Some(SolverError::DampingFailed { corrections: corrections - 1 });
                break 'newton;
            }
            lambda *= 0.5;
        };
        damping_total += corrections;

        let step_small = rel_inf_change(q_new.as_slice(), q.as_slice()) < options.step_tol
            && rel_inf_change(h_new.as_slice(), h.as_slice()) < options.step_tol;
        q = q_new;
        h = h_new;
        residual = residual_new;
        phi = phi_new;
        residual_history.push(residual.amax());
        iterations = iter + 1;
        debug!(
            iteration = iterations,
            residual_inf = residual.amax(),
            lambda,
            "newton iteration"
        );

        if residual.amax() < options.residual_tol && step_small {
            converged = true;
            break 'newton;
        }
    }

    let mut messages = Vec::new();
    if let Some(err) = &failure {
        let msg = format!("iteration abandoned: {err}");
        warn!("{msg}");
        messages.push(msg);
    } else if !converged {
        let msg = format!("no convergence within {} iterations", options.max_iterations);
        warn!("{msg}");
        messages.push(msg);
    }

    let stats = SolveStats {
        iterations,
        damping_corrections: damping_total,
        residual_norm_1: norm_1(&residual),
        residual_norm_2: residual.norm(),
        residual_norm_inf: residual.amax(),
        convergence_order: convergence_order(&residual_history),
        elapsed_s: timer.elapsed_s(),
        messages,
    };
    let state = HydraulicState { flows: q, heads: h };
    if converged {
        Ok(SolveOutcome::Converged { state, stats })
    } else {
        Ok(SolveOutcome::Degraded { state, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_network::{HW_EXPONENT, NetworkBuilder, extract};

    fn solve(net: &wf_network::Network) -> (SolveOutcome, wf_network::ExtractedModel) {
        let model = extract(net).unwrap();
        let ctx = RunContext::new(&model).unwrap();
        let boundary = ctx.initial_boundary();
        let initial = HydraulicState::flat_start(&model);
        let outcome = solve_step(&ctx, &boundary, &initial, &SolveOptions::default()).unwrap();
        (outcome, extract(net).unwrap())
    }

    #[test]
    fn single_pipe_delivers_full_demand() {
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
            .build()
            .unwrap();
        let (outcome, model) = solve(&net);
        assert!(outcome.is_converged());
        let state = outcome.state();
        // Pressure is ample, so the junction draws its full demand.
        assert!((state.flows[0] - 0.01).abs() < 1e-6);
        let headloss = model.pipe_resistances[0] * 0.01f64.powf(HW_EXPONENT);
        assert!((state.heads[0] - (50.0 - headloss)).abs() < 1e-4);
    }

    #[test]
    fn zero_demand_network_carries_no_flow() {
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.0, None)
            .junction("j2", 0.0, 0.0, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
            .pipe("p2", "j1", "j2", 500.0, 0.2, 120.0)
            .build()
            .unwrap();
        let (outcome, _) = solve(&net);
        assert!(outcome.is_converged());
        let state = outcome.state();
        for q in state.flows.iter() {
            assert!(q.abs() < 1e-6, "flow {q}");
        }
        // Heads settle at the fixed source head.
        for head in state.heads.iter() {
            assert!((head - 50.0).abs() < 1e-3, "head {head}");
        }
    }

    #[test]
    fn pressure_deficient_junction_draws_reduced_demand() {
        // Elevation close to the source head leaves less than the
        // service pressure available.
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 45.0, 0.05, None)
            .pipe("p1", "r1", "j1", 2000.0, 0.15, 100.0)
            .build()
            .unwrap();
        let (outcome, _) = solve(&net);
        assert!(outcome.is_converged());
        let state = outcome.state();
        assert!(state.flows[0] > 0.0);
        assert!(state.flows[0] < 0.05, "delivery not reduced: {}", state.flows[0]);
        // Mass balance: inflow equals the pressure-reduced consumption.
        let model = extract(&net).unwrap();
        let ctx = RunContext::new(&model).unwrap();
        let c = ctx.consumption(&state.heads, &ctx.initial_boundary());
        assert!((state.flows[0] - c[0]).abs() < 1e-6);
    }

    #[test]
    fn series_network_conserves_mass() {
        let net = NetworkBuilder::new()
            .reservoir("r1", 60.0)
            .junction("j1", 0.0, 0.01, None)
            .junction("j2", 0.0, 0.02, None)
            .pipe("p1", "r1", "j1", 800.0, 0.3, 130.0)
            .pipe("p2", "j1", "j2", 400.0, 0.25, 120.0)
            .build()
            .unwrap();
        let (outcome, model) = solve(&net);
        assert!(outcome.is_converged());
        let state = outcome.state();
        let ctx = RunContext::new(&model).unwrap();
        let m = ctx.mass_residuals(&state.flows, &state.heads, &ctx.initial_boundary());
        assert!(m.amax() < 1e-3);
        // p1 carries both demands, p2 only the downstream one.
        assert!(state.flows[0] > state.flows[1]);
    }

    #[test]
    fn looped_network_balances_at_every_junction() {
        let net = NetworkBuilder::new()
            .reservoir("r1", 60.0)
            .junction("j1", 0.0, 0.01, None)
            .junction("j2", 0.0, 0.01, None)
            .junction("j3", 0.0, 0.02, None)
            .pipe("p1", "r1", "j1", 500.0, 0.3, 130.0)
            .pipe("p2", "j1", "j2", 600.0, 0.25, 120.0)
            .pipe("p3", "j1", "j3", 600.0, 0.25, 120.0)
            .pipe("p4", "j2", "j3", 400.0, 0.2, 110.0)
            .build()
            .unwrap();
        let (outcome, model) = solve(&net);
        assert!(outcome.is_converged());
        let state = outcome.state();
        let ctx = RunContext::new(&model).unwrap();
        let boundary = ctx.initial_boundary();
        let m = ctx.mass_residuals(&state.flows, &state.heads, &boundary);
        assert!(m.amax() < 1e-3);
        // Energy around the loop j1-j2-j3-j1 must cancel.
        let hl = |p: usize| model.pipe_resistances[p] * ctx.smoothing.reduced_headloss(state.flows[p]);
        let loop_sum = hl(1) + hl(3) - hl(2);
        assert!(loop_sum.abs() < 1e-3, "loop headloss sum {loop_sum}");
    }

    #[test]
    fn resolve_from_exact_root_certifies_convergence() {
        // A state at the root admits no objective decrease; the solve
        // must still end Converged instead of failing the line search.
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
            .build()
            .unwrap();
        let model = extract(&net).unwrap();
        let ctx = RunContext::new(&model).unwrap();
        let boundary = ctx.initial_boundary();
        let first = solve_step(
            &ctx,
            &boundary,
            &HydraulicState::flat_start(&model),
            &SolveOptions::default(),
        )
        .unwrap();
        assert!(first.is_converged());

        let second = solve_step(&ctx, &boundary, first.state(), &SolveOptions::default()).unwrap();
        assert!(second.is_converged(), "stats: {:?}", second.stats());
        assert!(second.stats().messages.is_empty());
        let dq = (&second.state().flows - &first.state().flows).amax();
        let dh = (&second.state().heads - &first.state().heads).amax();
        assert!(dq < 1e-9 && dh < 1e-9, "warm re-solve moved the state: dq={dq}, dh={dh}");
    }

    #[test]
    fn stats_report_convergence_metrics() {
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
            .build()
            .unwrap();
        let (outcome, _) = solve(&net);
        let stats = outcome.stats();
        assert!(stats.iterations > 0);
        assert!(stats.residual_norm_inf < 1e-3);
        assert!(stats.residual_norm_2 >= stats.residual_norm_inf);
        assert!(stats.residual_norm_1 >= stats.residual_norm_2 - 1e-15);
        assert!(stats.messages.is_empty());
    }

    #[test]
    fn convergence_order_estimate() {
        // Quadratic-looking residual history.
        let history = [1e-1, 1e-2, 1e-4];
        let order = convergence_order(&history).unwrap();
        assert!((order - 2.0).abs() < 1e-9);
        assert!(convergence_order(&[1e-1, 1e-2]).is_none());
        assert!(convergence_order(&[1e-1, 2e-1, 1e-2]).is_none());
    }
}
