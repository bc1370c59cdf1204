//! Reporting-grid resampling and table construction.
//!
//! The hydraulic grid is where the physics is solved; the report grid is
//! what the caller asked to see. Flows, junction heads, and tank heads
//! are resampled with monotone cubics (no overshoot between computed
//! states), consumption is recomputed from the resampled heads, and the
//! residuals of each resampled state are checked against the solver
//! tolerance so interpolation artifacts are visible in the diagnostics.

use nalgebra::DVector;
use tracing::warn;

use crate::demand::DemandSchedule;
use crate::eps::{HydraulicRun, SimOptions};
use crate::error::SimResult;
use wf_core::{GRAVITY, MonotoneCubic, Real};
use wf_results::{LinkRecord, NodeRecord, RunDiagnostics, RunReport, StepDiagnostics};
use wf_solver::{Boundary, RunContext};

/// One resampled operating point on the report grid.
struct ReportPoint {
    flows: DVector<Real>,
    heads: DVector<Real>,
    tank_heads: DVector<Real>,
    demands: DVector<Real>,
}

/// Series-per-object interpolators over the hydraulic grid.
struct Resampler {
    flows: Vec<MonotoneCubic>,
    heads: Vec<MonotoneCubic>,
    tank_heads: Vec<MonotoneCubic>,
}

impl Resampler {
    fn new(run: &HydraulicRun) -> SimResult<Self> {
        let xs: Vec<Real> = run.times.iter().map(|&t| t as Real).collect();
        let series = |get: &dyn Fn(usize) -> Real| -> SimResult<MonotoneCubic> {
            let ys: Vec<Real> = (0..xs.len()).map(get).collect();
            Ok(MonotoneCubic::new(xs.clone(), ys)?)
        };
        let np = run.states[0].flows.len();
        let nj = run.states[0].heads.len();
        let nt = run.tank_heads[0].len();
        let mut flows = Vec::with_capacity(np);
        for p in 0..np {
            flows.push(series(&|k| run.states[k].flows[p])?);
        }
        let mut heads = Vec::with_capacity(nj);
        for i in 0..nj {
            heads.push(series(&|k| run.states[k].heads[i])?);
        }
        let mut tank_heads = Vec::with_capacity(nt);
        for t in 0..nt {
            tank_heads.push(series(&|k| run.tank_heads[k][t])?);
        }
        Ok(Self { flows, heads, tank_heads })
    }

    fn at(&self, time_s: u64, schedule: &DemandSchedule) -> ReportPoint {
        let x = time_s as Real;
        ReportPoint {
            flows: DVector::from_fn(self.flows.len(), |p, _| self.flows[p].eval(x)),
            heads: DVector::from_fn(self.heads.len(), |i, _| self.heads[i].eval(x)),
            tank_heads: DVector::from_fn(self.tank_heads.len(), |t, _| self.tank_heads[t].eval(x)),
            demands: schedule.demands_at(time_s),
        }
    }
}

fn node_rows(ctx: &RunContext<'_>, time_s: u64, point: &ReportPoint, out: &mut Vec<NodeRecord>) {
    let model = ctx.model;
    let boundary = Boundary {
        demands: point.demands.clone(),
        tank_heads: point.tank_heads.clone(),
        reservoir_heads: model.reservoir_heads.clone(),
    };
    let consumption = ctx.consumption(&point.heads, &boundary);
    for i in 0..model.n_junctions() {
        let demand = point.demands[i];
        let percent = if demand > 0.0 { 100.0 * consumption[i] / demand } else { 100.0 };
        out.push(NodeRecord {
            time_s,
            node_id: model.junction_ids[i].clone(),
            elevation_m: model.elevations[i],
            demand_m3_s: demand,
            head_m: point.heads[i],
            pressure_m: point.heads[i] - model.elevations[i],
            consumption_m3_s: consumption[i],
            percent_satisfied: percent,
        });
    }
    for t in 0..model.n_tanks() {
        out.push(NodeRecord {
            time_s,
            node_id: model.tank_ids[t].clone(),
            elevation_m: model.tank_elevations[t],
            demand_m3_s: 0.0,
            head_m: point.tank_heads[t],
            pressure_m: point.tank_heads[t] - model.tank_elevations[t],
            consumption_m3_s: 0.0,
            percent_satisfied: 100.0,
        });
    }
    for r in 0..model.n_reservoirs() {
        let head = model.reservoir_heads[r];
        out.push(NodeRecord {
            time_s,
            node_id: model.reservoir_ids[r].clone(),
            elevation_m: head,
            demand_m3_s: 0.0,
            head_m: head,
            pressure_m: 0.0,
            consumption_m3_s: 0.0,
            percent_satisfied: 100.0,
        });
    }
}

fn link_rows(ctx: &RunContext<'_>, time_s: u64, point: &ReportPoint, out: &mut Vec<LinkRecord>) {
    let model = ctx.model;
    for p in 0..model.n_pipes() {
        let q = point.flows[p];
        let diameter = model.pipe_diameters[p];
        let length = model.pipe_lengths[p];
        let area = std::f64::consts::PI * diameter * diameter / 4.0;
        let velocity = q.abs() / area;
        let headloss = ctx.headloss(p, q);
        // Darcy friction factor implied by the Hazen-Williams loss.
        let friction_factor = if velocity > 1e-12 {
            headloss.abs() * diameter * 2.0 * GRAVITY / (length * velocity * velocity)
        } else {
            0.0
        };
        out.push(LinkRecord {
            time_s,
            link_id: model.pipe_ids[p].clone(),
            length_m: length,
            diameter_m: diameter,
            flow_m3_s: q,
            velocity_m_s: velocity,
            headloss_m: headloss,
            headloss_per_1000m: headloss / length * 1000.0,
            friction_factor,
        });
    }
}

/// Diagnostics for one report time: copy of the covering hydraulic
/// step's stats with reporting-only findings appended.
fn report_step(
    ctx: &RunContext<'_>,
    run: &HydraulicRun,
    time_s: u64,
    point: &ReportPoint,
    residual_tol: Real,
) -> StepDiagnostics {
    let covering = run
        .times
        .iter()
        .rposition(|&t| t <= time_s)
        .unwrap_or(0);
    let mut step = run.steps[covering].clone();
    step.time_s = time_s;

    let boundary = Boundary {
        demands: point.demands.clone(),
        tank_heads: point.tank_heads.clone(),
        reservoir_heads: ctx.model.reservoir_heads.clone(),
    };
    let residual = ctx.residuals(&point.flows, &point.heads, &boundary);
    let inf = residual.amax();
    if inf > residual_tol {
        let msg =
            format!("resampled state at t={time_s}s has residual {inf:.3e} above tolerance");
        warn!("{msg}");
        step.messages.push(msg);
    }
    step
}

/// Build the report tables from a completed hydraulic run.
///
/// `total_elapsed_s` in the diagnostics is left at zero; the caller owns
/// the run-level timer.
pub fn build_report(
    ctx: &RunContext<'_>,
    schedule: &DemandSchedule,
    run: &HydraulicRun,
    options: &SimOptions,
) -> SimResult<RunReport> {
    let model = ctx.model;
    let mut nodes = Vec::new();
    let mut links = Vec::new();
    let mut report_steps = Vec::new();

    if model.single_period() {
        // Nothing to resample: one solved instant, one table row block.
        let point = ReportPoint {
            flows: run.states[0].flows.clone(),
            heads: run.states[0].heads.clone(),
            tank_heads: run.tank_heads[0].clone(),
            demands: run.demands[0].clone(),
        };
        let t = run.times[0];
        node_rows(ctx, t, &point, &mut nodes);
        link_rows(ctx, t, &point, &mut links);
        report_steps.push(run.steps[0].clone());
    } else {
        let resampler = Resampler::new(run)?;
        for &t in &model.report_times() {
            let point = resampler.at(t, schedule);
            node_rows(ctx, t, &point, &mut nodes);
            link_rows(ctx, t, &point, &mut links);
            report_steps.push(report_step(ctx, run, t, &point, options.solve.residual_tol));
        }
    }

    Ok(RunReport {
        nodes,
        links,
        single_period: model.single_period(),
        diagnostics: RunDiagnostics {
            hydraulic_steps: run.steps.clone(),
            report_steps,
            success: run.success,
            total_elapsed_s: 0.0,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eps::run_hydraulics;
    use wf_network::{NetworkBuilder, TimeOptions, extract};

    fn run_network(times: TimeOptions) -> RunReport {
        let net = NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
            .times(times)
            .build()
            .unwrap();
        let model = extract(&net).unwrap();
        let ctx = RunContext::new(&model).unwrap();
        let schedule = DemandSchedule::new(&model).unwrap();
        let options = SimOptions::default();
        let run = run_hydraulics(&ctx, &schedule, &options).unwrap();
        build_report(&ctx, &schedule, &run, &options).unwrap()
    }

    #[test]
    fn single_period_produces_one_row_block() {
        let report = run_network(TimeOptions::default());
        assert!(report.single_period);
        // One junction, one reservoir, one pipe, one instant.
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.diagnostics.report_steps.len(), 1);
        let j1 = &report.nodes[0];
        assert_eq!(j1.node_id, "j1");
        assert!((j1.percent_satisfied - 100.0).abs() < 1e-6);
        assert!(j1.pressure_m > 20.0);
    }

    #[test]
    fn report_grid_honors_start_offset() {
        let report = run_network(TimeOptions {
            duration: 4 * 3600,
            hydraulic_timestep: 3600,
            report_timestep: 2 * 3600,
            report_start: 1800,
            ..Default::default()
        });
        assert_eq!(report.times(), vec![1800, 9000, 14400]);
        // Steady boundary data: the resampled rows match the solved ones.
        for row in &report.nodes {
            if row.node_id == "j1" {
                assert!((row.consumption_m3_s - 0.01).abs() < 1e-5);
            }
        }
        assert!(report.diagnostics.success);
        for step in &report.diagnostics.report_steps {
            assert!(step.messages.is_empty(), "unexpected: {:?}", step.messages);
        }
    }

    #[test]
    fn link_rows_carry_derived_quantities() {
        let report = run_network(TimeOptions::default());
        let link = &report.links[0];
        let area = std::f64::consts::PI * 0.3 * 0.3 / 4.0;
        assert!((link.velocity_m_s - link.flow_m3_s.abs() / area).abs() < 1e-12);
        assert!(link.headloss_m > 0.0);
        assert!((link.headloss_per_1000m - link.headloss_m).abs() < 1e-12);
        assert!(link.friction_factor > 0.0);
    }
}
