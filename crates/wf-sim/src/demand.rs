//! Per-junction demand curves over the run horizon.
//!
//! Each junction gets one interpolator built once per run from
//! `nominal demand × global multiplier × pattern multipliers`, sampled on
//! the pattern time grid. Patterns wrap: a 24-hour pattern driving a
//! 48-hour run repeats. Junctions without a pattern (and single-entry
//! patterns) become constant functions.

use nalgebra::DVector;

use crate::error::SimResult;
use wf_core::{MonotoneCubic, Real};
use wf_network::ExtractedModel;

pub struct DemandSchedule {
    curves: Vec<MonotoneCubic>,
}

impl DemandSchedule {
    pub fn new(model: &ExtractedModel) -> SimResult<Self> {
        let mut curves = Vec::with_capacity(model.n_junctions());
        for i in 0..model.n_junctions() {
            let nominal = model.base_demands[i] * model.demand_multiplier;
            let curve = match model.demand_patterns[i] {
                Some(p) if model.patterns[p].len() > 1 => {
                    pattern_curve(nominal, &model.patterns[p], model)?
                }
                Some(p) => MonotoneCubic::constant(nominal * model.patterns[p][0]),
                None => MonotoneCubic::constant(nominal),
            };
            curves.push(curve);
        }
        Ok(Self { curves })
    }

    /// Demands for every junction at simulation time `t`, m³/s.
    pub fn demands_at(&self, time_s: u64) -> DVector<Real> {
        DVector::from_fn(self.curves.len(), |i, _| self.curves[i].eval(time_s as Real))
    }
}

/// Sample the wrapped pattern on its own grid across the whole run and
/// fit a monotone cubic through the samples.
fn pattern_curve(
    nominal: Real,
    multipliers: &[Real],
    model: &ExtractedModel,
) -> SimResult<MonotoneCubic> {
    let step = model.pattern_step_s;
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut t = 0u64;
    // One knot past the duration so evaluation never clamps mid-segment.
    while t <= model.duration_s + step {
        let slot = ((model.pattern_start_s + t) / step) as usize % multipliers.len();
        xs.push(t as Real);
        ys.push(nominal * multipliers[slot]);
        t += step;
    }
    Ok(MonotoneCubic::new(xs, ys)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_network::{HydraulicOptions, NetworkBuilder, TimeOptions, extract};

    fn model_with_pattern(pattern_start: u64) -> ExtractedModel {
        let net = NetworkBuilder::new()
            .pattern("day", vec![1.0, 2.0, 0.5])
            .junction("j1", 0.0, 0.01, Some("day"))
            .junction("j2", 0.0, 0.04, None)
            .hydraulics(HydraulicOptions {
                demand_multiplier: 2.0,
                ..Default::default()
            })
            .times(TimeOptions {
                duration: 4 * 3600,
                pattern_timestep: 3600,
                pattern_start,
                ..Default::default()
            })
            .build()
            .unwrap();
        extract(&net).unwrap()
    }

    #[test]
    fn knots_reproduce_pattern_values() {
        let schedule = DemandSchedule::new(&model_with_pattern(0)).unwrap();
        // j1: 0.01 demand, multiplier 2, pattern [1, 2, 0.5] wrapping.
        let d0 = schedule.demands_at(0);
        assert!((d0[0] - 0.02).abs() < 1e-12);
        let d1 = schedule.demands_at(3600);
        assert!((d1[0] - 0.04).abs() < 1e-12);
        // Wraps after three slots.
        let d3 = schedule.demands_at(3 * 3600);
        assert!((d3[0] - 0.02).abs() < 1e-12);
        // Pattern-less junction is constant.
        assert!((d0[1] - 0.08).abs() < 1e-12);
        assert!((d1[1] - 0.08).abs() < 1e-12);
    }

    #[test]
    fn pattern_start_shifts_the_schedule() {
        let schedule = DemandSchedule::new(&model_with_pattern(3600)).unwrap();
        // At t=0 the pattern is already in its second slot.
        let d0 = schedule.demands_at(0);
        assert!((d0[0] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn interpolation_stays_within_pattern_hull() {
        let schedule = DemandSchedule::new(&model_with_pattern(0)).unwrap();
        let (lo, hi) = (0.01, 0.04);
        let mut t = 0;
        while t <= 4 * 3600 {
            let d = schedule.demands_at(t)[0];
            assert!(d >= lo - 1e-9 && d <= hi + 1e-9, "demand {d} at t={t}");
            t += 600;
        }
    }
}
