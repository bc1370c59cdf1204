//! Tank level dynamics.
//!
//! Tank heads are boundary data for the solver and state for the time
//! stepper: `dH/dt = net inflow / area`. Heads are advanced with a Heun
//! scheme (forward-Euler predictor, trapezoidal corrector) and always
//! clamped to the tank's level range.

use nalgebra::DVector;

use wf_core::Real;
use wf_network::ExtractedModel;

/// Net volumetric inflow into each tank for the given pipe flows, m³/s.
pub fn net_inflows(model: &ExtractedModel, flows: &DVector<Real>) -> DVector<Real> {
    let nj = model.n_junctions();
    let nt = model.n_tanks();
    let mut inflows = DVector::zeros(nt);
    for (p, &(start, end)) in model.pipe_endpoints.iter().enumerate() {
        if start >= nj && start < nj + nt {
            inflows[start - nj] -= flows[p];
        }
        if end >= nj && end < nj + nt {
            inflows[end - nj] += flows[p];
        }
    }
    inflows
}

/// Clamp tank heads to `[elevation + min level, elevation + max level]`.
pub fn clamp_heads(model: &ExtractedModel, heads: &DVector<Real>) -> DVector<Real> {
    DVector::from_fn(model.n_tanks(), |t, _| {
        let lo = model.tank_elevations[t] + model.tank_min_levels[t];
        let hi = model.tank_elevations[t] + model.tank_max_levels[t];
        heads[t].clamp(lo, hi)
    })
}

/// Forward-Euler predictor over one step of `dt` seconds.
pub fn euler_predict(
    model: &ExtractedModel,
    heads: &DVector<Real>,
    inflows: &DVector<Real>,
    dt_s: u64,
) -> DVector<Real> {
    let dt = dt_s as Real;
    let predicted = DVector::from_fn(model.n_tanks(), |t, _| {
        heads[t] + dt * inflows[t] / model.tank_areas[t]
    });
    clamp_heads(model, &predicted)
}

/// Trapezoidal corrector using the inflows at both ends of the step.
pub fn trapezoid_correct(
    model: &ExtractedModel,
    heads: &DVector<Real>,
    inflows_start: &DVector<Real>,
    inflows_end: &DVector<Real>,
    dt_s: u64,
) -> DVector<Real> {
    let dt = dt_s as Real;
    let corrected = DVector::from_fn(model.n_tanks(), |t, _| {
        heads[t] + dt * 0.5 * (inflows_start[t] + inflows_end[t]) / model.tank_areas[t]
    });
    clamp_heads(model, &corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wf_network::{NetworkBuilder, extract};

    fn tank_model() -> ExtractedModel {
        let net = NetworkBuilder::new()
            .tank("t1", 10.0, 5.0, 1.0, 8.0, 10.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "t1", "j1", 500.0, 0.2, 120.0)
            .build()
            .unwrap();
        extract(&net).unwrap()
    }

    #[test]
    fn outflow_drains_the_tank() {
        let model = tank_model();
        // Positive pipe flow leaves the tank.
        let inflows = net_inflows(&model, &DVector::from_element(1, 0.02));
        assert!((inflows[0] + 0.02).abs() < 1e-15);
    }

    #[test]
    fn euler_step_follows_the_inflow() {
        let model = tank_model();
        let heads = DVector::from_element(1, 15.0);
        let inflows = DVector::from_element(1, -0.02);
        let predicted = euler_predict(&model, &heads, &inflows, 3600);
        let area = model.tank_areas[0];
        assert!((predicted[0] - (15.0 - 3600.0 * 0.02 / area)).abs() < 1e-12);
    }

    #[test]
    fn trapezoid_averages_the_endpoints() {
        let model = tank_model();
        let heads = DVector::from_element(1, 15.0);
        let i0 = DVector::from_element(1, -0.02);
        let i1 = DVector::from_element(1, -0.01);
        let corrected = trapezoid_correct(&model, &heads, &i0, &i1, 3600);
        let area = model.tank_areas[0];
        assert!((corrected[0] - (15.0 - 3600.0 * 0.015 / area)).abs() < 1e-12);
    }

    #[test]
    fn heads_clamp_to_level_range() {
        let model = tank_model();
        let heads = DVector::from_element(1, 15.0);
        // Enormous outflow cannot push the head below elevation + min.
        let inflows = DVector::from_element(1, -100.0);
        let predicted = euler_predict(&model, &heads, &inflows, 3600);
        assert_eq!(predicted[0], 11.0);
        // Enormous inflow saturates at elevation + max.
        let inflows = DVector::from_element(1, 100.0);
        let predicted = euler_predict(&model, &heads, &inflows, 3600);
        assert_eq!(predicted[0], 18.0);
    }

    proptest! {
        // The corrected head stays inside the level range and between
        // the two forward-Euler estimates (clamping preserves order).
        #[test]
        fn corrected_head_is_clamped_and_bracketed(
            head in 11.0f64..18.0,
            i0 in -1.0f64..1.0,
            i1 in -1.0f64..1.0,
            dt in 1u64..7200,
        ) {
            let model = tank_model();
            let heads = DVector::from_element(1, head);
            let start = DVector::from_element(1, i0);
            let end = DVector::from_element(1, i1);
            let e0 = euler_predict(&model, &heads, &start, dt)[0];
            let e1 = euler_predict(&model, &heads, &end, dt)[0];
            let corrected = trapezoid_correct(&model, &heads, &start, &end, dt)[0];
            prop_assert!((11.0..=18.0).contains(&corrected));
            let (lo, hi) = if e0 < e1 { (e0, e1) } else { (e1, e0) };
            prop_assert!(corrected >= lo - 1e-12 && corrected <= hi + 1e-12);
        }
    }
}
