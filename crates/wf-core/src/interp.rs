//! Monotone cubic interpolation (Fritsch–Carlson / PCHIP).
//!
//! Used for two jobs in the engine: turning stepwise demand patterns into
//! smooth demand curves over the run, and resampling hydraulic-grid time
//! series onto a coarser or shifted reporting grid. Both need an
//! interpolant that never overshoots the data, which plain cubic splines
//! do and monotone Hermite cubics do not.

use crate::error::{WfError, WfResult};
use crate::numeric::Real;

/// A monotone piecewise-cubic Hermite interpolant over a strictly
/// increasing grid. Evaluation outside the grid clamps to the end values.
#[derive(Debug, Clone)]
pub struct MonotoneCubic {
    xs: Vec<Real>,
    ys: Vec<Real>,
    /// Knot derivatives chosen so each segment preserves monotonicity.
    ds: Vec<Real>,
}

impl MonotoneCubic {
    /// Build an interpolant from matching x/y samples.
    ///
    /// A single sample yields a constant function. The grid must be
    /// strictly increasing.
    pub fn new(xs: Vec<Real>, ys: Vec<Real>) -> WfResult<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(WfError::InvalidArg {
                what: "interpolation grid must be non-empty and match values",
            });
        }
        for w in xs.windows(2) {
            if w[1] <= w[0] {
                return Err(WfError::InvalidArg {
                    what: "interpolation grid must be strictly increasing",
                });
            }
        }
        let ds = knot_derivatives(&xs, &ys);
        Ok(Self { xs, ys, ds })
    }

    /// Constant function (one-point grid convenience).
    pub fn constant(value: Real) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
            ds: vec![0.0],
        }
    }

    /// Evaluate at `x`, clamping outside the grid.
    pub fn eval(&self, x: Real) -> Real {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        // Binary search for the bracketing segment.
        let k = match self.xs.binary_search_by(|v| v.total_cmp(&x)) {
            Ok(i) => return self.ys[i],
            Err(i) => i - 1,
        };
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        self.ys[k] * h00 + h * self.ds[k] * h10 + self.ys[k + 1] * h01 + h * self.ds[k + 1] * h11
    }

    /// The underlying grid.
    pub fn grid(&self) -> &[Real] {
        &self.xs
    }
}

/// Fritsch–Carlson derivative selection.
fn knot_derivatives(xs: &[Real], ys: &[Real]) -> Vec<Real> {
    let n = xs.len();
    if n == 1 {
        return vec![0.0];
    }
    let h: Vec<Real> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<Real> = ys
        .windows(2)
        .zip(h.iter())
        .map(|(w, hk)| (w[1] - w[0]) / hk)
        .collect();
    if n == 2 {
        return vec![delta[0], delta[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if delta[k - 1] * delta[k] <= 0.0 {
            d[k] = 0.0;
        } else {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
        }
    }
    d[0] = edge_derivative(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = edge_derivative(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}

/// One-sided three-point end derivative, clipped to preserve shape.
fn edge_derivative(h0: Real, h1: Real, d0: Real, d1: Real) -> Real {
    let mut d = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if d * d0 <= 0.0 {
        d = 0.0;
    } else if d0 * d1 <= 0.0 && d.abs() > 3.0 * d0.abs() {
        d = 3.0 * d0;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reproduces_knots() {
        let f = MonotoneCubic::new(vec![0.0, 1.0, 2.5, 4.0], vec![1.0, 3.0, 3.0, -2.0]).unwrap();
        for (x, y) in [(0.0, 1.0), (1.0, 3.0), (2.5, 3.0), (4.0, -2.0)] {
            assert!((f.eval(x) - y).abs() < 1e-12);
        }
    }

    #[test]
    fn clamps_outside_grid() {
        let f = MonotoneCubic::new(vec![0.0, 1.0], vec![2.0, 5.0]).unwrap();
        assert_eq!(f.eval(-10.0), 2.0);
        assert_eq!(f.eval(10.0), 5.0);
    }

    #[test]
    fn constant_function() {
        let f = MonotoneCubic::constant(7.5);
        assert_eq!(f.eval(-1.0), 7.5);
        assert_eq!(f.eval(100.0), 7.5);
    }

    #[test]
    fn rejects_bad_grid() {
        assert!(MonotoneCubic::new(vec![], vec![]).is_err());
        assert!(MonotoneCubic::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(MonotoneCubic::new(vec![1.0, 0.0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn monotone_data_stays_monotone() {
        let f =
            MonotoneCubic::new(vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![0.0, 0.1, 0.1, 5.0, 5.1])
                .unwrap();
        let mut prev = f.eval(0.0);
        let mut x = 0.0;
        while x <= 4.0 {
            let y = f.eval(x);
            assert!(y >= prev - 1e-12, "not monotone at x={x}");
            prev = y;
            x += 0.01;
        }
    }

    proptest! {
        // The interpolant never leaves the hull of the sample values.
        #[test]
        fn stays_within_data_hull(vals in proptest::collection::vec(-100.0f64..100.0, 2..8), t in 0.0f64..1.0) {
            let xs: Vec<f64> = (0..vals.len()).map(|i| i as f64).collect();
            let lo = vals.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let x = t * (vals.len() - 1) as f64;
            let f = MonotoneCubic::new(xs, vals).unwrap();
            let y = f.eval(x);
            prop_assert!(y >= lo - 1e-9 && y <= hi + 1e-9);
        }
    }
}
