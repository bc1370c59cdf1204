//! C¹ regularization of the headloss and consumption laws.
//!
//! The raw Hazen-Williams reduced headloss `|q|^(n-1)·q` has an unbounded
//! second derivative at q = 0, and the consumption law `z^e` (clamped to
//! [0, 1]) has kinks at z = 0 and z = 1. Newton needs Lipschitz
//! derivatives, so each non-smooth point is replaced, inside a small
//! fixed band, by a cubic matching value and first derivative of the true
//! function at the band edges. The coefficient systems are solved once
//! per run with the general Newton root finder, in the band-scaled
//! coordinate `t = (x - center)/band` so the systems stay well
//! conditioned; the scaling back to raw coefficients is exact.

use nalgebra::DVector;

use crate::error::SolverResult;
use crate::roots::{NewtonConfig, newton_root};
use wf_core::Real;

/// Half-width of the regularized band around zero flow, m³/s.
pub const FLOW_BAND: Real = 1e-2;
/// Half-width of the regularized bands around pressure fractions 0 and 1.
pub const FRACTION_BAND: Real = 1e-3;

/// The regularization polynomials of a run, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingPolys {
    /// Hazen-Williams headloss exponent n.
    hw_exponent: Real,
    /// Consumption-law exponent e.
    pda_exponent: Real,
    /// Odd cubic `a1·q + a3·q³` replacing the reduced headloss on
    /// `|q| <= FLOW_BAND`.
    friction: [Real; 2],
    /// Cubic in z replacing `z^e` on `|z| < FRACTION_BAND`
    /// (coefficients of z³, z², z, 1).
    low: [Real; 4],
    /// Cubic in u = z - 1 replacing the law on `|u| < FRACTION_BAND`.
    high: [Real; 4],
}

fn cubic(c: &[Real; 4], x: Real) -> Real {
    ((c[0] * x + c[1]) * x + c[2]) * x + c[3]
}

fn d_cubic(c: &[Real; 4], x: Real) -> Real {
    (3.0 * c[0] * x + 2.0 * c[1]) * x + c[2]
}

impl SmoothingPolys {
    /// Fit all polynomials for the given exponents.
    pub fn build(hw_exponent: Real, pda_exponent: Real) -> SolverResult<Self> {
        let friction = fit_friction(hw_exponent)?;
        let low = fit_low(pda_exponent)?;
        let high = fit_high(pda_exponent)?;
        Ok(Self {
            hw_exponent,
            pda_exponent,
            friction,
            low,
            high,
        })
    }

    /// Regularized reduced headloss `|q|^(n-1)·q`.
    pub fn reduced_headloss(&self, q: Real) -> Real {
        if q.abs() <= FLOW_BAND {
            self.friction[0] * q + self.friction[1] * q * q * q
        } else {
            q.abs().powf(self.hw_exponent - 1.0) * q
        }
    }

    /// Derivative of [`Self::reduced_headloss`] with respect to q.
    /// Strictly positive everywhere.
    pub fn d_reduced_headloss(&self, q: Real) -> Real {
        if q.abs() <= FLOW_BAND {
            self.friction[0] + 3.0 * self.friction[1] * q * q
        } else {
            self.hw_exponent * q.abs().powf(self.hw_exponent - 1.0)
        }
    }

    /// Regularized consumption fraction: `z^e` clamped to [0, 1] with
    /// cubic blends near both clamp points.
    pub fn consumption_fraction(&self, z: Real) -> Real {
        let eps = FRACTION_BAND;
        if z <= -eps {
            0.0
        } else if z < eps {
            cubic(&self.low, z)
        } else if z <= 1.0 - eps {
            z.powf(self.pda_exponent)
        } else if z < 1.0 + eps {
            cubic(&self.high, z - 1.0)
        } else {
            1.0
        }
    }

    /// Derivative of [`Self::consumption_fraction`] with respect to z.
    /// Non-negative everywhere.
    pub fn d_consumption_fraction(&self, z: Real) -> Real {
        let eps = FRACTION_BAND;
        if z <= -eps {
            0.0
        } else if z < eps {
            d_cubic(&self.low, z)
        } else if z <= 1.0 - eps {
            self.pda_exponent * z.powf(self.pda_exponent - 1.0)
        } else if z < 1.0 + eps {
            d_cubic(&self.high, z - 1.0)
        } else {
            0.0
        }
    }
}

/// Fit `p(q) = a1·q + a3·q³` to the reduced headloss at q = FLOW_BAND.
///
/// The true function is odd, so matching value and derivative at the
/// positive band edge also matches them at the negative edge; no even
/// terms are needed. Solved in t = q/band: `b1·t + b3·t³` with
/// `p(band) = band^n` and `p'(band) = n·band^(n-1)`.
fn fit_friction(n: Real) -> SolverResult<[Real; 2]> {
    let eps = FLOW_BAND;
    let value = eps.powf(n);
    let slope_t = n * eps.powf(n - 1.0) * eps; // dp/dt at t = 1
    let f = move |b: &DVector<Real>| -> SolverResult<DVector<Real>> {
        Ok(DVector::from_vec(vec![
            b[0] + b[1] - value,
            b[0] + 3.0 * b[1] - slope_t,
        ]))
    };
    let guess = DVector::from_vec(vec![value, 0.0]);
    let b = newton_root(guess, f, &NewtonConfig::default())?;
    Ok([b[0] / eps, b[1] / (eps * eps * eps)])
}

/// Fit a cubic in t ∈ [-1, 1] to the given values/derivatives (in t) at
/// the two band edges, then rescale to the raw coordinate.
fn fit_band_cubic(
    value_lo: Real,
    slope_t_lo: Real,
    value_hi: Real,
    slope_t_hi: Real,
    band: Real,
) -> SolverResult<[Real; 4]> {
    let f = move |c: &DVector<Real>| -> SolverResult<DVector<Real>> {
        let c = [c[0], c[1], c[2], c[3]];
        Ok(DVector::from_vec(vec![
            cubic(&c, -1.0) - value_lo,
            d_cubic(&c, -1.0) - slope_t_lo,
            cubic(&c, 1.0) - value_hi,
            d_cubic(&c, 1.0) - slope_t_hi,
        ]))
    };
    let b = newton_root(DVector::zeros(4), f, &NewtonConfig::default())?;
    Ok([
        b[0] / (band * band * band),
        b[1] / (band * band),
        b[2] / band,
        b[3],
    ])
}

/// Low-pressure cubic: zero value and slope at z = -eps, matching `z^e`
/// at z = +eps.
fn fit_low(e: Real) -> SolverResult<[Real; 4]> {
    let eps = FRACTION_BAND;
    fit_band_cubic(0.0, 0.0, eps.powf(e), e * eps.powf(e - 1.0) * eps, eps)
}

/// Full-service cubic (in u = z - 1): matching `z^e` at u = -eps, unit
/// value and zero slope at u = +eps.
fn fit_high(e: Real) -> SolverResult<[Real; 4]> {
    let eps = FRACTION_BAND;
    let z0 = 1.0 - eps;
    fit_band_cubic(z0.powf(e), e * z0.powf(e - 1.0) * eps, 1.0, 0.0, eps)
}
