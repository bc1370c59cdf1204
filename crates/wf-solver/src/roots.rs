//! General-purpose Newton root finder with finite-difference Jacobian.
//!
//! Used once per run to fit the smoothing polynomials: their coefficient
//! systems are tiny (2 and 4 unknowns), so a dense LU solve with a
//! forward-difference Jacobian is plenty.

use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector};

/// Root finder configuration.
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute tolerance for the residual norm
    pub abs_tol: f64,
    /// Finite-difference step scale
    pub fd_epsilon: f64,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-12,
            fd_epsilon: 1e-7,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
        }
    }
}

/// Compute the Jacobian using forward finite differences.
///
/// For each column j, perturbs x[j] and computes (f(x+e) - f(x))/e.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let n = x.len();
    let f_x = f(x)?;
    let m = f_x.len();

    let mut jac = DMatrix::zeros(m, n);

    for j in 0..n {
        let mut x_perturbed = x.clone();
        let dx = epsilon * x[j].abs().max(1.0);
        x_perturbed[j] += dx;

        let f_perturbed = f(&x_perturbed)?;
        let df = (f_perturbed - &f_x) / dx;

        for i in 0..m {
            jac[(i, j)] = df[i];
        }
    }

    Ok(jac)
}

/// Solve `f(x) = 0` by damped Newton iteration.
pub fn newton_root<F>(x0: DVector<f64>, f: F, config: &NewtonConfig) -> SolverResult<DVector<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let mut x = x0;
    let mut r = f(&x)?;
    let mut r_norm = r.norm();

    for _ in 0..config.max_iterations {
        if r_norm < config.abs_tol {
            return Ok(x);
        }

        let jac = finite_difference_jacobian(&x, &f, config.fd_epsilon)?;

        let dx = jac
            .lu()
            .solve(&(-r.clone()))
            .ok_or_else(|| SolverError::RootFind {
                what: "singular Jacobian in polynomial fit".to_string(),
            })?;

        // Backtracking line search on the residual norm.
        let mut alpha = 1.0;
        let mut x_new = &x + alpha * &dx;
        let mut r_new = f(&x_new)?;
        let mut r_new_norm = r_new.norm();

        for _ in 0..config.max_line_search_iters {
            if r_new_norm < r_norm {
                break;
            }
            alpha *= config.line_search_beta;
            x_new = &x + alpha * &dx;
            r_new = f(&x_new)?;
            r_new_norm = r_new.norm();
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;

        if alpha < 1e-10 {
            return Err(SolverError::RootFind {
                what: "line search stagnated".to_string(),
            });
        }
    }

    if r_norm < config.abs_tol.max(1e-9) {
        return Ok(x);
    }
    Err(SolverError::RootFind {
        what: format!("no convergence, residual norm {r_norm:.3e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_quadratic() {
        // Solve x^2 - 4 = 0
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] * x[0] - 4.0))
        };

        let x0 = DVector::from_element(1, 3.0);
        let x = newton_root(x0, f, &NewtonConfig::default()).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn linear_system_one_shot() {
        // 2x2 linear system converges in a single iteration.
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_vec(vec![
                2.0 * x[0] + x[1] - 5.0,
                x[0] - x[1] + 1.0,
            ]))
        };
        let x = newton_root(DVector::zeros(2), f, &NewtonConfig::default()).unwrap();
        assert!((x[0] - 4.0 / 3.0).abs() < 1e-6);
        assert!((x[1] - 7.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn jacobian_quadratic() {
        // f(x) = x^2, J = 2*x
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] * x[0]))
        };

        let x = DVector::from_element(1, 3.0);
        let jac = finite_difference_jacobian(&x, f, 1e-7).unwrap();
        assert!((jac[(0, 0)] - 6.0).abs() < 1e-5);
    }
}
