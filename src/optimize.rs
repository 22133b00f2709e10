//! Levenberg–Marquardt for small unconstrained nonlinear least squares.
//!
//! Minimizes `‖f(x)‖²` for a residual function `f: Rⁿ → Rᵐ`. Each step
//! solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀf
//! ```
//!
//! with a forward-difference Jacobian. λ shrinks by 10× after an accepted
//! step and grows by 10× after a rejected one, so the method moves between
//! Gauss–Newton and scaled gradient descent.

use tracing::{trace, warn};

use crate::error::{InferenceError, Result};
use crate::linalg::{self, norm};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// Solver tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresOptions {
    pub max_iter: usize,
    /// Stop when the cost falls below this fraction of the starting cost,
    /// or an accepted step reduces it by less than this fraction.
    pub f_tol: f64,
    /// Stop when every step component satisfies
    /// `|δⱼ| ≤ x_tol · (|xⱼ| + x_tol)`.
    pub x_tol: f64,
    /// Stop when the largest cosine between the residual vector and a
    /// Jacobian column falls below this.
    pub g_tol: f64,
    /// Relative step of the finite-difference Jacobian.
    pub eps: f64,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            f_tol: 1e-14,
            x_tol: 1e-10,
            g_tol: 1e-12,
            eps: 1.5e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresResult {
    pub x: Vec<f64>,
    /// Residual vector at `x`.
    pub residuals: Vec<f64>,
    /// `‖f(x)‖²`.
    pub cost: f64,
    pub iterations: usize,
    /// Residual function evaluations, Jacobian columns included.
    pub nfev: usize,
    pub converged: bool,
}

/// Forward-difference Jacobian, `J[i][j] = ∂fᵢ/∂xⱼ`, stepping each
/// coordinate by `eps · |xⱼ|` (or `eps` at zero).
pub fn finite_difference_jacobian<F>(f: &F, x: &[f64], fx: &[f64], eps: f64) -> Vec<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut jacobian = vec![vec![0.0; x.len()]; fx.len()];
    let mut probe = x.to_vec();
    for j in 0..x.len() {
        let h = if x[j] == 0.0 { eps } else { eps * x[j].abs() };
        probe[j] = x[j] + h;
        let f_step = f(&probe);
        probe[j] = x[j];
        for (row, (fs, f0)) in jacobian.iter_mut().zip(f_step.iter().zip(fx)) {
            row[j] = (fs - f0) / h;
        }
    }
    jacobian
}

fn sum_of_squares(v: &[f64]) -> f64 {
    linalg::dot(v, v)
}

/// `max_j |(Jᵀf)ⱼ| / (‖f‖·‖J₍ⱼ₎‖)`; columns without sensitivity are skipped.
fn scaled_gradient(jtj: &[Vec<f64>], jtf: &[f64], f_norm: f64) -> f64 {
    if f_norm == 0.0 {
        return 0.0;
    }
    jtf.iter()
        .enumerate()
        .filter(|(j, _)| jtj[*j][*j] > 0.0)
        .map(|(j, g)| g.abs() / (f_norm * jtj[j][j].sqrt()))
        .fold(0.0, f64::max)
}

/// Levenberg–Marquardt minimization of `‖f(x)‖²` from `x0`.
///
/// Every stopping test is relative, so rescaling the data or the
/// parameters does not change when the solver stops.
///
/// Running out of iterations is not an error: the best point found so far
/// is returned with `converged: false`.
///
/// # Errors
/// [`InferenceError::InvalidInput`] for an empty `x0`, a residual function
/// returning no residuals, or a non-finite cost at `x0`.
///
/// # Examples
/// ```
/// use u_inference::optimize::{leastsq, LeastSquaresOptions};
/// let xs = [0.0, 1.0, 2.0, 3.0];
/// let residual = |p: &[f64]| -> Vec<f64> {
///     xs.iter().map(|&x| p[0] * (-p[1] * x).exp() - 2.0 * (-0.5 * x).exp()).collect()
/// };
/// let r = leastsq(residual, &[1.0, 1.0], &LeastSquaresOptions::default()).unwrap();
/// assert!(r.converged);
/// assert!((r.x[0] - 2.0).abs() < 1e-6 && (r.x[1] - 0.5).abs() < 1e-6);
/// ```
#[allow(clippy::needless_range_loop)]
pub fn leastsq<F>(f: F, x0: &[f64], options: &LeastSquaresOptions) -> Result<LeastSquaresResult>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x0.len();
    if n == 0 {
        return Err(InferenceError::invalid("leastsq: empty initial guess"));
    }

    let mut x = x0.to_vec();
    let mut fx = f(&x);
    let mut nfev = 1;
    let m = fx.len();
    if m == 0 {
        return Err(InferenceError::invalid("leastsq: residual function returned no residuals"));
    }
    let mut cost = sum_of_squares(&fx);
    if !cost.is_finite() {
        return Err(InferenceError::invalid("leastsq: non-finite cost at the initial guess"));
    }

    let done = |x: Vec<f64>, residuals: Vec<f64>, cost: f64, iterations: usize, nfev: usize| {
        Ok::<_, InferenceError>(LeastSquaresResult {
            x,
            residuals,
            cost,
            iterations,
            nfev,
            converged: true,
        })
    };

    let cost0 = cost;
    let mut lambda = LAMBDA_INIT;
    for iter in 0..options.max_iter {
        if cost <= options.f_tol * cost0 {
            return done(x, fx, cost, iter, nfev);
        }

        let jacobian = finite_difference_jacobian(&f, &x, &fx, options.eps);
        nfev += n;

        let jtj = linalg::gram(&jacobian, n);
        let jtf = linalg::cross(&jacobian, &fx, n);
        let grad_norm = scaled_gradient(&jtj, &jtf, cost.sqrt());
        if grad_norm < options.g_tol {
            return done(x, fx, cost, iter, nfev);
        }

        let mut damped = jtj.clone();
        for i in 0..n {
            damped[i][i] = if jtj[i][i] > 0.0 {
                jtj[i][i] * (1.0 + lambda)
            } else {
                lambda
            };
        }
        let neg_jtf: Vec<f64> = jtf.iter().map(|g| -g).collect();
        let Some(dx) = linalg::solve(&damped, &neg_jtf) else {
            lambda = (lambda * LAMBDA_UP).min(LAMBDA_MAX);
            continue;
        };

        let x_new: Vec<f64> = x.iter().zip(&dx).map(|(a, d)| a + d).collect();
        let fx_new = f(&x_new);
        nfev += 1;
        let cost_new = sum_of_squares(&fx_new);
        let dx_norm = norm(&dx);
        let small_step = dx
            .iter()
            .zip(&x)
            .all(|(d, xi)| d.abs() <= options.x_tol * (xi.abs() + options.x_tol));
        trace!(iter, cost, cost_new, lambda, grad_norm, dx_norm, "levenberg-marquardt step");

        if cost_new.is_finite() && cost_new < cost {
            let reduction = (cost - cost_new) / cost;
            x = x_new;
            fx = fx_new;
            cost = cost_new;
            if small_step || reduction < options.f_tol {
                return done(x, fx, cost, iter + 1, nfev);
            }
            lambda = (lambda * LAMBDA_DOWN).max(LAMBDA_MIN);
        } else {
            // no improvement available at this resolution
            if small_step {
                return done(x, fx, cost, iter + 1, nfev);
            }
            lambda = (lambda * LAMBDA_UP).min(LAMBDA_MAX);
        }
    }

    warn!(max_iter = options.max_iter, cost, "levenberg-marquardt did not converge");
    Ok(LeastSquaresResult {
        x,
        residuals: fx,
        cost,
        iterations: options.max_iter,
        nfev,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_fit() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 3.0, 5.0, 7.0, 9.0];
        let residual = |p: &[f64]| -> Vec<f64> {
            xs.iter().zip(&ys).map(|(&x, &y)| p[0] + p[1] * x - y).collect()
        };
        let r = leastsq(residual, &[0.0, 0.0], &LeastSquaresOptions::default()).unwrap();
        assert!(r.converged);
        assert!((r.x[0] - 1.0).abs() < 1e-6);
        assert!((r.x[1] - 2.0).abs() < 1e-6);
        assert!(r.cost < 1e-10);
    }

    #[test]
    fn test_stopping_is_scale_free() {
        // starting cost is already far below f_tol in absolute terms
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let residual = |p: &[f64]| -> Vec<f64> {
            xs.iter()
                .map(|&x| p[0] + p[1] * x - 1e-9 * (1.0 + 2.0 * x))
                .collect()
        };
        let r = leastsq(residual, &[0.0, 0.0], &LeastSquaresOptions::default()).unwrap();
        assert!(r.converged);
        assert!(r.iterations > 0);
        assert!((r.x[0] / 1e-9 - 1.0).abs() < 1e-6, "{r:?}");
        assert!((r.x[1] / 2e-9 - 1.0).abs() < 1e-6, "{r:?}");
    }

    #[test]
    fn test_rosenbrock() {
        let residual = |p: &[f64]| vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]];
        let r = leastsq(residual, &[-1.2, 1.0], &LeastSquaresOptions::default()).unwrap();
        assert!(r.converged);
        assert!((r.x[0] - 1.0).abs() < 1e-6);
        assert!((r.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_noisy_fit_converges_with_positive_cost() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [1.1, 2.9, 5.2, 6.8, 9.1, 11.0];
        let residual = |p: &[f64]| -> Vec<f64> {
            xs.iter().zip(&ys).map(|(&x, &y)| p[0] + p[1] * x - y).collect()
        };
        let r = leastsq(residual, &[0.0, 0.0], &LeastSquaresOptions::default()).unwrap();
        assert!(r.converged);
        assert!(r.cost > 0.0);
        assert_eq!(r.residuals.len(), 6);
    }

    #[test]
    fn test_iteration_limit_reports_not_converged() {
        let residual = |p: &[f64]| vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]];
        let options = LeastSquaresOptions {
            max_iter: 2,
            ..Default::default()
        };
        let r = leastsq(residual, &[-1.2, 1.0], &options).unwrap();
        assert!(!r.converged);
        assert_eq!(r.iterations, 2);
    }

    #[test]
    fn test_invalid_input() {
        let f = |_: &[f64]| vec![1.0];
        assert!(leastsq(f, &[], &LeastSquaresOptions::default()).is_err());
        let empty = |_: &[f64]| Vec::new();
        assert!(leastsq(empty, &[1.0], &LeastSquaresOptions::default()).is_err());
        let nan = |_: &[f64]| vec![f64::NAN];
        assert!(leastsq(nan, &[1.0], &LeastSquaresOptions::default()).is_err());
    }

    #[test]
    fn test_jacobian() {
        let f = |p: &[f64]| vec![p[0] * p[0], p[0] * p[1]];
        let x = [3.0, 2.0];
        let j = finite_difference_jacobian(&f, &x, &f(&x), 1e-7);
        assert!((j[0][0] - 6.0).abs() < 1e-5);
        assert!(j[0][1].abs() < 1e-9);
        assert!((j[1][0] - 2.0).abs() < 1e-5);
        assert!((j[1][1] - 3.0).abs() < 1e-5);

        // the step follows the size of each coordinate
        let small = [3e-9, 0.0];
        let j = finite_difference_jacobian(&f, &small, &f(&small), 1e-7);
        assert!((j[0][0] / 6e-9 - 1.0).abs() < 1e-5);
        assert!((j[1][1] / 3e-9 - 1.0).abs() < 1e-5);
    }
}
