//! Fitting closed-form variogram models to an empirical variogram.
//!
//! With nugget `c₀`, partial sill `c` and range `a`, for `h > 0`:
//!
//! ```text
//! spherical:    c₀ + c·(1.5·h/a − 0.5·(h/a)³)   for h < a,   c₀ + c beyond
//! exponential:  c₀ + c·(1 − exp(−h/a))
//! gaussian:     c₀ + c·(1 − exp(−(h/a)²))
//! nugget:       c₀
//! ```
//!
//! and `γ(0) = 0` for every family. Parameters are fitted by weighted
//! Levenberg–Marquardt; the optimizer works on unconstrained values and
//! the model reads their magnitudes, so reported parameters are
//! non-negative. Whether the optimizer converged is part of the result,
//! never an error.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{InferenceError, Result};
use crate::optimize::{leastsq, LeastSquaresOptions};
use crate::variogram::VariogramPoint;

/// Closed-form variogram families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    #[default]
    Spherical,
    Exponential,
    Gaussian,
    /// Pure nugget: constant semivariance beyond the origin.
    Nugget,
}

impl ModelFamily {
    /// Semivariance at separation `h`.
    pub fn evaluate(self, h: f64, nugget: f64, sill: f64, range: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        let structured = match self {
            Self::Nugget => 0.0,
            Self::Spherical => {
                if h < range {
                    let r = h / range;
                    1.5 * r - 0.5 * r * r * r
                } else {
                    1.0
                }
            }
            Self::Exponential => 1.0 - (-h / range).exp(),
            Self::Gaussian => {
                let r = h / range;
                1.0 - (-r * r).exp()
            }
        };
        nugget + sill * structured
    }

    fn n_params(self) -> usize {
        match self {
            Self::Nugget => 1,
            _ => 3,
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Spherical => "Sph",
            Self::Exponential => "Exp",
            Self::Gaussian => "Gau",
            Self::Nugget => "Nug",
        })
    }
}

/// Weights of the squared residuals in the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitWeighting {
    /// All bins count equally.
    Ordinary,
    /// `N_j / h_j²`: well-populated, short-lag bins dominate.
    #[default]
    PairsOverDistanceSquared,
}

/// Starting values for the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub nugget: f64,
    /// Partial sill.
    pub sill: f64,
    pub range: f64,
}

impl InitialGuess {
    /// Heuristic start: nugget from the first bin, sill from the largest
    /// semivariance, range a third of the largest lag.
    pub fn from_points(points: &[VariogramPoint]) -> Option<Self> {
        let first = points.first()?;
        let max_gamma = points.iter().map(|p| p.gamma).fold(f64::NEG_INFINITY, f64::max);
        let max_lag = points.iter().map(|p| p.lag_distance).fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            nugget: first.gamma.max(0.0),
            sill: (max_gamma - first.gamma).max(max_gamma * 0.5),
            range: max_lag / 3.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub weighting: FitWeighting,
    pub max_iter: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            weighting: FitWeighting::default(),
            max_iter: 200,
        }
    }
}

/// Fitted variogram model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariogramFit {
    pub family: ModelFamily,
    pub nugget: f64,
    /// Partial sill; the total sill is `nugget + sill`.
    pub sill: f64,
    pub range: f64,
    pub converged: bool,
    pub iterations: usize,
    /// Weighted residual sum of squares at the reported parameters.
    pub weighted_sse: f64,
}

impl VariogramFit {
    pub fn total_sill(&self) -> f64 {
        self.nugget + self.sill
    }

    pub fn evaluate(&self, h: f64) -> f64 {
        self.family.evaluate(h, self.nugget, self.sill, self.range)
    }

    /// Model curve sampled at `lags`, for overlaying on the empirical points.
    pub fn curve(&self, lags: &[f64]) -> Vec<(f64, f64)> {
        lags.iter().map(|&h| (h, self.evaluate(h))).collect()
    }
}

/// Fits `family` to the non-empty bins of an empirical variogram.
///
/// Bins at zero lag carry no information about the model (γ(0) = 0 by
/// definition) and are skipped.
///
/// # Errors
/// - [`InferenceError::InvalidInput`] for a non-finite or negative initial
///   guess, a non-positive initial range, or non-finite points.
/// - [`InferenceError::InsufficientData`] with fewer usable bins than
///   model parameters.
pub fn fit_theoretical_model(
    points: &[VariogramPoint],
    family: ModelFamily,
    initial_guess: InitialGuess,
    options: &FitOptions,
) -> Result<VariogramFit> {
    let InitialGuess {
        nugget,
        sill,
        range,
    } = initial_guess;
    if ![nugget, sill, range].iter().all(|v| v.is_finite() && *v >= 0.0) {
        return Err(InferenceError::invalid(format!(
            "initial guess must be finite and non-negative, got {initial_guess:?}"
        )));
    }
    if family != ModelFamily::Nugget && range <= 0.0 {
        return Err(InferenceError::invalid("initial range must be positive"));
    }

    let usable: Vec<&VariogramPoint> = points.iter().filter(|p| p.lag_distance > 0.0).collect();
    if usable
        .iter()
        .any(|p| !p.lag_distance.is_finite() || !p.gamma.is_finite())
    {
        return Err(InferenceError::invalid("non-finite variogram point"));
    }
    let k = family.n_params();
    if usable.len() < k {
        return Err(InferenceError::insufficient(k, usable.len(), "variogram model fit"));
    }

    let raw_weights: Vec<f64> = usable
        .iter()
        .map(|p| match options.weighting {
            FitWeighting::Ordinary => 1.0,
            FitWeighting::PairsOverDistanceSquared => {
                p.pair_count as f64 / (p.lag_distance * p.lag_distance)
            }
        })
        .collect();
    let mean_weight = raw_weights.iter().sum::<f64>() / raw_weights.len() as f64;
    if mean_weight.is_nan() || mean_weight <= 0.0 {
        return Err(InferenceError::invalid("variogram bins carry no weight"));
    }
    let sqrt_w: Vec<f64> = raw_weights.iter().map(|w| (w / mean_weight).sqrt()).collect();

    let unpack = |p: &[f64]| -> (f64, f64, f64) {
        match family {
            ModelFamily::Nugget => (p[0].abs(), 0.0, 0.0),
            _ => (p[0].abs(), p[1].abs(), p[2].abs()),
        }
    };
    let residual = |p: &[f64]| -> Vec<f64> {
        let (c0, c, a) = unpack(p);
        usable
            .iter()
            .zip(&sqrt_w)
            .map(|(pt, sw)| sw * (family.evaluate(pt.lag_distance, c0, c, a) - pt.gamma))
            .collect()
    };

    let x0: Vec<f64> = match family {
        ModelFamily::Nugget => vec![nugget],
        _ => vec![nugget, sill, range],
    };
    let lsq_options = LeastSquaresOptions {
        max_iter: options.max_iter,
        ..LeastSquaresOptions::default()
    };
    let solution = leastsq(residual, &x0, &lsq_options)?;
    let (nugget, sill, range) = unpack(&solution.x);

    let parameters_valid = [nugget, sill, range].iter().all(|v| v.is_finite())
        && (family == ModelFamily::Nugget || range > 0.0);
    let converged = solution.converged && parameters_valid;
    if converged {
        debug!(
            %family,
            nugget,
            sill,
            range,
            iterations = solution.iterations,
            "variogram model fitted"
        );
    } else {
        warn!(
            %family,
            nugget,
            sill,
            range,
            optimizer_converged = solution.converged,
            "variogram model fit did not converge"
        );
    }

    Ok(VariogramFit {
        family,
        nugget,
        sill,
        range,
        converged,
        iterations: solution.iterations,
        weighted_sse: solution.cost,
    })
}
