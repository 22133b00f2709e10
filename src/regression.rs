//! Ordinary least squares with an optional categorical factor.
//!
//! # Model
//!
//! ```text
//! y = Xβ + ε,   β̂ = (XᵀX)⁻¹ Xᵀy,   σ̂² = RSS / (n − p)
//! SE(β̂ⱼ) = √(σ̂² [(XᵀX)⁻¹]ⱼⱼ),   t = β̂ⱼ / SE,   df = n − p
//! ```
//!
//! The factor uses treatment coding: its first level (in order of
//! appearance) is the baseline and every other level gets an indicator
//! column. How the factor enters the model is chosen explicitly through
//! [`GroupEffect`]; it is never inferred from the data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_finite, InferenceError, Result};
use crate::linalg;
use crate::special;
use crate::stats::kahan_sum;

/// Name of the intercept term.
pub const INTERCEPT: &str = "(Intercept)";

/// How a categorical factor participates alongside the first continuous
/// predictor `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupEffect {
    /// Parallel lines: `y ~ x + g`.
    #[default]
    Intercept,
    /// Common intercept, per-level slope: `y ~ x + x:g`.
    Slope,
    /// Separate lines: `y ~ x * g`.
    Interaction,
}

/// A named continuous predictor column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictor {
    pub name: String,
    pub values: Vec<f64>,
}

impl Predictor {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A categorical column and the way it enters the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub name: String,
    pub labels: Vec<String>,
    pub effect: GroupEffect,
}

impl Factor {
    pub fn new<I, S>(name: impl Into<String>, labels: I, effect: GroupEffect) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
            effect,
        }
    }

    /// Distinct levels in order of first appearance.
    pub fn levels(&self) -> Vec<String> {
        let mut levels: Vec<String> = Vec::new();
        for label in &self.labels {
            if !levels.contains(label) {
                levels.push(label.clone());
            }
        }
        levels
    }
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub standard_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearFit {
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub r_squared_adjusted: f64,
    pub residual_standard_error: f64,
    pub residual_df: usize,
    /// Overall F test against the intercept-only model; `None` when the
    /// model has no term besides the intercept.
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
    pub fitted: Vec<f64>,
    /// `response − fitted`.
    pub residuals: Vec<f64>,
    #[serde(skip)]
    n_predictors: usize,
}

impl LinearFit {
    pub fn estimates(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.estimate).collect()
    }

    pub fn standard_errors(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.standard_error).collect()
    }

    pub fn t_values(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.t_value).collect()
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.p_value).collect()
    }

    /// Looks up a coefficient by term name.
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// Evaluates the fitted equation on new predictor rows.
    ///
    /// Factor terms are left out, so for a grouped model the prediction is
    /// for the baseline level.
    ///
    /// # Errors
    /// [`InferenceError::DimensionMismatch`] if a row does not have one
    /// value per continuous predictor.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let beta: Vec<f64> = self.coefficients[..=self.n_predictors]
            .iter()
            .map(|c| c.estimate)
            .collect();
        rows.iter()
            .map(|row| {
                if row.len() != self.n_predictors {
                    return Err(InferenceError::mismatch(
                        self.n_predictors,
                        row.len(),
                        "prediction row",
                    ));
                }
                Ok(beta[0] + linalg::dot(&beta[1..], row))
            })
            .collect()
    }
}

/// Builds the design matrix and term names.
fn design(
    predictors: &[Predictor],
    n: usize,
    factor: Option<&Factor>,
) -> Result<(Vec<Vec<f64>>, Vec<String>)> {
    let mut names = vec![INTERCEPT.to_string()];
    names.extend(predictors.iter().map(|p| p.name.clone()));
    let mut rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = Vec::with_capacity(names.len());
            row.push(1.0);
            row.extend(predictors.iter().map(|p| p.values[i]));
            row
        })
        .collect();

    let Some(factor) = factor else {
        return Ok((rows, names));
    };

    let levels = factor.levels();
    if levels.len() < 2 {
        return Err(InferenceError::invalid(format!(
            "factor {} needs at least 2 levels, found {}",
            factor.name,
            levels.len()
        )));
    }
    let x = match (factor.effect, predictors.first()) {
        (GroupEffect::Intercept, _) => None,
        (_, Some(p)) => Some(p),
        (_, None) => {
            return Err(InferenceError::invalid(
                "slope and interaction effects need a continuous predictor",
            ))
        }
    };
    let index: HashMap<&str, usize> = levels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    let contrasts = &levels[1..];
    let with_dummies = factor.effect != GroupEffect::Slope;
    let with_slopes = factor.effect != GroupEffect::Intercept;
    if with_dummies {
        names.extend(contrasts.iter().map(|l| format!("{}{l}", factor.name)));
    }
    if let Some(x) = x.filter(|_| with_slopes) {
        names.extend(contrasts.iter().map(|l| format!("{}:{}{l}", x.name, factor.name)));
    }

    for (i, row) in rows.iter_mut().enumerate() {
        let level = index[factor.labels[i].as_str()];
        if with_dummies {
            row.extend((1..levels.len()).map(|j| if j == level { 1.0 } else { 0.0 }));
        }
        if let Some(x) = x.filter(|_| with_slopes) {
            row.extend((1..levels.len()).map(|j| if j == level { x.values[i] } else { 0.0 }));
        }
    }
    Ok((rows, names))
}

/// Fits `response ~ predictors [+ factor]` by ordinary least squares.
///
/// # Errors
/// - [`InferenceError::DimensionMismatch`] if a predictor or the factor
///   labels differ in length from the response.
/// - [`InferenceError::InsufficientData`] if `n ≤ p` (no residual degrees
///   of freedom).
/// - [`InferenceError::SingularDesign`] if the design is rank deficient.
/// - [`InferenceError::InvalidInput`] for non-finite values, a factor with
///   a single level, or a slope/interaction effect without a predictor.
///
/// # Examples
/// ```
/// use u_inference::regression::{fit_linear_model, Predictor};
/// let x = Predictor::new("x", vec![1.0, 2.0, 3.0, 4.0]);
/// let fit = fit_linear_model(&[x], &[3.0, 5.0, 7.0, 9.0], None).unwrap();
/// let b = fit.estimates();
/// assert!((b[0] - 1.0).abs() < 1e-10 && (b[1] - 2.0).abs() < 1e-10);
/// ```
pub fn fit_linear_model(
    predictors: &[Predictor],
    response: &[f64],
    factor: Option<&Factor>,
) -> Result<LinearFit> {
    let n = response.len();
    ensure_finite(response, "response")?;
    for p in predictors {
        if p.values.len() != n {
            return Err(InferenceError::mismatch(
                n,
                p.values.len(),
                format!("predictor {}", p.name),
            ));
        }
        ensure_finite(&p.values, &p.name)?;
    }
    if let Some(f) = factor {
        if f.labels.len() != n {
            return Err(InferenceError::mismatch(n, f.labels.len(), format!("factor {}", f.name)));
        }
    }

    let (x, names) = design(predictors, n, factor)?;
    let p = names.len();
    if n <= p {
        return Err(InferenceError::insufficient(p + 1, n, "linear model"));
    }

    let xtx_inv =
        linalg::invert(&linalg::gram(&x, p)).ok_or_else(|| InferenceError::SingularDesign {
            context: format!("{p} terms: {}", names.join(", ")),
        })?;
    let beta = linalg::mat_vec(&xtx_inv, &linalg::cross(&x, response, p));

    let fitted = linalg::mat_vec(&x, &beta);
    let residuals: Vec<f64> = response.iter().zip(&fitted).map(|(y, f)| y - f).collect();

    let df = n - p;
    let rss = kahan_sum(&residuals.iter().map(|r| r * r).collect::<Vec<_>>());
    let sigma2 = rss / df as f64;
    let y_bar = kahan_sum(response) / n as f64;
    let tss = kahan_sum(&response.iter().map(|y| (y - y_bar).powi(2)).collect::<Vec<_>>());

    let coefficients = names
        .into_iter()
        .zip(&beta)
        .enumerate()
        .map(|(j, (term, &estimate))| {
            let standard_error = (sigma2 * xtx_inv[j][j]).max(0.0).sqrt();
            let t_value = if standard_error > 0.0 {
                estimate / standard_error
            } else if estimate == 0.0 {
                0.0
            } else {
                estimate.signum() * f64::INFINITY
            };
            let p_value = (2.0 * special::t_sf(t_value.abs(), df as f64)).min(1.0);
            Coefficient {
                term,
                estimate,
                standard_error,
                t_value,
                p_value,
            }
        })
        .collect();

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let r_squared_adjusted = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df as f64;

    let model_df = (p - 1) as f64;
    let mss = (tss - rss).max(0.0);
    let f_statistic = match (p > 1, rss > 0.0) {
        (false, _) => None,
        (true, true) => Some((mss / model_df) / sigma2),
        (true, false) if mss > 0.0 => Some(f64::INFINITY),
        (true, false) => None,
    };
    let f_p_value = f_statistic.map(|f| {
        if f.is_infinite() {
            0.0
        } else {
            special::f_sf(f, model_df, df as f64)
        }
    });

    debug!(n, p, r_squared, sigma = sigma2.sqrt(), "fitted linear model");
    Ok(LinearFit {
        coefficients,
        r_squared,
        r_squared_adjusted,
        residual_standard_error: sigma2.sqrt(),
        residual_df: df,
        f_statistic,
        f_p_value,
        fitted,
        residuals,
        n_predictors: predictors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn simple() -> (Predictor, Vec<f64>) {
        (
            Predictor::new("x", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            vec![2.1, 3.9, 6.2, 7.8, 10.1],
        )
    }

    #[test]
    fn test_simple_regression() {
        let (x, y) = simple();
        let fit = fit_linear_model(&[x], &y, None).unwrap();
        let b = fit.estimates();
        assert!(close(b[0], 0.05, 1e-10));
        assert!(close(b[1], 1.99, 1e-10));
        assert_eq!(fit.residual_df, 3);
        assert_eq!(fit.coefficients[0].term, INTERCEPT);
        assert_eq!(fit.coefficients[1].term, "x");
        // RSS = 0.107, σ̂ = √(0.107 / 3)
        assert!(close(fit.residual_standard_error, (0.107_f64 / 3.0).sqrt(), 1e-10));
        // SE(slope) = σ̂ / √Sxx, Sxx = 10
        assert!(close(fit.coefficients[1].standard_error, (0.107_f64 / 30.0).sqrt(), 1e-10));
        assert!(close(fit.r_squared, 1.0 - 0.107 / 39.708, 1e-10));
        assert!(fit.coefficients[1].p_value < 1e-4);
        // F = t² for a single predictor
        let t = fit.coefficients[1].t_value;
        assert!(close(fit.f_statistic.unwrap(), t * t, 1e-6));
        assert!(close(fit.f_p_value.unwrap(), fit.coefficients[1].p_value, 1e-10));
    }

    #[test]
    fn test_micro_scale_predictor() {
        let xs: Vec<f64> = (1..=10).map(|i| i as f64 * 1e-7).collect();
        let y: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| 3.0 + 2e7 * x + if i % 2 == 0 { -0.1 } else { 0.1 })
            .collect();
        let fit = fit_linear_model(&[Predictor::new("x", xs)], &y, None).unwrap();
        let b = fit.estimates();
        assert!(close(b[0], 3.0, 0.1), "{b:?}");
        assert!(close(b[1] / 2e7, 1.0, 0.01), "{b:?}");
        assert!(fit.r_squared > 0.99);
        assert!(fit.coefficients[1].standard_error.is_finite());
    }

    #[test]
    fn test_residuals_are_response_minus_fitted() {
        let (x, y) = simple();
        let fit = fit_linear_model(&[x], &y, None).unwrap();
        for ((r, f), yi) in fit.residuals.iter().zip(&fit.fitted).zip(&y) {
            assert!(close(*r, yi - f, 1e-12));
        }
        // residuals of a model with intercept sum to zero
        assert!(fit.residuals.iter().sum::<f64>().abs() < 1e-10);
    }

    #[test]
    fn test_predict() {
        let (x, y) = simple();
        let fit = fit_linear_model(&[x], &y, None).unwrap();
        let pred = fit.predict(&[vec![0.0], vec![10.0]]).unwrap();
        assert!(close(pred[0], 0.05, 1e-10));
        assert!(close(pred[1], 19.95, 1e-10));
        assert!(matches!(
            fit.predict(&[vec![1.0, 2.0]]),
            Err(InferenceError::DimensionMismatch { .. })
        ));
    }

    fn two_lines() -> (Predictor, Vec<f64>, Vec<&'static str>) {
        // a: y = 1 + 2x, b: y = 4 + 0.5x, exactly
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut g = Vec::new();
        for &xi in &xs {
            x.push(xi);
            y.push(1.0 + 2.0 * xi);
            g.push("a");
        }
        for &xi in &xs {
            x.push(xi);
            y.push(4.0 + 0.5 * xi);
            g.push("b");
        }
        (Predictor::new("x", x), y, g)
    }

    #[test]
    fn test_interaction_recovers_both_lines() {
        let (x, y, g) = two_lines();
        let factor = Factor::new("group", g, GroupEffect::Interaction);
        let fit = fit_linear_model(&[x], &y, Some(&factor)).unwrap();
        let terms: Vec<&str> = fit.coefficients.iter().map(|c| c.term.as_str()).collect();
        assert_eq!(terms, vec![INTERCEPT, "x", "groupb", "x:groupb"]);
        let b = fit.estimates();
        assert!(close(b[0], 1.0, 1e-9));
        assert!(close(b[1], 2.0, 1e-9));
        assert!(close(b[2], 3.0, 1e-9));
        assert!(close(b[3], -1.5, 1e-9));
        assert!(fit.residuals.iter().all(|r| r.abs() < 1e-9));
        assert_eq!(fit.residual_df, 6);
    }

    #[test]
    fn test_intercept_and_slope_term_names() {
        let (x, y, g) = two_lines();
        let parallel = Factor::new("group", g.clone(), GroupEffect::Intercept);
        let fit = fit_linear_model(&[x.clone()], &y, Some(&parallel)).unwrap();
        let terms: Vec<&str> = fit.coefficients.iter().map(|c| c.term.as_str()).collect();
        assert_eq!(terms, vec![INTERCEPT, "x", "groupb"]);

        let slopes = Factor::new("group", g, GroupEffect::Slope);
        let fit = fit_linear_model(&[x], &y, Some(&slopes)).unwrap();
        let terms: Vec<&str> = fit.coefficients.iter().map(|c| c.term.as_str()).collect();
        assert_eq!(terms, vec![INTERCEPT, "x", "x:groupb"]);
        assert!(fit.coefficient("x:groupb").is_some());
    }

    #[test]
    fn test_errors() {
        let x = Predictor::new("x", vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            fit_linear_model(&[x.clone()], &[1.0, 2.0], None),
            Err(InferenceError::DimensionMismatch { .. })
        ));
        let short = Predictor::new("x", vec![1.0, 2.0]);
        assert!(matches!(
            fit_linear_model(&[short], &[1.0, 2.0], None),
            Err(InferenceError::InsufficientData { .. })
        ));
        let dup = Predictor::new("x2", vec![2.0, 4.0, 6.0]);
        assert!(matches!(
            fit_linear_model(&[x.clone(), dup], &[1.0, 2.0, 4.0], None),
            Err(InferenceError::InsufficientData { .. })
        ));
        let x4 = Predictor::new("x", vec![1.0, 2.0, 3.0, 4.0]);
        let x4d = Predictor::new("x2", vec![2.0, 4.0, 6.0, 8.0]);
        assert!(matches!(
            fit_linear_model(&[x4, x4d], &[1.0, 2.0, 4.0, 3.0], None),
            Err(InferenceError::SingularDesign { .. })
        ));
        let one_level = Factor::new("g", ["a", "a", "a"], GroupEffect::Intercept);
        assert!(matches!(
            fit_linear_model(&[x], &[1.0, 2.0, 4.0], Some(&one_level)),
            Err(InferenceError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_intercept_only() {
        let fit = fit_linear_model(&[], &[1.0, 2.0, 3.0, 6.0], None).unwrap();
        assert!(close(fit.estimates()[0], 3.0, 1e-12));
        assert!(fit.f_statistic.is_none());
        assert!(fit.r_squared.abs() < 1e-12);
    }
}
