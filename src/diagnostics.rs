//! Residual diagnostics for fitted linear models.
//!
//! The Breusch–Pagan test regresses squared residuals on auxiliary
//! regressors; a large chi-squared statistic signals non-constant variance.
//!
//! ```text
//! Studentized (Koenker):  LM = n · R²(e² ~ Z)
//! Original:               LM = ESS(e²/σ̂² ~ Z) / 2,   σ̂² = Σe² / n
//! df = number of auxiliary regressors (excluding the intercept)
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_finite, InferenceError, Result};
use crate::regression::{fit_linear_model, Predictor};
use crate::special;
use crate::stats::{self, kahan_sum, quantile_sorted, sorted};

/// Variance model of the Breusch–Pagan statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreuschPaganVariant {
    /// Koenker's `n·R²`, robust to non-normal errors.
    #[default]
    Studentized,
    /// The original score statistic, which assumes normal errors.
    Original,
}

/// Outcome of a heteroscedasticity test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heteroscedasticity {
    pub variant: BreuschPaganVariant,
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

/// Breusch–Pagan test with `predicted` as the single auxiliary regressor.
///
/// # Errors
/// See [`breusch_pagan`].
///
/// # Examples
/// ```
/// use u_inference::diagnostics::diagnose_residuals;
/// let predicted: Vec<f64> = (1..=8).map(f64::from).collect();
/// let residuals = [0.1, -0.2, 0.3, -0.5, 0.6, -0.9, 1.1, -1.4];
/// let h = diagnose_residuals(&residuals, &predicted).unwrap();
/// assert!(h.p_value < 0.05);
/// ```
pub fn diagnose_residuals(residuals: &[f64], predicted: &[f64]) -> Result<Heteroscedasticity> {
    breusch_pagan(
        residuals,
        &[Predictor::new("fitted", predicted.to_vec())],
        BreuschPaganVariant::default(),
    )
}

/// Breusch–Pagan test against arbitrary auxiliary regressors (typically the
/// model's own predictors).
///
/// # Errors
/// - [`InferenceError::DimensionMismatch`] if a regressor's length differs
///   from the residuals'.
/// - [`InferenceError::InsufficientData`] if there are too few residuals
///   for the auxiliary regression.
/// - [`InferenceError::InvalidInput`] for non-finite values or no regressors.
/// - [`InferenceError::DivisionUndefined`] for the original variant when all
///   residuals are zero.
/// - [`InferenceError::SingularDesign`] if the regressors are collinear.
pub fn breusch_pagan(
    residuals: &[f64],
    regressors: &[Predictor],
    variant: BreuschPaganVariant,
) -> Result<Heteroscedasticity> {
    if regressors.is_empty() {
        return Err(InferenceError::invalid("Breusch–Pagan test needs at least one regressor"));
    }
    ensure_finite(residuals, "residuals")?;
    let n = residuals.len();
    let squared: Vec<f64> = residuals.iter().map(|e| e * e).collect();

    let statistic = match variant {
        BreuschPaganVariant::Studentized => {
            let aux = fit_linear_model(regressors, &squared, None)?;
            n as f64 * aux.r_squared
        }
        BreuschPaganVariant::Original => {
            let sigma2 = kahan_sum(&squared) / n as f64;
            if sigma2 <= 0.0 {
                return Err(InferenceError::DivisionUndefined {
                    context: "Breusch–Pagan scaling by zero residual variance".into(),
                });
            }
            let scaled: Vec<f64> = squared.iter().map(|s| s / sigma2).collect();
            let aux = fit_linear_model(regressors, &scaled, None)?;
            let u_bar = kahan_sum(&scaled) / n as f64;
            let deviations: Vec<f64> = aux.fitted.iter().map(|f| (f - u_bar).powi(2)).collect();
            let ess = kahan_sum(&deviations);
            ess / 2.0
        }
    };

    let degrees_of_freedom = regressors.len();
    let p_value = special::chi_squared_sf(statistic, degrees_of_freedom as f64).clamp(0.0, 1.0);
    debug!(?variant, statistic, degrees_of_freedom, p_value, "Breusch–Pagan");
    Ok(Heteroscedasticity {
        variant,
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

/// Five-number summary of residuals, as printed above a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualQuantiles {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn residual_quantiles(residuals: &[f64]) -> Result<ResidualQuantiles> {
    if residuals.is_empty() {
        return Err(InferenceError::insufficient(1, 0, "residual quantiles"));
    }
    ensure_finite(residuals, "residuals")?;
    let s = sorted(residuals).ok_or_else(|| InferenceError::invalid("residuals contain NaN"))?;
    let q = |p| quantile_sorted(&s, p).unwrap_or(f64::NAN);
    Ok(ResidualQuantiles {
        min: s[0],
        q1: q(0.25),
        median: q(0.5),
        q3: q(0.75),
        max: s[s.len() - 1],
    })
}

/// One point of a normal Q-Q plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QqPoint {
    pub theoretical: f64,
    pub sample: f64,
}

/// Sorted sample quantiles against standard normal quantiles at Blom's
/// plotting positions `(i − 3/8) / (n + 1/4)`.
pub fn normal_qq_points(data: &[f64]) -> Result<Vec<QqPoint>> {
    ensure_finite(data, "Q-Q data")?;
    let s = sorted(data).ok_or_else(|| InferenceError::invalid("Q-Q data contain NaN"))?;
    let n = s.len() as f64;
    Ok(s.into_iter()
        .enumerate()
        .map(|(i, sample)| QqPoint {
            theoretical: special::inverse_normal_cdf((i as f64 + 1.0 - 0.375) / (n + 0.25)),
            sample,
        })
        .collect())
}

/// Correlation between the two coordinates of a Q-Q plot; close to 1 when
/// the data look normal. `None` with fewer than two points or a constant
/// sample.
pub fn qq_correlation(points: &[QqPoint]) -> Option<f64> {
    let theoretical: Vec<f64> = points.iter().map(|p| p.theoretical).collect();
    let sample: Vec<f64> = points.iter().map(|p| p.sample).collect();
    let denom = stats::std_dev(&theoretical)? * stats::std_dev(&sample)?;
    if denom > 0.0 {
        Some(stats::covariance(&theoretical, &sample)? / denom)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREDICTED: [f64; 8] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    const RESIDUALS: [f64; 8] = [0.1, -0.2, 0.3, -0.5, 0.6, -0.9, 1.1, -1.4];

    #[test]
    fn test_koenker_reference() {
        let h = diagnose_residuals(&RESIDUALS, &PREDICTED).unwrap();
        assert_eq!(h.variant, BreuschPaganVariant::Studentized);
        assert_eq!(h.degrees_of_freedom, 1);
        assert!((h.statistic - 6.702_597_818_837_002).abs() < 1e-9);
        assert!((h.p_value - 0.009_627_254_238_220_846).abs() < 1e-9);
    }

    #[test]
    fn test_statistic_ignores_fitted_scale() {
        let small: Vec<f64> = PREDICTED.iter().map(|p| p * 1e-7).collect();
        let h = diagnose_residuals(&RESIDUALS, &small).unwrap();
        assert!((h.statistic - 6.702_597_818_837_002).abs() < 1e-6);
    }

    #[test]
    fn test_original_reference() {
        let z = [Predictor::new("x", PREDICTED.to_vec())];
        let h = breusch_pagan(&RESIDUALS, &z, BreuschPaganVariant::Original).unwrap();
        assert!((h.statistic - 4.034_923_203_220_563).abs() < 1e-9);
        assert!((h.p_value - 0.044_567_703_738_283_67).abs() < 1e-9);
    }

    #[test]
    fn test_constant_variance_is_not_flagged() {
        let residuals = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let h = diagnose_residuals(&residuals, &PREDICTED).unwrap();
        assert!(h.statistic.abs() < 1e-12);
        assert!((h.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            diagnose_residuals(&RESIDUALS, &PREDICTED[..5]),
            Err(InferenceError::DimensionMismatch { .. })
        ));
        assert!(breusch_pagan(&RESIDUALS, &[], BreuschPaganVariant::Original).is_err());
        let z = [Predictor::new("x", PREDICTED.to_vec())];
        assert!(matches!(
            breusch_pagan(&[0.0; 8], &z, BreuschPaganVariant::Original),
            Err(InferenceError::DivisionUndefined { .. })
        ));
    }

    #[test]
    fn test_residual_quantiles() {
        let q = residual_quantiles(&[3.0, -1.0, 0.0, 2.0, 1.0]).unwrap();
        assert_eq!(q.min, -1.0);
        assert_eq!(q.q1, 0.0);
        assert_eq!(q.median, 1.0);
        assert_eq!(q.q3, 2.0);
        assert_eq!(q.max, 3.0);
        assert!(residual_quantiles(&[]).is_err());
    }

    #[test]
    fn test_qq_points_symmetric() {
        let pts = normal_qq_points(&[5.0, 1.0, 3.0]).unwrap();
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[0].sample, 1.0);
        assert!(pts[1].theoretical.abs() < 1e-12);
        assert!((pts[0].theoretical + pts[2].theoretical).abs() < 1e-9);
        assert!(pts[0].theoretical < 0.0);

        // evenly spaced sample against symmetric quantiles lies on a line
        assert!((qq_correlation(&pts).unwrap() - 1.0).abs() < 1e-12);
        let flat = normal_qq_points(&[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(qq_correlation(&flat), None);
        assert_eq!(qq_correlation(&[]), None);
    }

    #[test]
    fn test_qq_correlation_drops_for_skewed_data() {
        let skewed: Vec<f64> = (0..30).map(|i| (i as f64 / 3.0).exp()).collect();
        let r = qq_correlation(&normal_qq_points(&skewed).unwrap()).unwrap();
        assert!(r < 0.9, "{r}");
    }
}
