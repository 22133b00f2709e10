//! Sampling distributions used for inference.
//!
//! Each type validates its parameters once at construction and then
//! evaluates density, distribution and quantile functions through
//! [`special`](crate::special).
//!
//! | Distribution | Parameters | Mean | Variance |
//! |---|---|---|---|
//! | [`Normal`] | μ, σ | μ | σ² |
//! | [`StudentT`] | ν | 0 (ν > 1) | ν/(ν−2) (ν > 2) |
//! | [`ChiSquared`] | k | k | 2k |
//! | [`FisherF`] | d₁, d₂ | d₂/(d₂−2) (d₂ > 2) | see docs |

use serde::Serialize;
use thiserror::Error;

use crate::special;

/// Error type for invalid distribution parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    /// Parameters violate distribution constraints.
    #[error("invalid distribution parameters: {0}")]
    InvalidParameters(String),
}

fn require_positive(name: &str, value: f64, dist: &str) -> Result<(), DistributionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DistributionError::InvalidParameters(format!(
            "{dist} requires finite {name} > 0, got {name}={value}"
        )))
    }
}

fn in_open_unit(p: f64) -> bool {
    p > 0.0 && p < 1.0
}

// ============================================================================
// Normal
// ============================================================================

/// Normal distribution N(μ, σ²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    /// # Errors
    /// Returns `Err` if `sigma ≤ 0` or either parameter is not finite.
    pub fn new(mu: f64, sigma: f64) -> Result<Self, DistributionError> {
        if !mu.is_finite() {
            return Err(DistributionError::InvalidParameters(format!(
                "Normal requires finite μ, got μ={mu}"
            )));
        }
        require_positive("σ", sigma, "Normal")?;
        Ok(Self { mu, sigma })
    }

    /// N(0, 1).
    pub fn standard() -> Self {
        Self {
            mu: 0.0,
            sigma: 1.0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mu
    }

    pub fn std_dev(&self) -> f64 {
        self.sigma
    }

    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    pub fn pdf(&self, x: f64) -> f64 {
        special::standard_normal_pdf((x - self.mu) / self.sigma) / self.sigma
    }

    pub fn cdf(&self, x: f64) -> f64 {
        special::standard_normal_cdf((x - self.mu) / self.sigma)
    }

    pub fn sf(&self, x: f64) -> f64 {
        special::standard_normal_cdf((self.mu - x) / self.sigma)
    }

    /// `μ + σ·Φ⁻¹(p)`; `None` outside `(0, 1)`.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        in_open_unit(p).then(|| self.mu + self.sigma * special::inverse_normal_cdf(p))
    }
}

// ============================================================================
// Student's t
// ============================================================================

/// Student's t distribution with ν degrees of freedom (ν may be fractional,
/// as produced by the Welch–Satterthwaite approximation).
///
/// # Examples
/// ```
/// use u_inference::distributions::StudentT;
/// let t = StudentT::new(9.0).unwrap();
/// assert!((t.quantile(0.975).unwrap() - 2.262157).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StudentT {
    df: f64,
}

impl StudentT {
    /// # Errors
    /// Returns `Err` unless `df` is finite and positive.
    pub fn new(df: f64) -> Result<Self, DistributionError> {
        require_positive("ν", df, "StudentT")?;
        Ok(Self { df })
    }

    pub fn df(&self) -> f64 {
        self.df
    }

    /// Zero for ν > 1, undefined (`None`) otherwise.
    pub fn mean(&self) -> Option<f64> {
        (self.df > 1.0).then_some(0.0)
    }

    /// `ν/(ν−2)` for ν > 2, infinite for 1 < ν ≤ 2, undefined otherwise.
    pub fn variance(&self) -> Option<f64> {
        if self.df > 2.0 {
            Some(self.df / (self.df - 2.0))
        } else if self.df > 1.0 {
            Some(f64::INFINITY)
        } else {
            None
        }
    }

    pub fn pdf(&self, t: f64) -> f64 {
        special::t_pdf(t, self.df)
    }

    pub fn cdf(&self, t: f64) -> f64 {
        special::t_cdf(t, self.df)
    }

    pub fn sf(&self, t: f64) -> f64 {
        special::t_sf(t, self.df)
    }

    pub fn quantile(&self, p: f64) -> Option<f64> {
        in_open_unit(p).then(|| special::t_quantile(p, self.df))
    }
}

// ============================================================================
// Chi-squared
// ============================================================================

/// Chi-squared distribution with `k` degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquared {
    k: f64,
}

impl ChiSquared {
    /// # Errors
    /// Returns `Err` unless `k` is finite and positive.
    pub fn new(k: f64) -> Result<Self, DistributionError> {
        require_positive("k", k, "ChiSquared")?;
        Ok(Self { k })
    }

    pub fn df(&self) -> f64 {
        self.k
    }

    pub fn mean(&self) -> f64 {
        self.k
    }

    pub fn variance(&self) -> f64 {
        2.0 * self.k
    }

    pub fn cdf(&self, x: f64) -> f64 {
        special::chi_squared_cdf(x, self.k)
    }

    pub fn sf(&self, x: f64) -> f64 {
        special::chi_squared_sf(x, self.k)
    }

    /// Quantile by bisection on the CDF; `None` outside `(0, 1)`.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        in_open_unit(p).then(|| bisect_quantile(|x| self.cdf(x), p, self.k.max(1.0)))
    }
}

// ============================================================================
// F
// ============================================================================

/// Fisher–Snedecor F distribution with `(d1, d2)` degrees of freedom.
///
/// Variance is `2·d₂²·(d₁+d₂−2) / (d₁·(d₂−2)²·(d₂−4))` for d₂ > 4.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FisherF {
    d1: f64,
    d2: f64,
}

impl FisherF {
    /// # Errors
    /// Returns `Err` unless both degrees of freedom are finite and positive.
    pub fn new(d1: f64, d2: f64) -> Result<Self, DistributionError> {
        require_positive("d1", d1, "FisherF")?;
        require_positive("d2", d2, "FisherF")?;
        Ok(Self { d1, d2 })
    }

    pub fn mean(&self) -> Option<f64> {
        (self.d2 > 2.0).then(|| self.d2 / (self.d2 - 2.0))
    }

    pub fn variance(&self) -> Option<f64> {
        let (d1, d2) = (self.d1, self.d2);
        (d2 > 4.0).then(|| {
            2.0 * d2 * d2 * (d1 + d2 - 2.0) / (d1 * (d2 - 2.0).powi(2) * (d2 - 4.0))
        })
    }

    pub fn cdf(&self, x: f64) -> f64 {
        special::f_cdf(x, self.d1, self.d2)
    }

    pub fn sf(&self, x: f64) -> f64 {
        special::f_sf(x, self.d1, self.d2)
    }

    pub fn quantile(&self, p: f64) -> Option<f64> {
        in_open_unit(p).then(|| bisect_quantile(|x| self.cdf(x), p, 2.0))
    }
}

/// Inverts a CDF supported on `[0, ∞)` by bracketing then bisection.
fn bisect_quantile(cdf: impl Fn(f64) -> f64, p: f64, start: f64) -> f64 {
    let mut hi = start;
    while cdf(hi) < p {
        hi *= 2.0;
        if hi > 1e300 {
            return hi;
        }
    }
    let mut lo = 0.0_f64;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if hi - lo <= 1e-13 * mid.max(1e-300) {
            break;
        }
        if cdf(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_basic() {
        let n = Normal::new(10.0, 2.0).unwrap();
        assert_eq!(n.mean(), 10.0);
        assert_eq!(n.variance(), 4.0);
        assert!((n.cdf(10.0) - 0.5).abs() < 1e-15);
        assert!((n.cdf(12.0) + n.sf(12.0) - 1.0).abs() < 1e-15);
        assert!((n.quantile(0.975).unwrap() - (10.0 + 2.0 * 1.959_963_984_540_054)).abs() < 1e-8);
    }

    #[test]
    fn test_normal_invalid() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Normal::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_normal_quantile_bounds() {
        let n = Normal::standard();
        assert_eq!(n.quantile(0.0), None);
        assert_eq!(n.quantile(1.0), None);
    }

    #[test]
    fn test_student_t_moments() {
        assert_eq!(StudentT::new(1.0).unwrap().mean(), None);
        assert_eq!(StudentT::new(2.0).unwrap().variance(), Some(f64::INFINITY));
        assert!((StudentT::new(5.0).unwrap().variance().unwrap() - 5.0 / 3.0).abs() < 1e-15);
        assert!(StudentT::new(0.0).is_err());
    }

    #[test]
    fn test_student_t_heavier_tails_than_normal() {
        let t = StudentT::new(4.0).unwrap();
        let z = Normal::standard();
        for &x in &[2.0, 3.0, 4.0] {
            assert!(t.sf(x) > z.sf(x), "t(4) tail should exceed normal at {x}");
        }
    }

    #[test]
    fn test_student_t_approaches_normal() {
        let t = StudentT::new(1e6).unwrap();
        assert!((t.quantile(0.975).unwrap() - 1.959_963_984_540_054).abs() < 1e-5);
    }

    #[test]
    fn test_chi_squared_quantile() {
        let c = ChiSquared::new(1.0).unwrap();
        assert!((c.quantile(0.95).unwrap() - 3.841_458_820_694_124).abs() < 1e-8);
        assert_eq!(c.mean(), 1.0);
        assert_eq!(c.variance(), 2.0);
    }

    #[test]
    fn test_fisher_f_quantile() {
        let f = FisherF::new(2.0, 10.0).unwrap();
        assert!((f.quantile(0.95).unwrap() - 4.102_821_015_130_399).abs() < 1e-8);
        assert!((f.mean().unwrap() - 1.25).abs() < 1e-15);
        assert!(FisherF::new(2.0, 4.0).unwrap().variance().is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn normal_quantile_inverts_cdf(
            mu in -100.0_f64..100.0,
            sigma in 0.01_f64..50.0,
            p in 0.001_f64..0.999,
        ) {
            let n = Normal::new(mu, sigma).unwrap();
            let x = n.quantile(p).unwrap();
            prop_assert!((n.cdf(x) - p).abs() < 1e-10);
        }

        #[test]
        fn chi_squared_quantile_inverts_cdf(k in 0.5_f64..50.0, p in 0.01_f64..0.99) {
            let c = ChiSquared::new(k).unwrap();
            let x = c.quantile(p).unwrap();
            prop_assert!((c.cdf(x) - p).abs() < 1e-9, "k={k}, p={p}, x={x}");
        }

        #[test]
        fn t_pdf_non_negative(t in -50.0_f64..50.0, df in 0.5_f64..100.0) {
            prop_assert!(StudentT::new(df).unwrap().pdf(t) >= 0.0);
        }
    }
}
