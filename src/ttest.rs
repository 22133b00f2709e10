//! Student's t-tests: one-sample, paired and two independent samples.
//!
//! # Statistics
//!
//! ```text
//! one sample / paired:  t = (x̄ − μ₀) / (s / √n),                 df = n − 1
//! Welch:                t = (x̄₁ − x̄₂) / √(s₁²/n₁ + s₂²/n₂)
//!                       df = (s₁²/n₁ + s₂²/n₂)² / Σ (sᵢ²/nᵢ)² / (nᵢ − 1)
//! pooled:               s_p² = ((n₁−1)s₁² + (n₂−1)s₂²) / (n₁+n₂−2),
//!                       t = (x̄₁ − x̄₂) / (s_p √(1/n₁ + 1/n₂)),     df = n₁+n₂−2
//! ```
//!
//! The paired test is the one-sample test applied to per-subject
//! differences `aᵢ − bᵢ`. One-sided alternatives restrict the rejection
//! region to a single tail and must be requested explicitly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distributions::StudentT;
use crate::error::{ensure_finite, InferenceError, Result};
use crate::sample::Sample;
use crate::special;
use crate::stats::WelfordAccumulator;

/// Alternative hypothesis relative to the null difference of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    #[default]
    TwoSided,
    /// True difference is less than the null value.
    Less,
    /// True difference is greater than the null value.
    Greater,
}

impl std::fmt::Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TwoSided => "two-sided",
            Self::Less => "less",
            Self::Greater => "greater",
        })
    }
}

/// Which t-test produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestMethod {
    OneSample,
    Paired,
    Welch,
    Pooled,
}

impl std::fmt::Display for TestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OneSample => "One Sample t-test",
            Self::Paired => "Paired t-test",
            Self::Welch => "Welch Two Sample t-test",
            Self::Pooled => "Two Sample t-test",
        })
    }
}

/// Options for [`compare_groups`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    /// Test per-subject differences instead of independent groups.
    pub paired: bool,
    pub alternative: Alternative,
    /// Pool the group variances; Welch's adjustment is used otherwise.
    pub equal_variance: bool,
    /// Confidence level of the reported interval, in `(0, 1)`.
    pub confidence: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            paired: false,
            alternative: Alternative::TwoSided,
            equal_variance: false,
            confidence: 0.95,
        }
    }
}

impl CompareOptions {
    pub fn paired() -> Self {
        Self {
            paired: true,
            ..Self::default()
        }
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }
}

/// Result of a t-test. For one-sample tests `difference_in_means` is
/// `x̄ − μ₀`; for paired tests it is the mean of `a − b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparison {
    pub method: TestMethod,
    pub alternative: Alternative,
    pub difference_in_means: f64,
    pub standard_error: f64,
    pub degrees_of_freedom: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub confidence: f64,
    /// Interval for the difference; one-sided tests give a half-infinite bound.
    pub confidence_interval: (f64, f64),
    /// Group means (`x̄` only for one-sample tests).
    pub estimates: Vec<f64>,
}

fn check_confidence(confidence: f64) -> Result<()> {
    if confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(InferenceError::invalid(format!(
            "confidence level must lie in (0, 1), got {confidence}"
        )))
    }
}

fn moments(data: &[f64], context: &str) -> Result<(usize, f64, f64)> {
    if data.len() < 2 {
        return Err(InferenceError::insufficient(2, data.len(), context));
    }
    ensure_finite(data, context)?;
    let acc = WelfordAccumulator::from_slice(data)
        .ok_or_else(|| InferenceError::invalid(format!("{context}: non-finite value")))?;
    let mean = acc.mean().unwrap_or(f64::NAN);
    let var = acc.sample_variance().unwrap_or(f64::NAN);
    Ok((data.len(), mean, var))
}

/// Turns an estimate, its standard error and df into statistic, p-value
/// and confidence interval.
///
/// A zero standard error gives a statistic of 0 (p = 1) when the estimate
/// is exactly zero, and ±∞ otherwise.
fn finish(
    method: TestMethod,
    alternative: Alternative,
    estimate: f64,
    se: f64,
    df: f64,
    confidence: f64,
    estimates: Vec<f64>,
) -> Result<GroupComparison> {
    let statistic = if se > 0.0 {
        estimate / se
    } else if estimate == 0.0 {
        0.0
    } else {
        estimate.signum() * f64::INFINITY
    };

    let p_value = match alternative {
        Alternative::TwoSided => (2.0 * special::t_sf(statistic.abs(), df)).min(1.0),
        Alternative::Less => special::t_cdf(statistic, df),
        Alternative::Greater => special::t_sf(statistic, df),
    };

    let dist = StudentT::new(df).map_err(|e| InferenceError::invalid(e.to_string()))?;
    let confidence_interval = match alternative {
        Alternative::TwoSided => {
            let q = dist.quantile(0.5 + confidence / 2.0).unwrap_or(f64::NAN);
            (estimate - q * se, estimate + q * se)
        }
        Alternative::Less => {
            let q = dist.quantile(confidence).unwrap_or(f64::NAN);
            (f64::NEG_INFINITY, estimate + q * se)
        }
        Alternative::Greater => {
            let q = dist.quantile(confidence).unwrap_or(f64::NAN);
            (estimate - q * se, f64::INFINITY)
        }
    };

    debug!(%method, %alternative, statistic, df, p_value, "t-test");
    Ok(GroupComparison {
        method,
        alternative,
        difference_in_means: estimate,
        standard_error: se,
        degrees_of_freedom: df,
        statistic,
        p_value,
        confidence,
        confidence_interval,
        estimates,
    })
}

/// One-sample t-test of `H₀: mean(x) = mu`.
///
/// # Errors
/// [`InferenceError::InsufficientData`] for `n < 2`;
/// [`InferenceError::InvalidInput`] for non-finite data or a bad confidence level.
///
/// # Examples
/// ```
/// use u_inference::ttest::{one_sample, Alternative};
/// let r = one_sample(&[5.1, 4.9, 5.3, 5.0, 5.2], 5.0, Alternative::TwoSided, 0.95).unwrap();
/// assert!((r.difference_in_means - 0.1).abs() < 1e-12);
/// assert_eq!(r.degrees_of_freedom, 4.0);
/// ```
pub fn one_sample(
    x: &[f64],
    mu: f64,
    alternative: Alternative,
    confidence: f64,
) -> Result<GroupComparison> {
    check_confidence(confidence)?;
    let (n, mean, var) = moments(x, "one-sample t-test")?;
    let se = (var / n as f64).sqrt();
    let mut result = finish(
        TestMethod::OneSample,
        alternative,
        mean - mu,
        se,
        (n - 1) as f64,
        confidence,
        vec![mean],
    )?;
    // interval is for the mean itself, not the shift
    result.confidence_interval.0 += mu;
    result.confidence_interval.1 += mu;
    Ok(result)
}

/// Compares the means of two samples.
///
/// With `options.paired` the samples must be subject-aligned and of equal
/// length; the test runs on `a[i] − b[i]`. Otherwise the groups are
/// independent and compared with Welch's or the pooled-variance test.
///
/// # Errors
/// - [`InferenceError::DimensionMismatch`] for paired inputs of unequal length.
/// - [`InferenceError::InsufficientData`] if a group (or the differences)
///   has fewer than two observations.
/// - [`InferenceError::InvalidInput`] for non-finite data or a bad confidence level.
///
/// # Examples
/// ```
/// use u_inference::ttest::{compare_groups, CompareOptions};
/// let r = compare_groups(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &CompareOptions::paired()).unwrap();
/// assert_eq!(r.difference_in_means, -3.0);
/// assert_eq!(r.degrees_of_freedom, 2.0);
/// ```
pub fn compare_groups(a: &[f64], b: &[f64], options: &CompareOptions) -> Result<GroupComparison> {
    check_confidence(options.confidence)?;

    if options.paired {
        if a.len() != b.len() {
            return Err(InferenceError::mismatch(a.len(), b.len(), "paired t-test"));
        }
        let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
        let (n, mean, var) = moments(&diffs, "paired t-test")?;
        return finish(
            TestMethod::Paired,
            options.alternative,
            mean,
            (var / n as f64).sqrt(),
            (n - 1) as f64,
            options.confidence,
            vec![mean],
        );
    }

    let (n1, m1, v1) = moments(a, "two-sample t-test (first group)")?;
    let (n2, m2, v2) = moments(b, "two-sample t-test (second group)")?;
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let pooled_df = n1f + n2f - 2.0;

    let (method, se, df) = if options.equal_variance {
        let pooled = ((n1f - 1.0) * v1 + (n2f - 1.0) * v2) / pooled_df;
        (
            TestMethod::Pooled,
            (pooled * (1.0 / n1f + 1.0 / n2f)).sqrt(),
            pooled_df,
        )
    } else {
        let (w1, w2) = (v1 / n1f, v2 / n2f);
        let se2 = w1 + w2;
        let df = if se2 > 0.0 {
            se2 * se2 / (w1 * w1 / (n1f - 1.0) + w2 * w2 / (n2f - 1.0))
        } else {
            pooled_df
        };
        (TestMethod::Welch, se2.sqrt(), df)
    };

    finish(
        method,
        options.alternative,
        m1 - m2,
        se,
        df,
        options.confidence,
        vec![m1, m2],
    )
}

/// Runs [`compare_groups`] on a labelled sample with exactly two groups.
///
/// Paired designs are aligned through the sample's subject identifiers;
/// the difference is first level minus second level.
pub fn compare_sample_groups(sample: &Sample, options: &CompareOptions) -> Result<GroupComparison> {
    let (a, b) = if options.paired {
        sample.paired_groups()?
    } else {
        let mut groups = sample.groups()?;
        if groups.len() != 2 {
            return Err(InferenceError::invalid(format!(
                "t-test compares exactly 2 groups, found {}",
                groups.len()
            )));
        }
        let second = groups.pop().map(|g| g.values).unwrap_or_default();
        let first = groups.pop().map(|g| g.values).unwrap_or_default();
        (first, second)
    };
    compare_groups(&a, &b, options)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn group() -> impl Strategy<Value = Vec<f64>> {
        proptest::collection::vec(-100.0_f64..100.0, 3..30)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn two_sided_symmetric_under_swap(a in group(), b in group()) {
            let options = CompareOptions::default();
            let ab = compare_groups(&a, &b, &options).unwrap();
            let ba = compare_groups(&b, &a, &options).unwrap();
            prop_assert!((ab.p_value - ba.p_value).abs() < 1e-12);
            prop_assert!((ab.statistic + ba.statistic).abs() < 1e-9 * ab.statistic.abs().max(1.0));
        }

        #[test]
        fn one_sided_tails_mirror(a in group(), b in group()) {
            let less = CompareOptions::default().with_alternative(Alternative::Less);
            let greater = CompareOptions::default().with_alternative(Alternative::Greater);
            let p_less_ab = compare_groups(&a, &b, &less).unwrap().p_value;
            let p_greater_ba = compare_groups(&b, &a, &greater).unwrap().p_value;
            let p_greater_ab = compare_groups(&a, &b, &greater).unwrap().p_value;
            prop_assert!((p_less_ab - p_greater_ba).abs() < 1e-12);
            prop_assert!((p_less_ab + p_greater_ab - 1.0).abs() < 1e-12);
        }

        #[test]
        fn paired_unequal_length_fails(a in group(), extra in 1_usize..5) {
            let b: Vec<f64> = a.iter().copied().chain(std::iter::repeat(0.0).take(extra)).collect();
            let err = compare_groups(&a, &b, &CompareOptions::paired()).unwrap_err();
            let is_mismatch = matches!(err, InferenceError::DimensionMismatch { .. });
            prop_assert!(is_mismatch);
        }

        #[test]
        fn p_value_in_unit_interval(a in group(), b in group(), paired in any::<bool>()) {
            let n = a.len().min(b.len());
            let options = CompareOptions { paired, ..CompareOptions::default() };
            let r = compare_groups(&a[..n], &b[..n], &options).unwrap();
            prop_assert!((0.0..=1.0).contains(&r.p_value));
        }
    }
}
