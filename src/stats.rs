//! Descriptive statistics: the population-vs-sample toolkit.
//!
//! Low-level helpers return `Option` and reject empty or non-finite input
//! silently; [`summarize`] is the checked entry point that reports *why* a
//! summary cannot be produced.
//!
//! # Algorithms
//!
//! - **Sum/Mean**: Neumaier compensated summation, O(ε) error independent of n.
//! - **Variance**: Welford's online update (Welford 1962, *Technometrics* 4(3)),
//!   sample variance with Bessel's correction (`n − 1`).
//! - **Quantile**: R-7 linear interpolation (Hyndman & Fan 1996).

use serde::Serialize;

use crate::error::{ensure_finite, InferenceError, Result};
use crate::sample::Sample;

/// Neumaier compensated sum.
///
/// # Examples
/// ```
/// use u_inference::stats::kahan_sum;
/// assert_eq!(kahan_sum(&[1.0, 1e100, 1.0, -1e100]), 2.0);
/// ```
pub fn kahan_sum(data: &[f64]) -> f64 {
    let (sum, compensation) = data.iter().fold((0.0_f64, 0.0_f64), |(sum, c), &x| {
        let t = sum + x;
        let c = if sum.abs() >= x.abs() {
            c + ((sum - t) + x)
        } else {
            c + ((x - t) + sum)
        };
        (t, c)
    });
    sum + compensation
}

/// Arithmetic mean, `None` if empty or any value is non-finite.
///
/// # Examples
/// ```
/// use u_inference::stats::mean;
/// assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), Some(3.0));
/// ```
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() || !data.iter().all(|x| x.is_finite()) {
        return None;
    }
    Some(kahan_sum(data) / data.len() as f64)
}

/// Sample variance (denominator `n − 1`), `None` if `n < 2` or non-finite.
///
/// # Examples
/// ```
/// use u_inference::stats::variance;
/// let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
/// assert!((variance(&v).unwrap() - 32.0 / 7.0).abs() < 1e-12);
/// ```
pub fn variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    WelfordAccumulator::from_slice(data)?.sample_variance()
}

/// Population variance (denominator `n`), `None` if empty or non-finite.
pub fn population_variance(data: &[f64]) -> Option<f64> {
    WelfordAccumulator::from_slice(data)?.population_variance()
}

/// Sample standard deviation, `sqrt(variance(data))`.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    variance(data).map(f64::sqrt)
}

/// Smallest value, `None` if empty or any value is NaN.
pub fn min(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    data.iter()
        .try_fold(f64::INFINITY, |acc, &x| (!x.is_nan()).then(|| acc.min(x)))
}

/// Largest value, `None` if empty or any value is NaN.
pub fn max(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    data.iter()
        .try_fold(f64::NEG_INFINITY, |acc, &x| (!x.is_nan()).then(|| acc.max(x)))
}

/// Sorted copy of `data`, `None` if any value is NaN.
pub(crate) fn sorted(data: &[f64]) -> Option<Vec<f64>> {
    if data.iter().any(|x| x.is_nan()) {
        return None;
    }
    let mut v = data.to_vec();
    v.sort_unstable_by(f64::total_cmp);
    Some(v)
}

/// Median (average of the two middle values for even `n`).
///
/// # Examples
/// ```
/// use u_inference::stats::median;
/// assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
/// ```
pub fn median(data: &[f64]) -> Option<f64> {
    quantile(data, 0.5)
}

/// R-7 quantile of unsorted data. `None` for empty data, NaN, or `p ∉ [0, 1]`.
pub fn quantile(data: &[f64], p: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    quantile_sorted(&sorted(data)?, p)
}

/// R-7 quantile of data already sorted in non-decreasing order.
///
/// `h = (n − 1)·p`, interpolating between `x[⌊h⌋]` and `x[⌊h⌋ + 1]`.
pub fn quantile_sorted(sorted_data: &[f64], p: f64) -> Option<f64> {
    let n = sorted_data.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let h = (n - 1) as f64 * p;
    let j = h.floor() as usize;
    if j + 1 >= n {
        return Some(sorted_data[n - 1]);
    }
    let g = h - j as f64;
    Some((1.0 - g) * sorted_data[j] + g * sorted_data[j + 1])
}

/// Sample covariance of paired observations (denominator `n − 1`).
///
/// `None` if lengths differ, `n < 2`, or any value is non-finite.
pub fn covariance(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let products: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(&a, &b)| (a - mx) * (b - my))
        .collect();
    Some(kahan_sum(&products) / (n - 1) as f64)
}

// ---------------------------------------------------------------------------
// Welford online accumulator
// ---------------------------------------------------------------------------

/// Single-pass accumulator for count, mean and sum of squared deviations.
///
/// # Examples
/// ```
/// use u_inference::stats::WelfordAccumulator;
/// let mut acc = WelfordAccumulator::new();
/// for &x in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
///     acc.update(x);
/// }
/// assert_eq!(acc.mean(), Some(5.0));
/// assert!((acc.population_variance().unwrap() - 4.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates a whole slice; `None` if any value is non-finite.
    pub fn from_slice(data: &[f64]) -> Option<Self> {
        let mut acc = Self::new();
        for &x in data {
            if !x.is_finite() {
                return None;
            }
            acc.update(x);
        }
        Some(acc)
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sum of squared deviations from the running mean.
    pub fn sum_of_squares(&self) -> f64 {
        self.m2
    }

    pub fn sample_variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| (self.m2 / (self.count - 1) as f64).max(0.0))
    }

    pub fn population_variance(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).max(0.0))
    }
}

// ---------------------------------------------------------------------------
// Checked summary
// ---------------------------------------------------------------------------

/// Descriptive summary of one sample.
///
/// `standard_deviation == variance.sqrt()` and `variance ≥ 0` always hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    /// Sample variance with Bessel's correction.
    pub variance: f64,
    pub standard_deviation: f64,
    /// Standard error of the mean, `s / √n`.
    pub standard_error: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Summarizes a sample.
///
/// # Errors
/// - [`InferenceError::InsufficientData`] if fewer than two observations.
/// - [`InferenceError::InvalidInput`] if any value is NaN or infinite.
///
/// # Examples
/// ```
/// use u_inference::stats::summarize;
/// let s = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
/// assert_eq!(s.mean, 5.0);
/// assert!((s.variance - 32.0 / 7.0).abs() < 1e-12);
/// ```
pub fn summarize(data: impl AsRef<[f64]>) -> Result<Summary> {
    let data = data.as_ref();
    if data.len() < 2 {
        return Err(InferenceError::insufficient(2, data.len(), "sample variance"));
    }
    ensure_finite(data, "summarize")?;

    let acc = WelfordAccumulator::from_slice(data)
        .ok_or_else(|| InferenceError::invalid("summarize: non-finite value"))?;
    let variance = acc
        .sample_variance()
        .ok_or_else(|| InferenceError::insufficient(2, data.len(), "sample variance"))?;
    let sorted = sorted(data).ok_or_else(|| InferenceError::invalid("summarize: NaN"))?;
    let q = |p| quantile_sorted(&sorted, p).unwrap_or(f64::NAN);

    let standard_deviation = variance.sqrt();
    Ok(Summary {
        n: data.len(),
        mean: kahan_sum(data) / data.len() as f64,
        variance,
        standard_deviation,
        standard_error: standard_deviation / (data.len() as f64).sqrt(),
        min: sorted[0],
        q1: q(0.25),
        median: q(0.5),
        q3: q(0.75),
        max: sorted[sorted.len() - 1],
    })
}

/// Summaries of every group of a labelled sample, in first-appearance order.
///
/// # Errors
/// Propagates grouping errors from [`Sample::groups`] and the per-group
/// [`summarize`] errors (each group needs two observations).
pub fn summarize_groups(sample: &Sample) -> Result<Vec<(String, Summary)>> {
    sample
        .groups()?
        .into_iter()
        .map(|group| Ok((group.label.clone(), summarize(&group.values)?)))
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn finite_vec(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
        proptest::collection::vec(-1e6_f64..1e6, min_len..=max_len)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn summary_sd_is_sqrt_variance(data in finite_vec(2, 100)) {
            let s = summarize(&data).unwrap();
            prop_assert!(s.variance >= 0.0);
            prop_assert_eq!(s.standard_deviation, s.variance.sqrt());
        }

        #[test]
        fn summary_order_statistics(data in finite_vec(2, 100)) {
            let s = summarize(&data).unwrap();
            prop_assert!(s.min <= s.q1 && s.q1 <= s.median);
            prop_assert!(s.median <= s.q3 && s.q3 <= s.max);
            prop_assert!(s.min <= s.mean + 1e-6 && s.mean <= s.max + 1e-6);
        }

        #[test]
        fn variance_shift_invariant(data in finite_vec(2, 50), shift in -1e3_f64..1e3) {
            let shifted: Vec<f64> = data.iter().map(|x| x + shift).collect();
            let a = variance(&data).unwrap();
            let b = variance(&shifted).unwrap();
            prop_assert!((a - b).abs() <= 1e-6 * a.max(1.0));
        }

        #[test]
        fn variance_of_constant_is_zero(value in -1e6_f64..1e6, n in 2_usize..50) {
            let data = vec![value; n];
            prop_assert!(variance(&data).unwrap().abs() < 1e-9);
        }
    }
}
