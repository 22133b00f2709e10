//! Seeded simulation of the illustrative datasets.
//!
//! # Reproducibility
//!
//! One generator is created with [`create_rng`] at startup and passed by
//! `&mut` to every simulation below; nothing in the crate reaches for
//! thread-local or OS randomness. The generator is PCG64, whose output is
//! specified independently of platform, so a seed reproduces the same data
//! bit for bit everywhere.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};
use crate::sample::Sample;
use crate::variogram::{Point, SpatialDataset};

/// Generator used for every simulation.
pub type StudyRng = rand_pcg::Pcg64;

/// Creates the process generator from a seed.
///
/// # Examples
/// ```
/// use u_inference::random::create_rng;
/// use rand::Rng;
/// let mut a = create_rng(7);
/// let mut b = create_rng(7);
/// assert_eq!(a.random::<u64>(), b.random::<u64>());
/// ```
pub fn create_rng(seed: u64) -> StudyRng {
    StudyRng::seed_from_u64(seed)
}

fn normal(mu: f64, sigma: f64) -> Result<Normal<f64>> {
    if !mu.is_finite() || !sigma.is_finite() || sigma < 0.0 {
        return Err(InferenceError::invalid(format!(
            "normal distribution needs finite mean and non-negative finite sd, got N({mu}, {sigma})"
        )));
    }
    Normal::new(mu, sigma).map_err(|e| InferenceError::invalid(e.to_string()))
}

fn uniform(lo: f64, hi: f64) -> Result<Uniform<f64>> {
    Uniform::new(lo, hi).map_err(|e| InferenceError::invalid(format!("uniform [{lo}, {hi}): {e}")))
}

/// `n` independent draws from `N(mu, sigma²)`.
pub fn normal_sample<R: Rng>(rng: &mut R, n: usize, mu: f64, sigma: f64) -> Result<Vec<f64>> {
    let dist = normal(mu, sigma)?;
    Ok((0..n).map(|_| dist.sample(rng)).collect())
}

/// `yᵢ = intercept + slope·xᵢ + εᵢ`, `εᵢ ~ N(0, sigma²)`.
pub fn noisy_line<R: Rng>(
    rng: &mut R,
    xs: &[f64],
    intercept: f64,
    slope: f64,
    sigma: f64,
) -> Result<Vec<f64>> {
    let noise = normal(0.0, sigma)?;
    Ok(xs
        .iter()
        .map(|&x| intercept + slope * x + noise.sample(rng))
        .collect())
}

/// Draws `k` distinct elements of `data` uniformly at random.
///
/// Partial Fisher–Yates (Durstenfeld): only the first `k` positions of an
/// index permutation are settled, so the cost is O(n) setup plus O(k).
///
/// # Errors
/// [`InferenceError::InsufficientData`] if `k > data.len()`.
pub fn sample_without_replacement<T: Clone, R: Rng>(
    rng: &mut R,
    data: &[T],
    k: usize,
) -> Result<Vec<T>> {
    let n = data.len();
    if k > n {
        return Err(InferenceError::insufficient(k, n, "sampling without replacement"));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.random_range(i..n);
        indices.swap(i, j);
    }
    Ok(indices[..k].iter().map(|&i| data[i].clone()).collect())
}

/// One group's line in [`TwoLinesSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    pub label: String,
    pub intercept: f64,
    pub slope: f64,
}

/// Two groups observed over a common x range, each around its own line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoLinesSpec {
    pub n_per_group: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub sigma: f64,
    pub lines: [LineSpec; 2],
}

impl Default for TwoLinesSpec {
    fn default() -> Self {
        Self {
            n_per_group: 25,
            x_min: 0.0,
            x_max: 10.0,
            sigma: 1.0,
            lines: [
                LineSpec {
                    label: "control".into(),
                    intercept: 2.0,
                    slope: 0.8,
                },
                LineSpec {
                    label: "treated".into(),
                    intercept: 4.0,
                    slope: 1.3,
                },
            ],
        }
    }
}

/// Columns of a simulated two-group regression dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwoLines {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub group: Vec<String>,
}

/// Draws `x` uniformly on `[x_min, x_max)` for each group and `y` around
/// that group's line. Rows are ordered group by group.
pub fn two_noisy_lines<R: Rng>(rng: &mut R, spec: &TwoLinesSpec) -> Result<TwoLines> {
    let xs = uniform(spec.x_min, spec.x_max)?;
    let mut out = TwoLines {
        x: Vec::with_capacity(2 * spec.n_per_group),
        y: Vec::with_capacity(2 * spec.n_per_group),
        group: Vec::with_capacity(2 * spec.n_per_group),
    };
    for line in &spec.lines {
        let x: Vec<f64> = (0..spec.n_per_group).map(|_| xs.sample(rng)).collect();
        let y = noisy_line(rng, &x, line.intercept, line.slope, spec.sigma)?;
        out.x.extend(x);
        out.y.extend(y);
        out.group
            .extend(std::iter::repeat(line.label.clone()).take(spec.n_per_group));
    }
    Ok(out)
}

/// Before/after measurements on `n` subjects: each subject has a baseline
/// from `N(mu, between_sd²)`, and the second reading adds `effect` plus
/// `N(0, within_sd²)` noise.
///
/// Groups are labelled `"before"` and `"after"`, subjects `"s1"`…`"sn"`.
pub fn paired_effect<R: Rng>(
    rng: &mut R,
    n: usize,
    mu: f64,
    between_sd: f64,
    effect: f64,
    within_sd: f64,
) -> Result<Sample> {
    let baseline = normal_sample(rng, n, mu, between_sd)?;
    let noise = normal(0.0, within_sd)?;
    let after: Vec<f64> = baseline
        .iter()
        .map(|b| b + effect + noise.sample(rng))
        .collect();

    let values: Vec<f64> = baseline.into_iter().chain(after).collect();
    let labels = (0..2 * n).map(|i| if i < n { "before" } else { "after" });
    let subjects = (0..2 * n).map(|i| format!("s{}", i % n + 1));
    Sample::with_groups(values, labels)?.with_subjects(subjects)
}

/// Parameters of [`spatial_field`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialFieldSpec {
    pub n: usize,
    /// Points fall in `[0, extent)²`.
    pub extent: f64,
    pub mean: f64,
    /// Linear trend per unit distance along x and y.
    pub gradient: (f64, f64),
    /// Amplitude and wavelength of a smooth periodic component.
    pub amplitude: f64,
    pub wavelength: f64,
    /// Independent measurement noise.
    pub sigma: f64,
    /// Number of equal-width strips along x; each point is labelled with
    /// its strip, `zone1` to `zoneN`.
    pub zones: usize,
}

impl Default for SpatialFieldSpec {
    fn default() -> Self {
        Self {
            n: 150,
            extent: 100.0,
            mean: 10.0,
            gradient: (0.02, 0.01),
            amplitude: 2.0,
            wavelength: 60.0,
            sigma: 0.5,
            zones: 2,
        }
    }
}

/// Scattered locations whose values vary smoothly in space, so nearby
/// points are more alike than distant ones. Points carry their zone as the
/// group label.
pub fn spatial_field<R: Rng>(rng: &mut R, spec: &SpatialFieldSpec) -> Result<SpatialDataset> {
    if spec.wavelength.is_nan() || spec.wavelength <= 0.0 {
        return Err(InferenceError::invalid("spatial field wavelength must be positive"));
    }
    if spec.zones == 0 {
        return Err(InferenceError::invalid("spatial field needs at least one zone"));
    }
    let coord = uniform(0.0, spec.extent)?;
    let noise = normal(0.0, spec.sigma)?;
    let k = std::f64::consts::TAU / spec.wavelength;

    let mut points = Vec::with_capacity(spec.n);
    let mut values = Vec::with_capacity(spec.n);
    let mut zones = Vec::with_capacity(spec.n);
    for _ in 0..spec.n {
        let p = Point::new(coord.sample(rng), coord.sample(rng));
        let smooth = spec.amplitude * (k * p.x).sin() * (k * p.y).cos();
        let trend = spec.gradient.0 * p.x + spec.gradient.1 * p.y;
        values.push(spec.mean + trend + smooth + noise.sample(rng));
        let strip = (p.x / spec.extent * spec.zones as f64) as usize;
        zones.push(format!("zone{}", strip.min(spec.zones - 1) + 1));
        points.push(p);
    }
    let mut field = SpatialDataset::new(points, values)?;
    field.groups = Some(zones);
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;
    use crate::variogram::LagBins;

    #[test]
    fn test_create_rng_deterministic() {
        let mut rng1 = create_rng(42);
        let mut rng2 = create_rng(42);
        let a = normal_sample(&mut rng1, 10, 0.0, 1.0).unwrap();
        let b = normal_sample(&mut rng2, 10, 0.0, 1.0).unwrap();
        assert_eq!(a, b);
        let c = normal_sample(&mut create_rng(43), 10, 0.0, 1.0).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_normal_sample_moments() {
        let mut rng = create_rng(1);
        let x = normal_sample(&mut rng, 20_000, 5.0, 2.0).unwrap();
        assert!((stats::mean(&x).unwrap() - 5.0).abs() < 0.1);
        assert!((stats::std_dev(&x).unwrap() - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = create_rng(0);
        assert!(normal_sample(&mut rng, 3, 0.0, -1.0).is_err());
        assert!(normal_sample(&mut rng, 3, f64::NAN, 1.0).is_err());
        assert!(noisy_line(&mut rng, &[1.0], 0.0, 1.0, f64::INFINITY).is_err());
        let spec = TwoLinesSpec {
            x_min: 5.0,
            x_max: 5.0,
            ..TwoLinesSpec::default()
        };
        assert!(two_noisy_lines(&mut rng, &spec).is_err());
    }

    #[test]
    fn test_sample_without_replacement() {
        let data: Vec<u32> = (0..20).collect();
        let mut rng = create_rng(5);
        let mut picked = sample_without_replacement(&mut rng, &data, 8).unwrap();
        assert_eq!(picked.len(), 8);
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 8);
        assert!(sample_without_replacement(&mut rng, &data, 21).is_err());
        assert!(sample_without_replacement(&mut rng, &data, 0).unwrap().is_empty());
    }

    #[test]
    fn test_noiseless_line() {
        let mut rng = create_rng(0);
        let y = noisy_line(&mut rng, &[0.0, 1.0, 2.0], 1.0, 2.0, 0.0).unwrap();
        assert_eq!(y, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_two_noisy_lines_layout() {
        let mut rng = create_rng(3);
        let spec = TwoLinesSpec::default();
        let d = two_noisy_lines(&mut rng, &spec).unwrap();
        assert_eq!(d.x.len(), 50);
        assert_eq!(d.y.len(), 50);
        assert_eq!(d.group[0], "control");
        assert_eq!(d.group[49], "treated");
        assert!(d.x.iter().all(|&x| (0.0..10.0).contains(&x)));
    }

    #[test]
    fn test_paired_effect_is_paired() {
        let mut rng = create_rng(9);
        let s = paired_effect(&mut rng, 12, 50.0, 10.0, 3.0, 0.5).unwrap();
        let (before, after) = s.paired_groups().unwrap();
        assert_eq!(before.len(), 12);
        let mean_diff: f64 = after.iter().zip(&before).map(|(a, b)| a - b).sum::<f64>() / 12.0;
        assert!((mean_diff - 3.0).abs() < 1.0);
    }

    #[test]
    fn test_spatial_field_has_structure() {
        let mut rng = create_rng(11);
        let field = spatial_field(&mut rng, &SpatialFieldSpec::default()).unwrap();
        assert_eq!(field.len(), 150);
        let v = field.empirical_variogram(&LagBins::uniform(5.0, 40.0).unwrap()).unwrap();
        let pts = v.points();
        assert!(pts.last().unwrap().gamma > pts[0].gamma);

        let zones = field.by_group();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.iter().map(|(_, d)| d.len()).sum::<usize>(), 150);
        for (label, zone) in &zones {
            let expected_west = label == "zone1";
            assert!(zone.points.iter().all(|p| (p.x < 50.0) == expected_west));
        }

        let bad = SpatialFieldSpec {
            zones: 0,
            ..SpatialFieldSpec::default()
        };
        assert!(spatial_field(&mut rng, &bad).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn same_seed_same_field(seed in 0_u64..10_000) {
            let spec = SpatialFieldSpec { n: 20, ..SpatialFieldSpec::default() };
            let a = spatial_field(&mut create_rng(seed), &spec).unwrap();
            let b = spatial_field(&mut create_rng(seed), &spec).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn full_sample_is_permutation(
            seed in 0_u64..10_000,
            data in proptest::collection::vec(0_i32..1000, 0..50),
        ) {
            let mut rng = create_rng(seed);
            let mut drawn = sample_without_replacement(&mut rng, &data, data.len()).unwrap();
            let mut expected = data.clone();
            drawn.sort_unstable();
            expected.sort_unstable();
            prop_assert_eq!(drawn, expected);
        }

        #[test]
        fn normal_sample_len(seed in 0_u64..10_000, n in 0_usize..100) {
            let x = normal_sample(&mut create_rng(seed), n, 0.0, 1.0).unwrap();
            prop_assert_eq!(x.len(), n);
            prop_assert!(x.iter().all(|v| v.is_finite()));
        }
    }
}
