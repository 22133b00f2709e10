//! Empirical semivariograms of point-referenced data.
//!
//! For every unordered pair of locations `(i, j)` whose separation falls in
//! a distance bin, the squared value difference is accumulated:
//!
//! ```text
//! γ(h) = Σ (z_i − z_j)² / (2 · N(h))
//! ```
//!
//! Which columns of a [`Table`] hold the coordinates, the measurement and an
//! optional grouping key is stated up front through [`ColumnRoles`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_finite, InferenceError, Result};

/// Default number of lag bins for [`LagBins::default_for`].
pub const DEFAULT_BIN_COUNT: usize = 15;

/// Largest number of bins [`LagBins::uniform`] will build.
pub const MAX_BIN_COUNT: usize = 1_000_000;

// ============================================================================
// Columnar input
// ============================================================================

/// A single named column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Minimal columnar table: named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a column.
    ///
    /// # Errors
    /// [`InferenceError::DimensionMismatch`] if its length differs from the
    /// columns already present.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if let Some((_, first)) = self.columns.iter().find(|(n, _)| *n != name) {
            if first.len() != column.len() {
                return Err(InferenceError::mismatch(
                    first.len(),
                    column.len(),
                    format!("column {name}"),
                ));
            }
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        Ok(self)
    }

    pub fn with_numeric(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, Column::Numeric(values))
    }

    pub fn with_categorical<I, S>(self, name: impl Into<String>, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_column(name, Column::Categorical(labels.into_iter().map(Into::into).collect()))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Categorical(_)) => Err(InferenceError::invalid(format!(
                "column {name} is categorical, expected numeric"
            ))),
            None => Err(InferenceError::invalid(format!("unknown column {name}"))),
        }
    }
}

/// Which table columns play which part in a spatial analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRoles {
    pub x: String,
    pub y: String,
    pub value: String,
    pub group: Option<String>,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        Self {
            x: "x".into(),
            y: "y".into(),
            value: "value".into(),
            group: None,
        }
    }
}

// ============================================================================
// Spatial dataset
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Locations with one measured value each and an optional group label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialDataset {
    pub points: Vec<Point>,
    pub values: Vec<f64>,
    pub groups: Option<Vec<String>>,
}

impl SpatialDataset {
    /// # Errors
    /// [`InferenceError::DimensionMismatch`] if the counts differ;
    /// [`InferenceError::InvalidInput`] for non-finite coordinates or values.
    pub fn new(points: Vec<Point>, values: Vec<f64>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(InferenceError::mismatch(points.len(), values.len(), "spatial values"));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(InferenceError::invalid("non-finite coordinate"));
        }
        ensure_finite(&values, "spatial values")?;
        Ok(Self {
            points,
            values,
            groups: None,
        })
    }

    /// Reads coordinates, values and the optional group column named by
    /// `roles`.
    ///
    /// # Errors
    /// [`InferenceError::InvalidInput`] for an unknown column, a coordinate
    /// or value column that is not numeric, or non-finite entries.
    pub fn from_table(table: &Table, roles: &ColumnRoles) -> Result<Self> {
        let xs = table.numeric(&roles.x)?;
        let ys = table.numeric(&roles.y)?;
        let values = table.numeric(&roles.value)?.to_vec();
        let points = xs.iter().zip(ys).map(|(&x, &y)| Point::new(x, y)).collect();
        let mut dataset = Self::new(points, values)?;

        if let Some(name) = &roles.group {
            dataset.groups = Some(match table.column(name) {
                Some(Column::Categorical(labels)) => labels.clone(),
                Some(Column::Numeric(v)) => v.iter().map(f64::to_string).collect(),
                None => return Err(InferenceError::invalid(format!("unknown column {name}"))),
            });
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Splits the dataset by group label, levels in first-appearance order.
    /// An ungrouped dataset yields itself under an empty label.
    pub fn by_group(&self) -> Vec<(String, SpatialDataset)> {
        let Some(labels) = &self.groups else {
            return vec![(String::new(), self.clone())];
        };
        let mut out: Vec<(String, SpatialDataset)> = Vec::new();
        for ((label, point), value) in labels.iter().zip(&self.points).zip(&self.values) {
            let slot = match out.iter().position(|(l, _)| l == label) {
                Some(i) => i,
                None => {
                    out.push((
                        label.clone(),
                        SpatialDataset {
                            points: Vec::new(),
                            values: Vec::new(),
                            groups: None,
                        },
                    ));
                    out.len() - 1
                }
            };
            out[slot].1.points.push(*point);
            out[slot].1.values.push(*value);
        }
        out
    }

    pub fn empirical_variogram(&self, bins: &LagBins) -> Result<EmpiricalVariogram> {
        empirical_variogram(&self.points, &self.values, bins)
    }
}

// ============================================================================
// Lag bins
// ============================================================================

/// Distance classes given by increasing edges `e₀ < e₁ < … < e_k`.
///
/// Bin `j` holds separations in `(e_j, e_{j+1}]`; the first bin also
/// includes `e₀` itself. Pairs farther apart than the last edge are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLagBins")]
pub struct LagBins {
    edges: Vec<f64>,
}

/// Unchecked serialized form; deserialization goes through
/// [`LagBins::from_edges`].
#[derive(Deserialize)]
struct RawLagBins {
    edges: Vec<f64>,
}

impl TryFrom<RawLagBins> for LagBins {
    type Error = InferenceError;

    fn try_from(raw: RawLagBins) -> Result<Self> {
        Self::from_edges(raw.edges)
    }
}

impl LagBins {
    /// Bins of equal `width` from 0 up to `cutoff`; the last bin is
    /// truncated at the cutoff.
    ///
    /// # Errors
    /// [`InferenceError::InvalidInput`] unless `0 < width` and `0 < cutoff`,
    /// both finite, with at most [`MAX_BIN_COUNT`] bins.
    pub fn uniform(width: f64, cutoff: f64) -> Result<Self> {
        if !(width.is_finite() && cutoff.is_finite() && width > 0.0 && cutoff > 0.0) {
            return Err(InferenceError::invalid(format!(
                "lag bins need positive finite width and cutoff, \
                 got width {width}, cutoff {cutoff}"
            )));
        }
        let count = ((cutoff / width) - 1e-9).ceil().max(1.0);
        if count > MAX_BIN_COUNT as f64 {
            return Err(InferenceError::invalid(format!(
                "width {width} and cutoff {cutoff} give more than {MAX_BIN_COUNT} lag bins"
            )));
        }
        let count = count as usize;
        let mut edges: Vec<f64> = (0..count).map(|k| k as f64 * width).collect();
        edges.push(cutoff);
        Ok(Self { edges })
    }

    /// # Errors
    /// [`InferenceError::InvalidInput`] unless there are at least two finite,
    /// non-negative, strictly increasing edges.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(InferenceError::invalid("lag bins need at least two edges"));
        }
        if edges.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return Err(InferenceError::invalid("lag bin edges must be finite and non-negative"));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(InferenceError::invalid("lag bin edges must be strictly increasing"));
        }
        Ok(Self { edges })
    }

    /// One third of the bounding-box diagonal split into
    /// [`DEFAULT_BIN_COUNT`] equal bins.
    ///
    /// # Errors
    /// [`InferenceError::InsufficientData`] for fewer than two points;
    /// [`InferenceError::InvalidInput`] if all points coincide.
    pub fn default_for(points: &[Point]) -> Result<Self> {
        if points.len() < 2 {
            return Err(InferenceError::insufficient(2, points.len(), "default lag bins"));
        }
        let (mut x0, mut x1) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            x0 = x0.min(p.x);
            x1 = x1.max(p.x);
            y0 = y0.min(p.y);
            y1 = y1.max(p.y);
        }
        let cutoff = (x1 - x0).hypot(y1 - y0) / 3.0;
        Self::uniform(cutoff / DEFAULT_BIN_COUNT as f64, cutoff)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cutoff(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin index of a separation, `None` outside `[e₀, e_k]`.
    pub fn locate(&self, distance: f64) -> Option<usize> {
        if distance == self.edges[0] {
            return Some(0);
        }
        match self.edges.partition_point(|&e| e < distance) {
            0 => None,
            i if i > self.len() => None,
            i => Some(i - 1),
        }
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// One distance class of an empirical variogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariogramBin {
    pub lower: f64,
    pub upper: f64,
    /// Mean separation of the pairs in the bin (midpoint when empty).
    pub lag_distance: f64,
    pub pair_count: usize,
    #[serde(rename = "gamma")]
    semivariance: Option<f64>,
}

impl VariogramBin {
    /// Semivariance of the bin.
    ///
    /// # Errors
    /// [`InferenceError::DivisionUndefined`] when the bin holds no pairs.
    pub fn gamma(&self) -> Result<f64> {
        self.semivariance.ok_or_else(|| InferenceError::DivisionUndefined {
            context: format!("semivariance of empty lag bin ({}, {}]", self.lower, self.upper),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pair_count == 0
    }
}

/// A non-empty bin reduced to what a model fit needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariogramPoint {
    pub lag_distance: f64,
    pub pair_count: usize,
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmpiricalVariogram {
    pub bins: Vec<VariogramBin>,
}

impl EmpiricalVariogram {
    /// Non-empty bins only.
    pub fn points(&self) -> Vec<VariogramPoint> {
        self.bins
            .iter()
            .filter_map(|b| {
                b.semivariance.map(|gamma| VariogramPoint {
                    lag_distance: b.lag_distance,
                    pair_count: b.pair_count,
                    gamma,
                })
            })
            .collect()
    }

    pub fn total_pairs(&self) -> usize {
        self.bins.iter().map(|b| b.pair_count).sum()
    }
}

/// Classical (Matheron) estimator over all unordered pairs.
///
/// # Errors
/// - [`InferenceError::DimensionMismatch`] if `points` and `values` differ
///   in length.
/// - [`InferenceError::InvalidInput`] for non-finite values or coordinates.
///
/// # Examples
/// ```
/// use u_inference::variogram::{empirical_variogram, LagBins, Point};
/// let points: Vec<Point> = (0..6).map(|i| Point::new(i as f64, 0.0)).collect();
/// let values: Vec<f64> = (0..6).map(f64::from).collect();
/// let v = empirical_variogram(&points, &values, &LagBins::uniform(1.0, 3.0).unwrap()).unwrap();
/// assert_eq!(v.bins[0].pair_count, 5);
/// assert_eq!(v.bins[0].gamma().unwrap(), 0.5);
/// ```
pub fn empirical_variogram(
    points: &[Point],
    values: &[f64],
    bins: &LagBins,
) -> Result<EmpiricalVariogram> {
    if points.len() != values.len() {
        return Err(InferenceError::mismatch(points.len(), values.len(), "variogram values"));
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(InferenceError::invalid("non-finite coordinate"));
    }
    ensure_finite(values, "variogram values")?;

    let k = bins.len();
    let mut counts = vec![0_usize; k];
    let mut sum_sq = vec![0.0; k];
    let mut sum_dist = vec![0.0; k];
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = points[i].distance(&points[j]);
            if let Some(b) = bins.locate(d) {
                let diff = values[i] - values[j];
                counts[b] += 1;
                sum_sq[b] += diff * diff;
                sum_dist[b] += d;
            }
        }
    }

    let edges = bins.edges();
    let bins: Vec<VariogramBin> = (0..k)
        .map(|b| {
            let (lower, upper) = (edges[b], edges[b + 1]);
            let n = counts[b];
            VariogramBin {
                lower,
                upper,
                lag_distance: if n > 0 { sum_dist[b] / n as f64 } else { 0.5 * (lower + upper) },
                pair_count: n,
                semivariance: (n > 0).then(|| sum_sq[b] / (2.0 * n as f64)),
            }
        })
        .collect();

    debug!(
        points = points.len(),
        bins = k,
        empty = bins.iter().filter(|b| b.is_empty()).count(),
        "empirical variogram"
    );
    Ok(EmpiricalVariogram { bins })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn cloud() -> impl Strategy<Value = Vec<Point>> {
        proptest::collection::vec((0.0_f64..100.0, 0.0_f64..100.0), 2..40)
            .prop_map(|v| v.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn constant_values_give_zero_gamma(points in cloud(), c in -1e3_f64..1e3) {
            let values = vec![c; points.len()];
            let bins = LagBins::uniform(10.0, 150.0).unwrap();
            let v = empirical_variogram(&points, &values, &bins).unwrap();
            for p in v.points() {
                prop_assert_eq!(p.gamma, 0.0);
            }
        }

        #[test]
        fn pairs_are_counted_once(points in cloud()) {
            let values: Vec<f64> = points.iter().map(|p| p.x - p.y).collect();
            // cutoff beyond the largest possible separation
            let bins = LagBins::uniform(10.0, 150.0).unwrap();
            let v = empirical_variogram(&points, &values, &bins).unwrap();
            let n = points.len();
            prop_assert_eq!(v.total_pairs(), n * (n - 1) / 2);
            for p in v.points() {
                prop_assert!(p.gamma >= 0.0);
            }
        }
    }
}
