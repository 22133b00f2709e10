//! Small dense linear algebra for design matrices with a handful of columns.
//!
//! Matrices are row-major `Vec<Vec<f64>>`. Sizes here are tiny (a few
//! regression terms or variogram parameters), so clarity wins over blocking.

/// Pivot magnitude, on the equilibrated matrix, below which a matrix is
/// treated as singular.
pub const SINGULAR_THRESHOLD: f64 = 1e-12;

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// `XᵀX` for a row-major `X` with `p` columns.
#[allow(clippy::needless_range_loop)]
pub fn gram(x: &[Vec<f64>], p: usize) -> Vec<Vec<f64>> {
    let mut g = vec![vec![0.0; p]; p];
    for row in x {
        for i in 0..p {
            for j in i..p {
                g[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..p {
        for j in 0..i {
            g[i][j] = g[j][i];
        }
    }
    g
}

/// `Xᵀy`.
pub fn cross(x: &[Vec<f64>], y: &[f64], p: usize) -> Vec<f64> {
    let mut out = vec![0.0; p];
    for (row, &yi) in x.iter().zip(y) {
        for (o, &xij) in out.iter_mut().zip(row) {
            *o += xij * yi;
        }
    }
    out
}

/// `X·b`.
pub fn mat_vec(x: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    x.iter().map(|row| dot(row, b)).collect()
}

/// Inverse of a square matrix by Gauss–Jordan elimination with partial
/// pivoting; `None` if the matrix is singular.
///
/// The matrix is first equilibrated to `D·A·D` with `D = diag(1/√dᵢ)`, where
/// `dᵢ` is `|aᵢᵢ|` (or the largest entry of row `i` when the diagonal is
/// zero). For a Gram matrix this is the correlation matrix, so the pivot
/// test against [`SINGULAR_THRESHOLD`] does not depend on the units of the
/// columns.
#[allow(clippy::needless_range_loop)]
pub fn invert(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    if n == 0 || a.iter().any(|row| row.len() != n) {
        return None;
    }
    let mut d = Vec::with_capacity(n);
    for (i, row) in a.iter().enumerate() {
        let diag = row[i].abs();
        let size = if diag > 0.0 {
            diag
        } else {
            row.iter().map(|v| v.abs()).fold(0.0_f64, f64::max)
        };
        if !(size > 0.0 && size.is_finite()) {
            return None;
        }
        d.push(size.sqrt().recip());
    }

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r: Vec<f64> = row.iter().enumerate().map(|(j, v)| v * d[i] * d[j]).collect();
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();
    let scale = aug
        .iter()
        .flat_map(|row| row[..n].iter())
        .map(|v| v.abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| aug[r1][col].abs().total_cmp(&aug[r2][col].abs()))?;
        if aug[pivot_row][col].abs() < SINGULAR_THRESHOLD * scale {
            return None;
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..2 * n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    // A⁻¹ = D·(D·A·D)⁻¹·D
    Some(
        aug.into_iter()
            .enumerate()
            .map(|(i, row)| {
                row[n..]
                    .iter()
                    .enumerate()
                    .map(|(j, v)| v * d[i] * d[j])
                    .collect()
            })
            .collect(),
    )
}

/// Solves `A·x = b`; `None` if `A` is singular or shapes disagree.
pub fn solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    if a.len() != b.len() {
        return None;
    }
    invert(a).map(|inv| mat_vec(&inv, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_2x2() {
        let a = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let inv = invert(&a).unwrap();
        let expected = [[0.6, -0.7], [-0.2, 0.4]];
        for i in 0..2 {
            for j in 0..2 {
                assert!((inv[i][j] - expected[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_invert_needs_pivoting() {
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let inv = invert(&a).unwrap();
        assert_eq!(inv, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(invert(&a).is_none());
        assert!(invert(&[]).is_none());
    }

    #[test]
    fn test_invert_is_unit_free() {
        // Gram matrix of an intercept and x = 1e-7..1e-6
        let x: Vec<Vec<f64>> = (1..=10).map(|i| vec![1.0, i as f64 * 1e-7]).collect();
        let g = gram(&x, 2);
        let inv = invert(&g).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let prod: f64 = (0..2).map(|k| g[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod - expected).abs() < 1e-8, "({i},{j}): {prod}");
            }
        }

        let tiny = vec![vec![1e-30, 0.0], vec![0.0, 1e-30]];
        assert!((invert(&tiny).unwrap()[0][0] - 1e30).abs() < 1e18);
    }

    #[test]
    fn test_collinear_columns_are_singular_at_any_scale() {
        let x: Vec<Vec<f64>> = (1..=10)
            .map(|i| vec![i as f64 * 1e-7, 2.0 * i as f64 * 1e-7])
            .collect();
        assert!(invert(&gram(&x, 2)).is_none());
        assert!(invert(&[vec![0.0, 0.0], vec![0.0, 1.0]]).is_none());
    }

    #[test]
    fn test_solve() {
        let a = vec![
            vec![2.0, 1.0, -1.0],
            vec![-3.0, -1.0, 2.0],
            vec![-2.0, 1.0, 2.0],
        ];
        let x = solve(&a, &[8.0, -11.0, -3.0]).unwrap();
        for (xi, ei) in x.iter().zip([2.0, 3.0, -1.0]) {
            assert!((xi - ei).abs() < 1e-10);
        }
    }

    #[test]
    fn test_gram_and_cross() {
        let x = vec![vec![1.0, 1.0], vec![1.0, 2.0], vec![1.0, 3.0]];
        assert_eq!(gram(&x, 2), vec![vec![3.0, 6.0], vec![6.0, 14.0]]);
        assert_eq!(cross(&x, &[1.0, 2.0, 3.0], 2), vec![6.0, 14.0]);
    }
}
