//! Dense linear algebra for the small symmetric systems of per-gene fits
//!
//! Designs here have one or two columns, so a hand-written Cholesky on
//! `ndarray` matrices is all that is needed.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Lower-triangular Cholesky factor of a symmetric positive definite matrix.
/// `None` if the matrix is not numerically positive definite.
pub fn cholesky(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L L' x = b` given the Cholesky factor `L`
pub fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve `A x = b` for symmetric positive definite `A`
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
    cholesky(a).map(|l| cholesky_solve(&l, b))
}

/// Inverse of a symmetric positive definite matrix
pub fn invert_spd(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let l = cholesky(a)?;
    let n = a.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut e = Array1::<f64>::zeros(n);
        e[j] = 1.0;
        inv.column_mut(j).assign(&cholesky_solve(&l, e.view()));
    }
    Some(inv)
}

/// `log |A|` of a symmetric positive definite matrix
pub fn log_det_spd(a: ArrayView2<f64>) -> Option<f64> {
    cholesky(a).map(|l| 2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>())
}

/// `X' diag(w) X`
pub fn weighted_gram(design: ArrayView2<f64>, weights: &[f64]) -> Array2<f64> {
    let p = design.ncols();
    let mut gram = Array2::<f64>::zeros((p, p));
    for (row, &w) in design.outer_iter().zip(weights) {
        for j in 0..p {
            for k in 0..=j {
                gram[[j, k]] += w * row[j] * row[k];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            gram[[k, j]] = gram[[j, k]];
        }
    }
    gram
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_solve_and_inverse() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let x = solve_spd(a.view(), array![2.0, 1.0].view()).unwrap();
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);

        let inv = invert_spd(a.view()).unwrap();
        let eye = a.dot(&inv);
        assert_relative_eq!(eye[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(eye[[0, 1]], 0.0, epsilon = 1e-12);

        assert_relative_eq!(log_det_spd(a.view()).unwrap(), 8.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_not_positive_definite() {
        assert!(cholesky(array![[1.0, 2.0], [2.0, 1.0]].view()).is_none());
        assert!(cholesky(array![[0.0]].view()).is_none());
    }

    #[test]
    fn test_weighted_gram() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let g = weighted_gram(x.view(), &[1.0, 2.0, 3.0]);
        assert_eq!(g, array![[6.0, 5.0], [5.0, 5.0]]);
    }
}
