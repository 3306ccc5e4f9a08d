//! Vector and matrix products.
//!
//! Every product writes into a caller-owned output, resizing it only when the
//! result shape differs from the previous call. Matrix products split the work
//! by output row through [`crate::parallel::dynamic_parallel_for_chunks`], so
//! each worker fills a disjoint block of rows.
//!
//! The transposed variants read the operand in its stored layout; no
//! transposed copy is ever built.

use super::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector, VectorView};
use crate::error::{Error, Result};
use crate::parallel;

/// `Σ a[i] * b[i]`.
///
/// # Errors
///
/// [`Error::Dimension`] if the lengths differ.
pub fn dot(a: VectorView<'_>, b: VectorView<'_>) -> Result<TensorFloat> {
    if a.len() != b.len() {
        return Err(Error::dimension("dot", a.shape(), b.shape()));
    }
    Ok(row_dot(a.as_slice(), b.as_slice()))
}

/// Matrix-vector product `out = a · x`.
///
/// # Errors
///
/// [`Error::Dimension`] if `a.cols() != x.len()`.
pub fn dot_mv(a: MatrixView<'_>, x: VectorView<'_>, out: &mut Vector) -> Result<()> {
    if a.cols() != x.len() {
        return Err(Error::dimension("dot_mv", &[a.cols()], x.shape()));
    }
    out.resize(a.rows());
    let xs = x.as_slice();
    parallel::dynamic_parallel_for_chunks(
        a.cols(),
        out.data_mut(),
        1,
        |r, o| o[0] = row_dot(a.row(r), xs),
        None,
        0,
    );
    Ok(())
}

/// Matrix product `out = a · b` for `a: [m, k]`, `b: [k, n]`.
///
/// # Errors
///
/// [`Error::Dimension`] if the inner dimensions differ.
pub fn dot_mm(a: MatrixView<'_>, b: MatrixView<'_>, out: &mut Matrix) -> Result<()> {
    if a.cols() != b.rows() {
        return Err(Error::dimension("dot_mm", &[a.cols(), b.cols()], b.shape()));
    }
    let (n, k) = (b.cols(), a.cols());
    out.resize(a.rows(), n);
    parallel::dynamic_parallel_for_chunks(
        n * k,
        out.data_mut(),
        n,
        |r, o| {
            o.fill(0.0);
            for (p, &av) in a.row(r).iter().enumerate() {
                axpy(av, b.row(p), o);
            }
        },
        None,
        0,
    );
    Ok(())
}

/// Transposed-left product `out = aᵗ · b` for `a: [k, m]`, `b: [k, n]`.
///
/// # Errors
///
/// [`Error::Dimension`] if `a` and `b` have different row counts.
pub fn dot_tn(a: MatrixView<'_>, b: MatrixView<'_>, out: &mut Matrix) -> Result<()> {
    if a.rows() != b.rows() {
        return Err(Error::dimension("dot_tn", &[a.rows(), b.cols()], b.shape()));
    }
    let (m, n, k) = (a.cols(), b.cols(), a.rows());
    out.resize(m, n);
    parallel::dynamic_parallel_for_chunks(
        n * k,
        out.data_mut(),
        n,
        |i, o| {
            o.fill(0.0);
            for p in 0..k {
                axpy(a.row(p)[i], b.row(p), o);
            }
        },
        None,
        0,
    );
    Ok(())
}

/// Transposed-right product `out = a · bᵗ` for `a: [m, k]`, `b: [n, k]`.
///
/// # Errors
///
/// [`Error::Dimension`] if `a` and `b` have different column counts.
pub fn dot_nt(a: MatrixView<'_>, b: MatrixView<'_>, out: &mut Matrix) -> Result<()> {
    if a.cols() != b.cols() {
        return Err(Error::dimension("dot_nt", &[b.rows(), a.cols()], b.shape()));
    }
    let (n, k) = (b.rows(), a.cols());
    out.resize(a.rows(), n);
    parallel::dynamic_parallel_for_chunks(
        n * k,
        out.data_mut(),
        n,
        |r, o| {
            let lhs = a.row(r);
            for (j, v) in o.iter_mut().enumerate() {
                *v = row_dot(lhs, b.row(j));
            }
        },
        None,
        0,
    );
    Ok(())
}

#[inline]
fn row_dot(a: &[TensorFloat], b: &[TensorFloat]) -> TensorFloat {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`
#[inline]
fn axpy(alpha: TensorFloat, x: &[TensorFloat], y: &mut [TensorFloat]) {
    for (yv, xv) in y.iter_mut().zip(x) {
        *yv += alpha * xv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: usize, cols: usize, data: &[TensorFloat]) -> Matrix {
        Matrix::from_vec(rows, cols, data.to_vec()).unwrap()
    }

    fn naive(a: &Matrix, b: &Matrix) -> Matrix {
        let mut out = Matrix::zeros(a.rows(), b.cols());
        for i in 0..a.rows() {
            for j in 0..b.cols() {
                out[(i, j)] = (0..a.cols()).map(|p| a[(i, p)] * b[(p, j)]).sum();
            }
        }
        out
    }

    fn transpose(a: &Matrix) -> Matrix {
        let mut t = Matrix::zeros(a.cols(), a.rows());
        for i in 0..a.rows() {
            for j in 0..a.cols() {
                t[(j, i)] = a[(i, j)];
            }
        }
        t
    }

    fn counting(rows: usize, cols: usize, scale: TensorFloat) -> Matrix {
        let mut n = 0.0;
        Matrix::generate(rows, cols, || {
            n += 1.0;
            (n * scale).sin()
        })
    }

    #[test]
    fn vector_dot() {
        let a = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = Vector::from_vec(vec![4.0, -5.0, 6.0]);
        assert_eq!(dot(a.view(), b.view()).unwrap(), 12.0);
        assert!(dot(a.view(), Vector::zeros(2).view()).is_err());
    }

    #[test]
    fn matrix_vector() {
        let a = m(2, 3, &[1.0, 0.0, 2.0, -1.0, 3.0, 1.0]);
        let x = Vector::from_vec(vec![3.0, 2.0, 1.0]);
        let mut out = Vector::default();
        dot_mv(a.view(), x.view(), &mut out).unwrap();
        assert_eq!(out.data(), &[5.0, 4.0]);
    }

    #[test]
    fn matrix_matrix_matches_naive() {
        let a = counting(5, 4, 0.3);
        let b = counting(4, 3, 0.7);
        let mut out = Matrix::default();
        dot_mm(a.view(), b.view(), &mut out).unwrap();
        let expected = naive(&a, &b);
        for (x, y) in out.data().iter().zip(expected.data()) {
            assert!((x - y).abs() < 1e-5);
        }
        assert!(dot_mm(a.view(), a.view(), &mut out).is_err());
    }

    #[test]
    fn transposed_products_match_explicit_transpose() {
        let a = counting(6, 4, 0.11);
        let b = counting(6, 3, 0.23);
        let mut tn = Matrix::default();
        dot_tn(a.view(), b.view(), &mut tn).unwrap();
        let expected = naive(&transpose(&a), &b);
        assert_eq!(tn.shape(), &[4, 3]);
        for (x, y) in tn.data().iter().zip(expected.data()) {
            assert!((x - y).abs() < 1e-5);
        }

        let c = counting(5, 4, 0.37);
        let mut nt = Matrix::default();
        dot_nt(a.view(), c.view(), &mut nt).unwrap();
        let expected = naive(&a, &transpose(&c));
        assert_eq!(nt.shape(), &[6, 5]);
        for (x, y) in nt.data().iter().zip(expected.data()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn large_products_take_the_parallel_path() {
        let a = counting(128, 96, 0.01);
        let b = counting(80, 96, 0.02);
        let mut par = Matrix::default();
        dot_nt(a.view(), b.view(), &mut par).unwrap();
        let expected = naive(&a, &transpose(&b));
        for (x, y) in par.data().iter().zip(expected.data()) {
            assert!((x - y).abs() < 1e-3);
        }
    }
}
