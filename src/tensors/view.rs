use super::{TensorFloat, TensorOps, TensorOpsMut, Vector};
use crate::error::{Error, Result};
use core::ops::Index;

/// A borrowed, read-only window over a vector buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorView<'a> {
    data: &'a [TensorFloat],
    shape: [usize; 1],
}

impl<'a> VectorView<'a> {
    /// Views `data` as a vector.
    #[must_use]
    pub fn new(data: &'a [TensorFloat]) -> Self {
        Self {
            data,
            shape: [data.len()],
        }
    }

    /// The borrowed buffer, with the owner's lifetime.
    #[must_use]
    pub fn as_slice(&self) -> &'a [TensorFloat] {
        self.data
    }

    /// Narrows the view to `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `start >= end` or `end` exceeds the view.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        check_range(start, end, self.data.len())?;
        Ok(Self::new(&self.data[start..end]))
    }

    /// Reinterprets the view as `rows x cols`.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if the element count would change.
    pub fn reshape(&self, rows: usize, cols: usize) -> Result<MatrixView<'a>> {
        if rows * cols != self.data.len() {
            return Err(Error::Reshape {
                from: self.shape.to_vec(),
                to: vec![rows, cols],
            });
        }
        Ok(MatrixView {
            data: self.data,
            shape: [rows, cols],
        })
    }

    /// Bounds-checked element access.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<TensorFloat> {
        self.data.get(i).copied()
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> TensorFloat {
        self.data.iter().sum()
    }

    /// Arithmetic mean, `0` for an empty view.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> TensorFloat {
        if self.data.is_empty() {
            0.0
        } else {
            self.sum() / self.data.len() as TensorFloat
        }
    }

    /// Copies the viewed elements into an owned vector.
    #[must_use]
    pub fn to_vector(&self) -> Vector {
        Vector::from_vec(self.data.to_vec())
    }
}

impl TensorOps for VectorView<'_> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> &[TensorFloat] {
        self.data
    }
}

impl Index<usize> for VectorView<'_> {
    type Output = TensorFloat;

    fn index(&self, i: usize) -> &TensorFloat {
        &self.data[i]
    }
}

/// A borrowed, read-only window over a row-major matrix buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixView<'a> {
    data: &'a [TensorFloat],
    shape: [usize; 2],
}

impl<'a> MatrixView<'a> {
    /// Views `data` as a `rows x cols` matrix.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: &'a [TensorFloat]) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(Error::Reshape {
                from: vec![data.len()],
                to: vec![rows, cols],
            });
        }
        Ok(Self {
            data,
            shape: [rows, cols],
        })
    }

    pub(crate) fn from_parts(rows: usize, cols: usize, data: &'a [TensorFloat]) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self {
            data,
            shape: [rows, cols],
        }
    }

    /// Number of rows (batch axis).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Number of columns (feature axis).
    #[must_use]
    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// The borrowed buffer, with the owner's lifetime.
    #[must_use]
    pub fn as_slice(&self) -> &'a [TensorFloat] {
        self.data
    }

    /// Row `r` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `r >= rows`.
    #[must_use]
    pub fn row(&self, r: usize) -> &'a [TensorFloat] {
        let cols = self.shape[1];
        &self.data[r * cols..(r + 1) * cols]
    }

    /// Bounds-checked element access.
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<TensorFloat> {
        if r < self.shape[0] && c < self.shape[1] {
            Some(self.data[r * self.shape[1] + c])
        } else {
            None
        }
    }

    /// Narrows the view to rows `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `start >= end` or `end > rows`.
    pub fn rows_range(&self, start: usize, end: usize) -> Result<Self> {
        check_range(start, end, self.shape[0])?;
        let cols = self.shape[1];
        Ok(Self {
            data: &self.data[start * cols..end * cols],
            shape: [end - start, cols],
        })
    }

    /// Reinterprets the view as `rows x cols`.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if the element count would change.
    pub fn reshape(&self, rows: usize, cols: usize) -> Result<Self> {
        if rows * cols != self.data.len() {
            return Err(Error::Reshape {
                from: self.shape.to_vec(),
                to: vec![rows, cols],
            });
        }
        Ok(Self {
            data: self.data,
            shape: [rows, cols],
        })
    }

    /// Views the whole buffer as a flat vector.
    #[must_use]
    pub fn flatten(&self) -> VectorView<'a> {
        VectorView::new(self.data)
    }

    /// Index of the largest element of every row (first one on ties).
    #[must_use]
    pub fn argmax_rows(&self) -> Vec<usize> {
        if self.shape[1] == 0 {
            return vec![0; self.shape[0]];
        }
        self.data
            .chunks(self.shape[1])
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, TensorFloat::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }

    /// Writes the sum of every column into `out`, resizing it to `cols`.
    pub fn sum_columns_into(&self, out: &mut Vector) {
        out.resize(self.shape[1]);
        out.fill(0.0);
        if self.shape[1] == 0 {
            return;
        }
        let sums = out.data_mut();
        for row in self.data.chunks(self.shape[1]) {
            for (acc, &v) in sums.iter_mut().zip(row) {
                *acc += v;
            }
        }
    }
}

impl TensorOps for MatrixView<'_> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> &[TensorFloat] {
        self.data
    }
}

impl Index<(usize, usize)> for MatrixView<'_> {
    type Output = TensorFloat;

    fn index(&self, (r, c): (usize, usize)) -> &TensorFloat {
        &self.data[r * self.shape[1] + c]
    }
}

fn check_range(start: usize, end: usize, len: usize) -> Result<()> {
    if start >= end || end > len {
        return Err(Error::Range { start, end, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::Matrix;

    #[test]
    fn rows_range_rejects_empty_and_overlong_ranges() {
        let m = Matrix::zeros(4, 2);
        let v = m.view();
        assert!(matches!(v.rows_range(2, 2), Err(Error::Range { .. })));
        assert!(matches!(v.rows_range(1, 5), Err(Error::Range { .. })));
        let tail = v.rows_range(1, 4).unwrap();
        assert_eq!(tail.shape(), &[3, 2]);
    }

    #[test]
    fn reshape_preserves_element_count() {
        let m = Matrix::from_vec(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let v = m.view();
        let r = v.reshape(3, 2).unwrap();
        assert_eq!(r[(2, 1)], 5.0);
        assert!(v.reshape(4, 2).is_err());
        assert!(v.flatten().reshape(1, 5).is_err());
    }

    #[test]
    fn argmax_takes_first_maximum() {
        let m = Matrix::from_vec(3, 3, vec![0.1, 0.7, 0.2, 0.5, 0.5, 0.0, -3.0, -2.0, -1.0]).unwrap();
        assert_eq!(m.view().argmax_rows(), vec![1, 0, 2]);
    }

    #[test]
    fn column_sums() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = Vector::zeros(0);
        m.view().sum_columns_into(&mut out);
        assert_eq!(out.data(), &[4.0, 6.0]);
    }

    #[test]
    fn vector_slice_checks_bounds() {
        let v = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.view_range(1, 3).unwrap().data(), &[2.0, 3.0]);
        assert!(v.view_range(2, 1).is_err());
        assert!(v.view_range(0, 4).is_err());
    }
}
