use super::{MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector, VectorView};
use crate::error::{Error, Result};
use crate::parallel;
use core::ops::{Index, IndexMut};

/// An owned, row-major `rows x cols` matrix.
///
/// The first axis is the batch, the second the feature axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    data: Vec<TensorFloat>,
    shape: [usize; 2],
}

impl Matrix {
    /// Creates a zero-filled matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            shape: [rows, cols],
        }
    }

    /// Wraps an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<TensorFloat>) -> Result<Self> {
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

    /// Fills a new matrix by calling `f` once per element in row-major order.
    pub fn generate(rows: usize, cols: usize, mut f: impl FnMut() -> TensorFloat) -> Self {
        Self {
            data: (0..rows * cols).map(|_| f()).collect(),
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

    /// Bounds-checked element access.
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<TensorFloat> {
        self.view().get(r, c)
    }

    /// Row `r` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `r >= rows`.
    #[must_use]
    pub fn row(&self, r: usize) -> &[TensorFloat] {
        let cols = self.shape[1];
        &self.data[r * cols..(r + 1) * cols]
    }

    /// Row `r` as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if `r >= rows`.
    pub fn row_mut(&mut self, r: usize) -> &mut [TensorFloat] {
        let cols = self.shape[1];
        &mut self.data[r * cols..(r + 1) * cols]
    }

    /// Borrows the whole matrix.
    #[must_use]
    pub fn view(&self) -> MatrixView<'_> {
        MatrixView::from_parts(self.shape[0], self.shape[1], &self.data)
    }

    /// Borrows rows `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `start >= end` or `end > rows`.
    pub fn view_rows(&self, start: usize, end: usize) -> Result<MatrixView<'_>> {
        self.view().rows_range(start, end)
    }

    /// Resizes to `rows x cols`, reallocating only if the shape changes.
    ///
    /// Returns whether the shape changed. Element values are unspecified
    /// after a change; callers overwrite the buffer.
    pub fn resize(&mut self, rows: usize, cols: usize) -> bool {
        if self.shape == [rows, cols] {
            return false;
        }
        self.data.resize(rows * cols, 0.0);
        self.shape = [rows, cols];
        true
    }

    /// Changes the shape in place while keeping every element.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if `rows * cols` differs from the element count.
    pub fn reshape(&mut self, rows: usize, cols: usize) -> Result<()> {
        if rows * cols != self.data.len() {
            return Err(Error::Reshape {
                from: self.shape.to_vec(),
                to: vec![rows, cols],
            });
        }
        self.shape = [rows, cols];
        Ok(())
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: TensorFloat) {
        self.data.fill(value);
    }

    /// Makes `self` an exact copy of `src`, resizing if needed.
    pub fn copy_from(&mut self, src: MatrixView<'_>) {
        self.resize(src.rows(), src.cols());
        self.data.copy_from_slice(src.as_slice());
    }

    /// Copies the rows of `src` listed in `indices`, in order, into `self`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if an index is out of range for `src`.
    pub fn gather_rows(&mut self, src: MatrixView<'_>, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= src.rows()) {
            return Err(Error::Range {
                start: bad,
                end: bad + 1,
                len: src.rows(),
            });
        }
        let cols = src.cols();
        self.resize(indices.len(), cols);
        parallel::dynamic_parallel_for_chunks(
            cols,
            &mut self.data,
            cols,
            |r, row| row.copy_from_slice(src.row(indices[r])),
            None,
            0,
        );
        Ok(())
    }

    /// Adds `v` to every row (bias broadcast).
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`] if `v.len() != cols`.
    pub fn add_row_vector(&mut self, v: VectorView<'_>) -> Result<()> {
        if v.len() != self.shape[1] {
            return Err(Error::dimension("add_row_vector", &[self.shape[1]], v.shape()));
        }
        let cols = self.shape[1];
        let bias = v.as_slice();
        parallel::dynamic_parallel_for_chunks(
            cols,
            &mut self.data,
            cols,
            |_, row| {
                for (x, b) in row.iter_mut().zip(bias) {
                    *x += b;
                }
            },
            None,
            0,
        );
        Ok(())
    }

    /// Index of the largest element of every row.
    #[must_use]
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.view().argmax_rows()
    }

    /// Writes the sum of every column into `out`.
    pub fn sum_columns_into(&self, out: &mut Vector) {
        self.view().sum_columns_into(out);
    }

    /// Consumes the matrix, returning its buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<TensorFloat> {
        self.data
    }
}

impl TensorOps for Matrix {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> &[TensorFloat] {
        &self.data
    }
}

impl TensorOpsMut for Matrix {
    fn data_mut(&mut self) -> &mut [TensorFloat] {
        &mut self.data
    }

    fn resize_to(&mut self, shape: &[usize]) -> Result<()> {
        match *shape {
            [rows, cols] => {
                self.resize(rows, cols);
                Ok(())
            }
            _ => Err(Error::dimension("resize_to", &self.shape, shape)),
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = TensorFloat;

    fn index(&self, (r, c): (usize, usize)) -> &TensorFloat {
        &self.data[r * self.shape[1] + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut TensorFloat {
        &mut self.data[r * self.shape[1] + c]
    }
}

impl<'a> From<&'a Matrix> for MatrixView<'a> {
    fn from(m: &'a Matrix) -> Self {
        m.view()
    }
}
