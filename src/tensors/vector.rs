use super::{Matrix, TensorFloat, TensorOps, TensorOpsMut, VectorView};
use crate::error::{Error, Result};
use core::ops::{Index, IndexMut};

/// An owned, fixed-length vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    data: Vec<TensorFloat>,
    shape: [usize; 1],
}

impl Vector {
    /// Creates a zero-filled vector.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
            shape: [len],
        }
    }

    /// Wraps an existing buffer.
    #[must_use]
    pub fn from_vec(data: Vec<TensorFloat>) -> Self {
        let shape = [data.len()];
        Self { data, shape }
    }

    /// Fills a new vector by calling `f` once per element, in order.
    pub fn generate(len: usize, mut f: impl FnMut() -> TensorFloat) -> Self {
        Self::from_vec((0..len).map(|_| f()).collect())
    }

    /// Bounds-checked element access.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<TensorFloat> {
        self.data.get(i).copied()
    }

    /// Borrows the whole vector.
    #[must_use]
    pub fn view(&self) -> VectorView<'_> {
        VectorView::new(&self.data)
    }

    /// Borrows `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `start >= end` or `end > len`.
    pub fn view_range(&self, start: usize, end: usize) -> Result<VectorView<'_>> {
        self.view().slice(start, end)
    }

    /// Resizes to `len` elements, reallocating only if the length changes.
    ///
    /// Returns whether the length changed. New elements are zero.
    pub fn resize(&mut self, len: usize) -> bool {
        if self.shape[0] == len {
            return false;
        }
        self.data.resize(len, 0.0);
        self.shape = [len];
        true
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: TensorFloat) {
        self.data.fill(value);
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> TensorFloat {
        self.view().sum()
    }

    /// Arithmetic mean, `0` for an empty vector.
    #[must_use]
    pub fn mean(&self) -> TensorFloat {
        self.view().mean()
    }

    /// Reinterprets the buffer as a `rows x cols` matrix.
    ///
    /// # Errors
    ///
    /// [`Error::Reshape`] if `rows * cols != len`.
    pub fn into_matrix(self, rows: usize, cols: usize) -> Result<Matrix> {
        if rows * cols != self.data.len() {
            return Err(Error::Reshape {
                from: self.shape.to_vec(),
                to: vec![rows, cols],
            });
        }
        Matrix::from_vec(rows, cols, self.data)
    }

    /// Consumes the vector, returning its buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<TensorFloat> {
        self.data
    }
}

impl TensorOps for Vector {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> &[TensorFloat] {
        &self.data
    }
}

impl TensorOpsMut for Vector {
    fn data_mut(&mut self) -> &mut [TensorFloat] {
        &mut self.data
    }

    fn resize_to(&mut self, shape: &[usize]) -> Result<()> {
        match *shape {
            [len] => {
                self.resize(len);
                Ok(())
            }
            _ => Err(Error::dimension("resize_to", &self.shape, shape)),
        }
    }
}

impl Index<usize> for Vector {
    type Output = TensorFloat;

    fn index(&self, i: usize) -> &TensorFloat {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut TensorFloat {
        &mut self.data[i]
    }
}

impl From<Vec<TensorFloat>> for Vector {
    fn from(data: Vec<TensorFloat>) -> Self {
        Self::from_vec(data)
    }
}
