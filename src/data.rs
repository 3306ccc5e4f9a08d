//! Borrowed training data.
//!
//! A [`Dataset`] pairs a `[samples, features]` input view with its
//! [`Targets`]. Neither is copied; batching hands out row windows of the
//! borrowed buffers, or gathers shuffled rows into reusable [`TargetBuffer`]s.

use crate::error::{Error, Result};
use crate::tensors::{Matrix, MatrixView, TensorOps};

/// Expected outputs for a batch of predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Targets<'a> {
    /// One class index per row.
    Sparse(&'a [usize]),
    /// One target row per prediction row (one-hot, binary or regression).
    Dense(MatrixView<'a>),
}

impl<'a> Targets<'a> {
    /// Number of rows described.
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Sparse(idx) => idx.len(),
            Self::Dense(m) => m.rows(),
        }
    }

    /// Narrows to rows `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `start >= end` or `end > rows`.
    pub fn rows_range(&self, start: usize, end: usize) -> Result<Self> {
        match self {
            Self::Sparse(idx) => {
                if start >= end || end > idx.len() {
                    return Err(Error::Range {
                        start,
                        end,
                        len: idx.len(),
                    });
                }
                Ok(Self::Sparse(&idx[start..end]))
            }
            Self::Dense(m) => Ok(Self::Dense(m.rows_range(start, end)?)),
        }
    }

    /// Checks that these targets can score `predictions`.
    ///
    /// Sparse targets need one in-range class index per row; dense targets
    /// need exactly the predictions' shape.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`] on a row-count or shape mismatch,
    /// [`Error::Range`] for a class index outside `0..cols`.
    pub fn check(&self, op: &'static str, predictions: MatrixView<'_>) -> Result<()> {
        match self {
            Self::Sparse(idx) => {
                if idx.len() != predictions.rows() {
                    return Err(Error::dimension(op, &[predictions.rows()], &[idx.len()]));
                }
                if let Some(&bad) = idx.iter().find(|&&c| c >= predictions.cols()) {
                    return Err(Error::Range {
                        start: bad,
                        end: bad + 1,
                        len: predictions.cols(),
                    });
                }
                Ok(())
            }
            Self::Dense(m) => {
                if m.shape() != predictions.shape() {
                    return Err(Error::dimension(op, predictions.shape(), m.shape()));
                }
                Ok(())
            }
        }
    }
}

impl<'a> From<&'a [usize]> for Targets<'a> {
    fn from(idx: &'a [usize]) -> Self {
        Self::Sparse(idx)
    }
}

impl<'a> From<MatrixView<'a>> for Targets<'a> {
    fn from(m: MatrixView<'a>) -> Self {
        Self::Dense(m)
    }
}

impl<'a> From<&'a Matrix> for Targets<'a> {
    fn from(m: &'a Matrix) -> Self {
        Self::Dense(m.view())
    }
}

/// Owned storage for gathered target rows, reused across batches.
#[derive(Debug, Clone)]
pub enum TargetBuffer {
    /// Gathered class indices.
    Sparse(Vec<usize>),
    /// Gathered one-hot or value rows.
    Dense(Matrix),
}

impl TargetBuffer {
    /// An empty buffer of the same kind as `targets`.
    #[must_use]
    pub fn like(targets: &Targets<'_>) -> Self {
        match targets {
            Targets::Sparse(_) => Self::Sparse(Vec::new()),
            Targets::Dense(_) => Self::Dense(Matrix::default()),
        }
    }

    /// Replaces the contents with rows `indices` of `src`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] for an out-of-range index, [`Error::Configuration`]
    /// if the buffer kind differs from `src`.
    pub fn gather(&mut self, src: &Targets<'_>, indices: &[usize]) -> Result<()> {
        match (self, src) {
            (Self::Sparse(buf), Targets::Sparse(idx)) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= idx.len()) {
                    return Err(Error::Range {
                        start: bad,
                        end: bad + 1,
                        len: idx.len(),
                    });
                }
                buf.clear();
                buf.extend(indices.iter().map(|&i| idx[i]));
                Ok(())
            }
            (Self::Dense(buf), Targets::Dense(m)) => buf.gather_rows(*m, indices),
            _ => Err(Error::config("target buffer kind does not match the targets")),
        }
    }

    /// Borrows the buffer as targets.
    #[must_use]
    pub fn as_targets(&self) -> Targets<'_> {
        match self {
            Self::Sparse(buf) => Targets::Sparse(buf),
            Self::Dense(m) => Targets::Dense(m.view()),
        }
    }
}

/// Inputs paired with their targets.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    inputs: MatrixView<'a>,
    targets: Targets<'a>,
}

impl<'a> Dataset<'a> {
    /// Pairs `inputs` with `targets`.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`] if the row counts differ,
    /// [`Error::Configuration`] if there are no samples.
    pub fn new(inputs: MatrixView<'a>, targets: Targets<'a>) -> Result<Self> {
        if inputs.rows() != targets.rows() {
            return Err(Error::dimension("Dataset::new", &[inputs.rows()], &[targets.rows()]));
        }
        if inputs.rows() == 0 {
            return Err(Error::config("dataset has no samples"));
        }
        Ok(Self { inputs, targets })
    }

    /// Feature rows, one sample per row.
    #[must_use]
    pub fn inputs(&self) -> MatrixView<'a> {
        self.inputs
    }

    /// Targets aligned with [`Dataset::inputs`].
    #[must_use]
    pub fn targets(&self) -> Targets<'a> {
        self.targets
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    /// Always `false`; an empty dataset cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Features per sample.
    #[must_use]
    pub fn features(&self) -> usize {
        self.inputs.cols()
    }

    /// Samples `start..end`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if the range is empty or out of bounds.
    pub fn rows_range(&self, start: usize, end: usize) -> Result<Self> {
        Ok(Self {
            inputs: self.inputs.rows_range(start, end)?,
            targets: self.targets.rows_range(start, end)?,
        })
    }

    /// Splits off the trailing `fraction` of samples as a validation set.
    ///
    /// The validation part holds `floor(len * fraction)` rows and is `None`
    /// when that is zero.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless `0 <= fraction < 1`, or if no training
    /// samples would remain.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn split_validation(&self, fraction: f32) -> Result<(Self, Option<Self>)> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(Error::config(format!(
                "validation split must be in [0, 1), got {fraction}"
            )));
        }
        let n = self.len();
        let held = (n as f32 * fraction).floor() as usize;
        if held == 0 {
            return Ok((*self, None));
        }
        if held >= n {
            return Err(Error::config("validation split leaves no training samples"));
        }
        Ok((self.rows_range(0, n - held)?, Some(self.rows_range(n - held, n)?)))
    }
}
