//! Loss functions and their gradients.
//!
//! # Loss Contract
//!
//! Every loss implements [`LossFunction`]:
//!
//! - `forward(predictions, targets)` stores one loss value per row.
//! - `backward(predictions, targets)` stores the gradient of the batch-mean
//!   loss with respect to `predictions`, so every gradient carries the `1/N`
//!   normalization.
//! - `mean()` is the batch mean of the stored per-row losses.
//! - `accuracy(predictions, targets)` where the notion applies.
//!
//! Probabilities are clamped into `[EPSILON, 1 - EPSILON]` before any `ln`
//! or division, so neither forward nor backward produce infinities for
//! saturated predictions.
//!
//! ## Fused Softmax
//!
//! [`SoftmaxCategoricalCrossEntropy`] consumes raw logits. It stands in for a
//! trailing softmax layer plus [`CategoricalCrossEntropy`] and produces the
//! closed-form gradient `softmax - one_hot`, which equals the composition of
//! the two separate gradients without building the softmax Jacobian.

mod binary;
mod categorical;
mod regression;
mod softmax_categorical;

pub use self::binary::BinaryCrossEntropy;
pub use self::categorical::CategoricalCrossEntropy;
pub use self::regression::{MeanAbsoluteError, MeanSquaredError};
pub use self::softmax_categorical::SoftmaxCategoricalCrossEntropy;

use crate::data::Targets;
use crate::error::{Error, Result};
use crate::tensors::{Matrix, MatrixView, TensorFloat, Vector};

/// Clamp applied to probabilities before `ln` and division.
pub const EPSILON: TensorFloat = 1e-7;

pub(crate) fn clamp_probability(p: TensorFloat) -> TensorFloat {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// Which loss a model trains against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossKind {
    /// Cross-entropy on probabilities.
    Categorical,
    /// Cross-entropy on logits, paired with a trailing softmax layer.
    #[default]
    SoftmaxCategorical,
    /// Per-output binary cross-entropy on sigmoid outputs.
    Binary,
    /// Mean squared error.
    MeanSquared,
    /// Mean absolute error.
    MeanAbsolute,
}

/// Per-row loss and input gradient for a batch of predictions.
pub trait LossFunction {
    /// Computes the per-row losses.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`](crate::Error::Dimension) or
    /// [`Error::Range`](crate::Error::Range) if `targets` cannot score
    /// `predictions`.
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()>;

    /// Computes the gradient of the mean loss with respect to `predictions`.
    ///
    /// # Errors
    ///
    /// As [`LossFunction::forward`].
    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()>;

    /// Losses of the last forward pass, one per row.
    fn sample_losses(&self) -> &Vector;

    /// Gradient of the last backward pass.
    fn dinputs(&self) -> &Matrix;

    /// Batch mean of the last forward pass.
    fn mean(&self) -> TensorFloat {
        self.sample_losses().mean()
    }

    /// Fraction of correct predictions, if the loss defines one.
    ///
    /// # Errors
    ///
    /// As [`LossFunction::forward`].
    fn accuracy(&self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<Option<TensorFloat>>;
}

/// The target matrix of a loss that cannot use class indices.
pub(crate) fn dense_targets<'a>(
    op: &'static str,
    targets: &Targets<'a>,
    predictions: MatrixView<'_>,
) -> Result<MatrixView<'a>> {
    match *targets {
        Targets::Dense(y) => {
            targets.check(op, predictions)?;
            Ok(y)
        }
        Targets::Sparse(_) => Err(Error::config(format!("{op} needs dense targets, got class indices"))),
    }
}

/// Row-argmax accuracy against class indices or one-hot rows.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn class_accuracy(predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<TensorFloat> {
    targets.check("accuracy", predictions)?;
    if predictions.rows() == 0 {
        return Ok(0.0);
    }
    let predicted = predictions.argmax_rows();
    let correct = match targets {
        Targets::Sparse(idx) => predicted.iter().zip(idx.iter()).filter(|(p, y)| p == y).count(),
        Targets::Dense(y) => predicted
            .iter()
            .zip(y.argmax_rows())
            .filter(|(p, y)| **p == *y)
            .count(),
    };
    Ok(correct as TensorFloat / predictions.rows() as TensorFloat)
}

/// A loss of one of the supported kinds.
#[derive(Debug, Clone)]
pub enum Loss {
    /// See [`LossKind::Categorical`].
    Categorical(CategoricalCrossEntropy),
    /// See [`LossKind::SoftmaxCategorical`].
    SoftmaxCategorical(SoftmaxCategoricalCrossEntropy),
    /// See [`LossKind::Binary`].
    Binary(BinaryCrossEntropy),
    /// See [`LossKind::MeanSquared`].
    MeanSquared(MeanSquaredError),
    /// See [`LossKind::MeanAbsolute`].
    MeanAbsolute(MeanAbsoluteError),
}

impl Loss {
    /// A loss of `kind` with empty buffers.
    #[must_use]
    pub fn new(kind: LossKind) -> Self {
        match kind {
            LossKind::Categorical => Self::Categorical(CategoricalCrossEntropy::default()),
            LossKind::SoftmaxCategorical => Self::SoftmaxCategorical(SoftmaxCategoricalCrossEntropy::default()),
            LossKind::Binary => Self::Binary(BinaryCrossEntropy::default()),
            LossKind::MeanSquared => Self::MeanSquared(MeanSquaredError::default()),
            LossKind::MeanAbsolute => Self::MeanAbsolute(MeanAbsoluteError::default()),
        }
    }

    /// Which kind this loss is.
    #[must_use]
    pub fn kind(&self) -> LossKind {
        match self {
            Self::Categorical(_) => LossKind::Categorical,
            Self::SoftmaxCategorical(_) => LossKind::SoftmaxCategorical,
            Self::Binary(_) => LossKind::Binary,
            Self::MeanSquared(_) => LossKind::MeanSquared,
            Self::MeanAbsolute(_) => LossKind::MeanAbsolute,
        }
    }

    /// Whether the loss consumes logits in place of a trailing softmax.
    #[must_use]
    pub fn is_fused(&self) -> bool {
        matches!(self, Self::SoftmaxCategorical(_))
    }

    fn inner(&self) -> &dyn LossFunction {
        match self {
            Self::Categorical(l) => l,
            Self::SoftmaxCategorical(l) => l,
            Self::Binary(l) => l,
            Self::MeanSquared(l) => l,
            Self::MeanAbsolute(l) => l,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LossFunction {
        match self {
            Self::Categorical(l) => l,
            Self::SoftmaxCategorical(l) => l,
            Self::Binary(l) => l,
            Self::MeanSquared(l) => l,
            Self::MeanAbsolute(l) => l,
        }
    }
}

impl From<LossKind> for Loss {
    fn from(kind: LossKind) -> Self {
        Self::new(kind)
    }
}

impl LossFunction for Loss {
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        self.inner_mut().forward(predictions, targets)
    }

    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        self.inner_mut().backward(predictions, targets)
    }

    fn sample_losses(&self) -> &Vector {
        self.inner().sample_losses()
    }

    fn dinputs(&self) -> &Matrix {
        self.inner().dinputs()
    }

    fn accuracy(&self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<Option<TensorFloat>> {
        self.inner().accuracy(predictions, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip() {
        for kind in [
            LossKind::Categorical,
            LossKind::SoftmaxCategorical,
            LossKind::Binary,
            LossKind::MeanSquared,
            LossKind::MeanAbsolute,
        ] {
            assert_eq!(Loss::new(kind).kind(), kind);
        }
        assert!(Loss::new(LossKind::SoftmaxCategorical).is_fused());
        assert!(!Loss::new(LossKind::Categorical).is_fused());
    }

    #[test]
    fn class_accuracy_accepts_indices_and_one_hot() {
        let p = Matrix::from_vec(3, 2, vec![0.9, 0.1, 0.2, 0.8, 0.6, 0.4]).unwrap();
        let idx = [0usize, 1, 1];
        let acc = class_accuracy(p.view(), &Targets::Sparse(&idx)).unwrap();
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);

        let one_hot = Matrix::from_vec(3, 2, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        let acc = class_accuracy(p.view(), &Targets::from(&one_hot)).unwrap();
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);
    }
}
