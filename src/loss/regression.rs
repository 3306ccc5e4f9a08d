use super::{dense_targets, LossFunction};
use crate::data::Targets;
use crate::error::Result;
use crate::parallel;
use crate::tensors::transform::transform2;
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector};

/// `sign` with `sign(0) = 0`.
fn signum0(x: TensorFloat) -> TensorFloat {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Row means of `per_element(prediction - target)`.
#[allow(clippy::cast_precision_loss)]
fn row_means(
    predictions: MatrixView<'_>,
    y: MatrixView<'_>,
    losses: &mut Vector,
    per_element: impl Fn(TensorFloat) -> TensorFloat + Sync,
) {
    let cols = predictions.cols();
    let outputs = cols.max(1) as TensorFloat;
    losses.resize(predictions.rows());
    parallel::dynamic_parallel_for_chunks(
        cols,
        losses.data_mut(),
        1,
        |r, l| {
            let total: TensorFloat = predictions
                .row(r)
                .iter()
                .zip(y.row(r))
                .map(|(&p, &t)| per_element(p - t))
                .sum();
            l[0] = total / outputs;
        },
        None,
        0,
    );
}

/// Mean squared error for regression outputs.
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError {
    losses: Vector,
    dinputs: Matrix,
}

impl LossFunction for MeanSquaredError {
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("MeanSquaredError::forward", targets, predictions)?;
        row_means(predictions, y, &mut self.losses, |d| d * d);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("MeanSquaredError::backward", targets, predictions)?;
        let n = predictions.len().max(1) as TensorFloat;
        transform2(&predictions, &y, &mut self.dinputs, |p, t| 2.0 * (p - t) / n)
    }

    fn sample_losses(&self) -> &Vector {
        &self.losses
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }

    fn accuracy(&self, _: MatrixView<'_>, _: &Targets<'_>) -> Result<Option<TensorFloat>> {
        Ok(None)
    }
}

/// Mean absolute error for regression outputs.
#[derive(Debug, Clone, Default)]
pub struct MeanAbsoluteError {
    losses: Vector,
    dinputs: Matrix,
}

impl LossFunction for MeanAbsoluteError {
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("MeanAbsoluteError::forward", targets, predictions)?;
        row_means(predictions, y, &mut self.losses, TensorFloat::abs);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("MeanAbsoluteError::backward", targets, predictions)?;
        let n = predictions.len().max(1) as TensorFloat;
        transform2(&predictions, &y, &mut self.dinputs, |p, t| signum0(p - t) / n)
    }

    fn sample_losses(&self) -> &Vector {
        &self.losses
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }

    fn accuracy(&self, _: MatrixView<'_>, _: &Targets<'_>) -> Result<Option<TensorFloat>> {
        Ok(None)
    }
}
