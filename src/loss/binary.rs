use super::{clamp_probability, dense_targets, LossFunction};
use crate::data::Targets;
use crate::error::Result;
use crate::parallel;
use crate::tensors::transform::transform2;
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector};

/// Element-wise binary cross-entropy, averaged over the outputs of a row.
///
/// Every output is an independent yes/no prediction in `(0, 1)`, typically
/// behind a sigmoid. Targets must be dense.
#[derive(Debug, Clone, Default)]
pub struct BinaryCrossEntropy {
    losses: Vector,
    dinputs: Matrix,
}

impl LossFunction for BinaryCrossEntropy {
    #[allow(clippy::cast_precision_loss)]
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("BinaryCrossEntropy::forward", targets, predictions)?;
        let cols = predictions.cols();
        let outputs = cols.max(1) as TensorFloat;
        self.losses.resize(predictions.rows());
        parallel::dynamic_parallel_for_chunks(
            cols,
            self.losses.data_mut(),
            1,
            |r, l| {
                let total: TensorFloat = predictions
                    .row(r)
                    .iter()
                    .zip(y.row(r))
                    .map(|(&p, &t)| {
                        let p = clamp_probability(p);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum();
                l[0] = total / outputs;
            },
            None,
            0,
        );
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let y = dense_targets("BinaryCrossEntropy::backward", targets, predictions)?;
        let n = predictions.len().max(1) as TensorFloat;
        transform2(&predictions, &y, &mut self.dinputs, |p, t| {
            let p = clamp_probability(p);
            -(t / p - (1.0 - t) / (1.0 - p)) / n
        })
    }

    fn sample_losses(&self) -> &Vector {
        &self.losses
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }

    /// Per-element accuracy with predictions thresholded at `0.5`.
    #[allow(clippy::cast_precision_loss)]
    fn accuracy(&self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<Option<TensorFloat>> {
        let y = dense_targets("BinaryCrossEntropy::accuracy", targets, predictions)?;
        if predictions.is_empty() {
            return Ok(Some(0.0));
        }
        let correct = predictions
            .as_slice()
            .iter()
            .zip(y.as_slice())
            .filter(|&(&p, &t)| (p > 0.5) == (t > 0.5))
            .count();
        Ok(Some(correct as TensorFloat / predictions.len() as TensorFloat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn loss_averages_over_outputs() {
        let p = Matrix::from_vec(1, 2, vec![0.8, 0.3]).unwrap();
        let y = Matrix::from_vec(1, 2, vec![1.0, 0.0]).unwrap();
        let mut loss = BinaryCrossEntropy::default();
        loss.forward(p.view(), &Targets::from(&y)).unwrap();
        let expected = -(0.8f32.ln() + 0.7f32.ln()) / 2.0;
        assert!((loss.mean() - expected).abs() < 1e-6);
    }

    #[test]
    fn gradient_is_normalized_by_every_element() {
        let p = Matrix::from_vec(2, 2, vec![0.5; 4]).unwrap();
        let y = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let mut loss = BinaryCrossEntropy::default();
        loss.backward(p.view(), &Targets::from(&y)).unwrap();
        assert_eq!(loss.dinputs().data(), &[-0.5, 0.5, 0.5, -0.5]);
    }

    #[test]
    fn accuracy_thresholds_each_output() {
        let p = Matrix::from_vec(2, 2, vec![0.9, 0.4, 0.6, 0.1]).unwrap();
        let y = Matrix::from_vec(2, 2, vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        let loss = BinaryCrossEntropy::default();
        let acc = loss.accuracy(p.view(), &Targets::from(&y)).unwrap();
        assert_eq!(acc, Some(0.5));
    }

    #[test]
    fn class_indices_are_rejected() {
        let p = Matrix::zeros(2, 1);
        let mut loss = BinaryCrossEntropy::default();
        assert!(matches!(
            loss.forward(p.view(), &Targets::Sparse(&[0, 1])),
            Err(Error::Configuration(_))
        ));
    }
}
