use super::{class_accuracy, clamp_probability, LossFunction};
use crate::data::Targets;
use crate::error::Result;
use crate::parallel;
use crate::tensors::transform::transform2;
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOpsMut, Vector};

/// Cross-entropy over predicted class probabilities.
///
/// With class indices the loss of row `r` is `-ln(p[r, y_r])`. With dense
/// (one-hot) targets it is `-ln(Σ_c p[r, c] * y[r, c])`.
#[derive(Debug, Clone, Default)]
pub struct CategoricalCrossEntropy {
    losses: Vector,
    dinputs: Matrix,
}

impl LossFunction for CategoricalCrossEntropy {
    fn forward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        targets.check("CategoricalCrossEntropy::forward", predictions)?;
        self.losses.resize(predictions.rows());
        match targets {
            Targets::Sparse(idx) => {
                parallel::dynamic_parallel_for_chunks(
                    1,
                    self.losses.data_mut(),
                    1,
                    |r, l| l[0] = -clamp_probability(predictions.row(r)[idx[r]]).ln(),
                    None,
                    0,
                );
            }
            Targets::Dense(y) => {
                let cols = predictions.cols();
                parallel::dynamic_parallel_for_chunks(
                    cols,
                    self.losses.data_mut(),
                    1,
                    |r, l| {
                        let confidence: TensorFloat = predictions
                            .row(r)
                            .iter()
                            .zip(y.row(r))
                            .map(|(&p, &t)| clamp_probability(p) * t)
                            .sum();
                        l[0] = -clamp_probability(confidence).ln();
                    },
                    None,
                    0,
                );
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&mut self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        targets.check("CategoricalCrossEntropy::backward", predictions)?;
        let samples = predictions.rows() as TensorFloat;
        match targets {
            Targets::Sparse(idx) => {
                let cols = predictions.cols();
                self.dinputs.resize(predictions.rows(), cols);
                parallel::dynamic_parallel_for_chunks(
                    cols,
                    self.dinputs.data_mut(),
                    cols,
                    |r, row| {
                        row.fill(0.0);
                        let c = idx[r];
                        row[c] = -1.0 / clamp_probability(predictions.row(r)[c]) / samples;
                    },
                    None,
                    0,
                );
                Ok(())
            }
            Targets::Dense(y) => transform2(&predictions, y, &mut self.dinputs, |p, t| {
                -t / clamp_probability(p) / samples
            }),
        }
    }

    fn sample_losses(&self) -> &Vector {
        &self.losses
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }

    fn accuracy(&self, predictions: MatrixView<'_>, targets: &Targets<'_>) -> Result<Option<TensorFloat>> {
        class_accuracy(predictions, targets).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::TensorOps;

    fn probs() -> Matrix {
        Matrix::from_vec(2, 3, vec![0.7, 0.2, 0.1, 0.1, 0.5, 0.4]).unwrap()
    }

    #[test]
    fn sparse_and_one_hot_targets_agree() {
        let p = probs();
        let idx = [0usize, 2];
        let one_hot = Matrix::from_vec(2, 3, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();

        let mut a = CategoricalCrossEntropy::default();
        a.forward(p.view(), &Targets::Sparse(&idx)).unwrap();
        a.backward(p.view(), &Targets::Sparse(&idx)).unwrap();
        let mut b = CategoricalCrossEntropy::default();
        b.forward(p.view(), &Targets::from(&one_hot)).unwrap();
        b.backward(p.view(), &Targets::from(&one_hot)).unwrap();

        for (x, y) in a.sample_losses().data().iter().zip(b.sample_losses().data()) {
            assert!((x - y).abs() < 1e-6);
        }
        for (x, y) in a.dinputs().data().iter().zip(b.dinputs().data()) {
            assert!((x - y).abs() < 1e-5);
        }
        assert!((a.sample_losses()[0] + 0.7f32.ln()).abs() < 1e-6);
        assert!((a.dinputs()[(1, 2)] + 1.0 / 0.4 / 2.0).abs() < 1e-5);
        assert_eq!(a.dinputs()[(1, 0)], 0.0);
    }

    #[test]
    fn saturated_predictions_stay_finite() {
        let p = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let wrong = [1usize, 0];
        let mut loss = CategoricalCrossEntropy::default();
        loss.forward(p.view(), &Targets::Sparse(&wrong)).unwrap();
        loss.backward(p.view(), &Targets::Sparse(&wrong)).unwrap();
        assert!(loss.sample_losses().data().iter().all(|v| v.is_finite()));
        assert!(loss.dinputs().data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_out_of_range_classes() {
        let p = probs();
        let mut loss = CategoricalCrossEntropy::default();
        assert!(loss.forward(p.view(), &Targets::Sparse(&[0, 3])).is_err());
    }
}
