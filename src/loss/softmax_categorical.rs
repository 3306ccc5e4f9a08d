use super::{class_accuracy, clamp_probability, LossFunction};
use crate::data::Targets;
use crate::error::Result;
use crate::layers::softmax;
use crate::parallel;
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector};

/// Softmax followed by categorical cross-entropy, taking logits.
///
/// Dense targets are reduced to class indices by row argmax, so they must
/// be hard (one-hot) labels. A soft label row is scored as its largest entry.
///
/// `backward` recomputes the softmax of the logits it is given rather than
/// reusing the probabilities of the last `forward`, so the gradient always
/// matches its arguments.
#[derive(Debug, Clone, Default)]
pub struct SoftmaxCategoricalCrossEntropy {
    probabilities: Matrix,
    indices: Vec<usize>,
    losses: Vector,
    dinputs: Matrix,
}

impl SoftmaxCategoricalCrossEntropy {
    /// Softmax of the logits from the last forward or backward pass.
    #[must_use]
    pub fn probabilities(&self) -> &Matrix {
        &self.probabilities
    }
}

fn class_indices<'a>(targets: &Targets<'a>, scratch: &'a mut Vec<usize>) -> &'a [usize] {
    match *targets {
        Targets::Sparse(idx) => idx,
        Targets::Dense(y) => {
            *scratch = y.argmax_rows();
            scratch
        }
    }
}

impl LossFunction for SoftmaxCategoricalCrossEntropy {
    fn forward(&mut self, logits: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        targets.check("SoftmaxCategoricalCrossEntropy::forward", logits)?;
        softmax(logits, &mut self.probabilities);

        let probs = &self.probabilities;
        let idx = class_indices(targets, &mut self.indices);
        self.losses.resize(logits.rows());
        parallel::dynamic_parallel_for_chunks(
            1,
            self.losses.data_mut(),
            1,
            |r, l| l[0] = -clamp_probability(probs.row(r)[idx[r]]).ln(),
            None,
            0,
        );
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&mut self, logits: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        targets.check("SoftmaxCategoricalCrossEntropy::backward", logits)?;
        softmax(logits, &mut self.probabilities);
        let samples = logits.rows() as TensorFloat;
        let cols = logits.cols();
        let probs = &self.probabilities;
        let idx = class_indices(targets, &mut self.indices);
        self.dinputs.resize(logits.rows(), cols);
        parallel::dynamic_parallel_for_chunks(
            cols,
            self.dinputs.data_mut(),
            cols,
            |r, row| {
                for (d, &p) in row.iter_mut().zip(probs.row(r)) {
                    *d = p / samples;
                }
                row[idx[r]] -= 1.0 / samples;
            },
            None,
            0,
        );
        Ok(())
    }

    fn sample_losses(&self) -> &Vector {
        &self.losses
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }

    fn accuracy(&self, logits: MatrixView<'_>, targets: &Targets<'_>) -> Result<Option<TensorFloat>> {
        class_accuracy(logits, targets).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_probabilities_minus_one_hot() {
        let logits = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let idx = [2usize, 0];
        let mut loss = SoftmaxCategoricalCrossEntropy::default();
        loss.forward(logits.view(), &Targets::Sparse(&idx)).unwrap();
        loss.backward(logits.view(), &Targets::Sparse(&idx)).unwrap();
        let p = loss.probabilities().clone();
        assert!((loss.dinputs()[(0, 2)] - (p[(0, 2)] - 1.0) / 2.0).abs() < 1e-7);
        assert!((loss.dinputs()[(1, 1)] - p[(1, 1)] / 2.0).abs() < 1e-7);
        assert!((loss.sample_losses()[1] - 3.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn one_hot_targets_reduce_to_indices() {
        let logits = Matrix::from_vec(2, 2, vec![0.5, -0.5, 2.0, 1.0]).unwrap();
        let idx = [1usize, 0];
        let one_hot = Matrix::from_vec(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let mut a = SoftmaxCategoricalCrossEntropy::default();
        let mut b = SoftmaxCategoricalCrossEntropy::default();
        a.forward(logits.view(), &Targets::Sparse(&idx)).unwrap();
        b.forward(logits.view(), &Targets::from(&one_hot)).unwrap();
        a.backward(logits.view(), &Targets::Sparse(&idx)).unwrap();
        b.backward(logits.view(), &Targets::from(&one_hot)).unwrap();
        assert_eq!(a.sample_losses(), b.sample_losses());
        assert_eq!(a.dinputs(), b.dinputs());
    }

    #[test]
    fn backward_follows_its_own_logits() {
        let seen = Matrix::from_vec(2, 3, vec![4.0, -1.0, 0.5, 0.0, 2.0, -3.0]).unwrap();
        let given = Matrix::from_vec(2, 3, vec![0.1, 0.2, 0.3, -1.0, 1.0, 0.0]).unwrap();
        let idx = [0usize, 1];

        let mut stale = SoftmaxCategoricalCrossEntropy::default();
        stale.forward(seen.view(), &Targets::Sparse(&idx)).unwrap();
        stale.backward(given.view(), &Targets::Sparse(&idx)).unwrap();

        let mut fresh = SoftmaxCategoricalCrossEntropy::default();
        fresh.forward(given.view(), &Targets::Sparse(&idx)).unwrap();
        fresh.backward(given.view(), &Targets::Sparse(&idx)).unwrap();

        assert_eq!(stale.dinputs(), fresh.dinputs());
    }

    #[test]
    fn backward_without_forward_is_allowed() {
        let logits = Matrix::zeros(2, 2);
        let mut loss = SoftmaxCategoricalCrossEntropy::default();
        loss.backward(logits.view(), &Targets::Sparse(&[0, 1])).unwrap();
        assert_eq!(loss.dinputs().data(), &[-0.25, 0.25, 0.25, -0.25]);
    }

    #[test]
    fn backward_checks_target_rows() {
        let logits = Matrix::zeros(2, 2);
        let mut loss = SoftmaxCategoricalCrossEntropy::default();
        assert!(matches!(
            loss.backward(logits.view(), &Targets::Sparse(&[0])),
            Err(crate::error::Error::Dimension { .. })
        ));
    }
}
