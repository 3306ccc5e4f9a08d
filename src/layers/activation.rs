use super::Propagate;
use crate::error::{Error, Result};
use crate::parallel;
use crate::tensors::transform::{transform, transform3};
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut};

/// Element-wise and row-wise nonlinearities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    /// Hard threshold at zero. Its gradient is zero everywhere.
    Step,
    /// `max(0, x)`.
    #[default]
    Relu,
    /// Negative inputs are scaled by `alpha` instead of clamped.
    LeakyRelu {
        /// Slope on the negative side.
        alpha: TensorFloat,
    },
    /// Logistic function `1 / (1 + e^-x)`.
    Sigmoid,
    /// Row-wise, max-shifted softmax.
    Softmax,
}

impl Activation {
    /// `dy/dx` at input `x` with output `y`, for the element-wise kinds.
    /// Softmax couples a whole row and is differentiated separately.
    fn derivative(self, x: TensorFloat, y: TensorFloat) -> TensorFloat {
        match self {
            Self::Step | Self::Softmax => 0.0,
            Self::Relu => {
                if x > 0.0 { 1.0 } else { 0.0 }
            }
            Self::LeakyRelu { alpha } => {
                if x > 0.0 { 1.0 } else { alpha }
            }
            Self::Sigmoid => y * (1.0 - y),
        }
    }
}

/// An activation applied as a layer.
///
/// Element-wise backward passes see the incoming gradient, the original
/// input and the stored output of each element together. Gating on the
/// input keeps ReLU and leaky ReLU correct for any slope sign.
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    kind: Activation,
    output: Matrix,
    dinputs: Matrix,
}

impl ActivationLayer {
    /// A layer applying `kind`, with empty buffers.
    #[must_use]
    pub fn new(kind: Activation) -> Self {
        Self {
            kind,
            output: Matrix::default(),
            dinputs: Matrix::default(),
        }
    }

    /// The nonlinearity this layer applies.
    #[must_use]
    pub fn kind(&self) -> Activation {
        self.kind
    }
}

impl From<Activation> for ActivationLayer {
    fn from(kind: Activation) -> Self {
        Self::new(kind)
    }
}

/// Row-wise softmax of `input` into `out`.
///
/// Each row is shifted by its maximum before exponentiation, so any finite
/// input yields finite probabilities that sum to one.
pub fn softmax(input: MatrixView<'_>, out: &mut Matrix) {
    let cols = input.cols();
    out.resize(input.rows(), cols);
    parallel::dynamic_parallel_for_chunks(
        cols * 4,
        out.data_mut(),
        cols,
        |r, row| {
            let x = input.row(r);
            let max = x.iter().copied().fold(TensorFloat::NEG_INFINITY, TensorFloat::max);
            let mut sum = 0.0;
            for (o, &v) in row.iter_mut().zip(x) {
                *o = (v - max).exp();
                sum += *o;
            }
            for o in row.iter_mut() {
                *o /= sum;
            }
        },
        None,
        0,
    );
}

/// `dinputs[j] = out[j] * Σ_k dvalues[k] * (δ_jk - out[k])` per row.
fn softmax_backward(output: &Matrix, dvalues: MatrixView<'_>, dinputs: &mut Matrix) {
    let cols = output.cols();
    dinputs.resize(output.rows(), cols);
    parallel::dynamic_parallel_for_chunks(
        cols * cols,
        dinputs.data_mut(),
        cols,
        |r, row| {
            let out = output.row(r);
            let dv = dvalues.row(r);
            for (j, d) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, (&g, &o)) in dv.iter().zip(out).enumerate() {
                    let delta = if j == k { 1.0 } else { 0.0 };
                    acc += g * (delta - o);
                }
                *d = out[j] * acc;
            }
        },
        None,
        0,
    );
}

impl Propagate for ActivationLayer {
    fn forward(&mut self, input: MatrixView<'_>, _training: bool) -> Result<()> {
        let out = &mut self.output;
        match self.kind {
            Activation::Step => transform(&input, out, |x| if x > 0.0 { 1.0 } else { 0.0 }),
            Activation::Relu => transform(&input, out, |x| x.max(0.0)),
            Activation::LeakyRelu { alpha } => {
                transform(&input, out, |x| if x > 0.0 { x } else { alpha * x })
            }
            Activation::Sigmoid => transform(&input, out, |x| 1.0 / (1.0 + (-x).exp())),
            Activation::Softmax => {
                softmax(input, out);
                Ok(())
            }
        }
    }

    fn backward(&mut self, input: MatrixView<'_>, dvalues: MatrixView<'_>) -> Result<()> {
        if dvalues.shape() != input.shape() || self.output.shape() != input.shape() {
            return Err(Error::dimension("ActivationLayer::backward", self.output.shape(), dvalues.shape()));
        }
        let (out, din) = (&self.output, &mut self.dinputs);
        match self.kind {
            Activation::Softmax => {
                softmax_backward(out, dvalues, din);
                Ok(())
            }
            kind => transform3(&dvalues, &input, out, din, |g, x, y| g * kind.derivative(x, y)),
        }
    }

    fn output(&self) -> &Matrix {
        &self.output
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: Activation, x: &[TensorFloat], dv: &[TensorFloat]) -> (Vec<TensorFloat>, Vec<TensorFloat>) {
        let x = Matrix::from_vec(1, x.len(), x.to_vec()).unwrap();
        let dv = Matrix::from_vec(1, dv.len(), dv.to_vec()).unwrap();
        let mut layer = ActivationLayer::new(kind);
        layer.forward(x.view(), true).unwrap();
        layer.backward(x.view(), dv.view()).unwrap();
        (layer.output().data().to_vec(), layer.dinputs().data().to_vec())
    }

    #[test]
    fn step_has_zero_gradient() {
        let (out, grad) = run(Activation::Step, &[-1.0, 0.0, 2.0], &[5.0, 5.0, 5.0]);
        assert_eq!(out, vec![0.0, 0.0, 1.0]);
        assert_eq!(grad, vec![0.0; 3]);
    }

    #[test]
    fn relu_gates_on_input() {
        let (out, grad) = run(Activation::Relu, &[-1.0, 0.0, 2.0], &[3.0, 3.0, 3.0]);
        assert_eq!(out, vec![0.0, 0.0, 2.0]);
        assert_eq!(grad, vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn leaky_relu_scales_negative_side() {
        let (out, grad) = run(Activation::LeakyRelu { alpha: 0.1 }, &[-2.0, 4.0], &[1.0, 1.0]);
        assert!((out[0] + 0.2).abs() < 1e-7);
        assert_eq!(out[1], 4.0);
        assert!((grad[0] - 0.1).abs() < 1e-7);
        assert_eq!(grad[1], 1.0);
    }

    #[test]
    fn leaky_relu_with_negative_slope_gates_on_input_sign() {
        let (out, grad) = run(Activation::LeakyRelu { alpha: -0.5 }, &[-2.0, 3.0], &[1.0, 1.0]);
        assert_eq!(out, vec![1.0, 3.0]);
        assert_eq!(grad, vec![-0.5, 1.0]);
    }

    #[test]
    fn sigmoid_derivative() {
        let (out, grad) = run(Activation::Sigmoid, &[0.0], &[2.0]);
        assert_eq!(out, vec![0.5]);
        assert_eq!(grad, vec![0.5]);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let (a, _) = run(Activation::Softmax, &[1.0, 2.0, 3.0], &[0.0; 3]);
        let (b, _) = run(Activation::Softmax, &[1001.0, 1002.0, 1003.0], &[0.0; 3]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_gradient_sums_to_zero_per_row() {
        let (_, grad) = run(Activation::Softmax, &[0.3, -1.2, 2.0, 0.0], &[1.0, -2.0, 0.5, 4.0]);
        assert!(grad.iter().sum::<TensorFloat>().abs() < 1e-6);
    }

    #[test]
    fn backward_rejects_mismatched_gradient() {
        let x = Matrix::zeros(2, 3);
        let mut layer = ActivationLayer::new(Activation::Relu);
        layer.forward(x.view(), true).unwrap();
        let dv = Matrix::zeros(3, 2);
        assert!(layer.backward(x.view(), dv.view()).is_err());
    }
}
