use super::Propagate;
use crate::error::{Error, Result};
use crate::rng::Generator;
use crate::tensors::dot::{dot_mm, dot_nt, dot_tn};
use crate::tensors::transform::apply2;
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOps, TensorOpsMut, Vector};
use std::io::{Read, Write};

/// How a dense layer's weights are drawn. Biases always start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WeightInit {
    /// Normal samples scaled by a small constant (`0.01`).
    #[default]
    Random,
    /// Normal samples scaled by `sqrt(2 / fan_in)`.
    He,
    /// Normal samples scaled by `sqrt(1 / fan_in)`.
    Xavier,
}

impl WeightInit {
    /// Scale applied to standard-normal samples for a layer with `fan_in` inputs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale(self, fan_in: usize) -> TensorFloat {
        match self {
            Self::Random => 0.01,
            Self::He => (2.0 / fan_in as TensorFloat).sqrt(),
            Self::Xavier => (1.0 / fan_in as TensorFloat).sqrt(),
        }
    }
}

/// L1/L2 penalty coefficients for a dense layer. All zero by default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regularization {
    /// Coefficient of `sum |w|`.
    pub weight_l1: TensorFloat,
    /// Coefficient of `sum w^2`.
    pub weight_l2: TensorFloat,
    /// Coefficient of `sum |b|`.
    pub bias_l1: TensorFloat,
    /// Coefficient of `sum b^2`.
    pub bias_l2: TensorFloat,
}

impl Regularization {
    /// Whether every coefficient is zero.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.weight_l1 == 0.0 && self.weight_l2 == 0.0 && self.bias_l1 == 0.0 && self.bias_l2 == 0.0
    }

    fn validate(&self) -> Result<()> {
        let all = [self.weight_l1, self.weight_l2, self.bias_l1, self.bias_l2];
        if all.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::config(format!(
                "regularization coefficients must be finite and non-negative, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// One trainable tensor as seen by an optimizer: the parameters, their
/// gradient, and the two accumulators that live next to them.
pub struct ParamSlot<'a> {
    /// Parameters updated in place.
    pub param: &'a mut [TensorFloat],
    /// Gradient of the loss with respect to `param`.
    pub grad: &'a [TensorFloat],
    /// First-moment accumulator (SGD momentum, Adam `m`).
    pub momentum: &'a mut [TensorFloat],
    /// Squared-gradient accumulator (Adagrad, RMSProp, Adam `v`).
    pub cache: &'a mut [TensorFloat],
}

/// A fully connected layer, `output = input · Wᵗ + b`.
///
/// Weights are stored `[neurons, inputs]`, so row `n` holds the incoming
/// weights of neuron `n` and the weight gradient has the same layout.
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Matrix,
    biases: Vector,
    dweights: Matrix,
    dbiases: Vector,
    weight_momentum: Matrix,
    weight_cache: Matrix,
    bias_momentum: Vector,
    bias_cache: Vector,
    regularization: Regularization,
    output: Matrix,
    dinputs: Matrix,
}

impl Dense {
    /// Creates an `inputs -> neurons` layer with weights drawn from `rng`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if either size is zero or a regularization
    /// coefficient is negative or non-finite.
    pub fn new(
        inputs: usize,
        neurons: usize,
        init: WeightInit,
        regularization: Regularization,
        rng: &mut Generator,
    ) -> Result<Self> {
        if inputs == 0 || neurons == 0 {
            return Err(Error::config(format!(
                "dense layer needs at least one input and one neuron, got {inputs} -> {neurons}"
            )));
        }
        let scale = init.scale(inputs);
        let weights = Matrix::generate(neurons, inputs, || rng.normal(scale));
        Self::from_parameters(weights, Vector::zeros(neurons), regularization)
    }

    /// Creates a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`] if `biases.len() != weights.rows()`,
    /// [`Error::Configuration`] for an empty weight matrix or invalid
    /// regularization.
    pub fn from_parameters(weights: Matrix, biases: Vector, regularization: Regularization) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::config("dense layer needs a non-empty weight matrix"));
        }
        if biases.len() != weights.rows() {
            return Err(Error::dimension("Dense::from_parameters", &[weights.rows()], biases.shape()));
        }
        regularization.validate()?;
        let (n, i) = (weights.rows(), weights.cols());
        Ok(Self {
            weights,
            biases,
            dweights: Matrix::zeros(n, i),
            dbiases: Vector::zeros(n),
            weight_momentum: Matrix::zeros(n, i),
            weight_cache: Matrix::zeros(n, i),
            bias_momentum: Vector::zeros(n),
            bias_cache: Vector::zeros(n),
            regularization,
            output: Matrix::default(),
            dinputs: Matrix::default(),
        })
    }

    /// Input feature count.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.weights.cols()
    }

    /// Output feature count.
    #[must_use]
    pub fn neurons(&self) -> usize {
        self.weights.rows()
    }

    /// Weight matrix, `neurons x inputs`.
    #[must_use]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    /// Bias vector, one entry per neuron.
    #[must_use]
    pub fn biases(&self) -> &Vector {
        &self.biases
    }

    /// Weight gradient from the last backward pass.
    #[must_use]
    pub fn dweights(&self) -> &Matrix {
        &self.dweights
    }

    /// Bias gradient from the last backward pass.
    #[must_use]
    pub fn dbiases(&self) -> &Vector {
        &self.dbiases
    }

    /// Penalty coefficients applied to this layer.
    #[must_use]
    pub fn regularization(&self) -> Regularization {
        self.regularization
    }

    /// Penalty this layer adds to the data loss.
    #[must_use]
    pub fn regularization_loss(&self) -> TensorFloat {
        let r = self.regularization;
        let mut loss = 0.0;
        if r.weight_l1 > 0.0 {
            loss += r.weight_l1 * self.weights.data().iter().map(|w| w.abs()).sum::<TensorFloat>();
        }
        if r.weight_l2 > 0.0 {
            loss += r.weight_l2 * self.weights.data().iter().map(|w| w * w).sum::<TensorFloat>();
        }
        if r.bias_l1 > 0.0 {
            loss += r.bias_l1 * self.biases.data().iter().map(|b| b.abs()).sum::<TensorFloat>();
        }
        if r.bias_l2 > 0.0 {
            loss += r.bias_l2 * self.biases.data().iter().map(|b| b * b).sum::<TensorFloat>();
        }
        loss
    }

    /// Weights and biases with their gradients and accumulators, in that order.
    pub fn param_slots(&mut self) -> [ParamSlot<'_>; 2] {
        [
            ParamSlot {
                param: self.weights.data_mut(),
                grad: self.dweights.data(),
                momentum: self.weight_momentum.data_mut(),
                cache: self.weight_cache.data_mut(),
            },
            ParamSlot {
                param: self.biases.data_mut(),
                grad: self.dbiases.data(),
                momentum: self.bias_momentum.data_mut(),
                cache: self.bias_cache.data_mut(),
            },
        ]
    }

    /// Writes weights then biases as row-major little-endian `f32`.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the writer fails.
    pub fn save<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        for tensor in [self.weights.data(), self.biases.data()] {
            let bytes: Vec<u8> = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    /// Reads weights then biases in the layout written by [`Dense::save`].
    ///
    /// The layer's shape is not stored in the stream; it must already match.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the stream fails or ends early. The layer may be
    /// partially overwritten in that case.
    pub fn load<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        for tensor in [self.weights.data_mut(), self.biases.data_mut()] {
            let mut bytes = vec![0u8; tensor.len() * 4];
            reader.read_exact(&mut bytes)?;
            for (v, chunk) in tensor.iter_mut().zip(bytes.chunks_exact(4)) {
                *v = TensorFloat::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        Ok(())
    }
}

/// `sign` with zero mapped to `+1`, the subgradient used for L1.
fn l1_sign(x: TensorFloat) -> TensorFloat {
    if x < 0.0 { -1.0 } else { 1.0 }
}

fn add_penalty<T: TensorOpsMut, P: TensorOps>(grad: &mut T, param: &P, l1: TensorFloat, l2: TensorFloat) -> Result<()> {
    if l1 == 0.0 && l2 == 0.0 {
        return Ok(());
    }
    apply2(grad, param, |g, p| g + l1 * l1_sign(p) + 2.0 * l2 * p)
}

impl Propagate for Dense {
    fn forward(&mut self, input: MatrixView<'_>, _training: bool) -> Result<()> {
        if input.cols() != self.inputs() {
            return Err(Error::dimension(
                "Dense::forward",
                &[input.rows(), self.inputs()],
                input.shape(),
            ));
        }
        dot_nt(input, self.weights.view(), &mut self.output)?;
        self.output.add_row_vector(self.biases.view())
    }

    fn backward(&mut self, input: MatrixView<'_>, dvalues: MatrixView<'_>) -> Result<()> {
        if dvalues.shape() != [input.rows(), self.neurons()] {
            return Err(Error::dimension(
                "Dense::backward",
                &[input.rows(), self.neurons()],
                dvalues.shape(),
            ));
        }
        dot_tn(dvalues, input, &mut self.dweights)?;
        dvalues.sum_columns_into(&mut self.dbiases);

        let r = self.regularization;
        add_penalty(&mut self.dweights, &self.weights, r.weight_l1, r.weight_l2)?;
        add_penalty(&mut self.dbiases, &self.biases, r.bias_l1, r.bias_l2)?;

        dot_mm(dvalues, self.weights.view(), &mut self.dinputs)
    }

    fn output(&self) -> &Matrix {
        &self.output
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }
}
