//! Forward/backward units.
//!
//! # Layer Contract
//!
//! Every layer implements [`Propagate`]:
//!
//! - `forward(input, training)` computes and stores the layer output for a
//!   `[batch, features]` input. `training` only matters for [`Dropout`].
//! - `backward(input, dvalues)` takes the same input again together with the
//!   gradient of the loss with respect to the layer's output, and stores the
//!   gradient with respect to the input (same shape as `input`).
//!
//! Inputs are borrowed per call rather than retained, so a layer never holds
//! a reference into another layer's buffers. Outputs and input gradients are
//! owned and resized only when the batch shape changes.
//!
//! ## Kinds
//!
//! [`Layer`] is a closed set dispatched by `match`:
//!
//! - [`Dense`]: the only trainable layer; owns weights, biases, their
//!   gradients and the optimizer accumulators.
//! - [`Dropout`]: inverted dropout with a layer-owned generator.
//! - [`ActivationLayer`]: one of the [`Activation`] functions.

mod activation;
mod dense;
mod dropout;

pub use self::activation::{softmax, Activation, ActivationLayer};
pub use self::dense::{Dense, ParamSlot, Regularization, WeightInit};
pub use self::dropout::Dropout;

use crate::error::Result;
use crate::tensors::{Matrix, MatrixView};

/// Forward and backward propagation through one layer.
pub trait Propagate {
    /// Computes the output for `input`.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`](crate::Error::Dimension) if `input` does not have
    /// the feature count the layer was built for.
    fn forward(&mut self, input: MatrixView<'_>, training: bool) -> Result<()>;

    /// Computes the input gradient given the output gradient `dvalues`.
    ///
    /// `input` must be the view passed to the preceding `forward`.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`](crate::Error::Dimension) if `dvalues` does not
    /// match the last output's shape.
    fn backward(&mut self, input: MatrixView<'_>, dvalues: MatrixView<'_>) -> Result<()>;

    /// Output of the last forward pass.
    fn output(&self) -> &Matrix;

    /// Input gradient of the last backward pass.
    fn dinputs(&self) -> &Matrix;
}

/// A layer of a feed-forward network.
#[derive(Debug, Clone)]
pub enum Layer {
    /// A trainable fully connected layer.
    Dense(Dense),
    /// Inverted dropout, active only in training.
    Dropout(Dropout),
    /// A parameter-free nonlinearity.
    Activation(ActivationLayer),
}

impl Layer {
    fn inner(&self) -> &dyn Propagate {
        match self {
            Self::Dense(l) => l,
            Self::Dropout(l) => l,
            Self::Activation(l) => l,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Propagate {
        match self {
            Self::Dense(l) => l,
            Self::Dropout(l) => l,
            Self::Activation(l) => l,
        }
    }

    /// Feature count this layer produces from `inputs` features.
    #[must_use]
    pub fn output_size(&self, inputs: usize) -> usize {
        match self {
            Self::Dense(d) => d.neurons(),
            Self::Dropout(_) | Self::Activation(_) => inputs,
        }
    }

    /// The dense layer, if this is one.
    #[must_use]
    pub fn as_dense(&self) -> Option<&Dense> {
        match self {
            Self::Dense(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable access to the dense layer, if this is one.
    pub fn as_dense_mut(&mut self) -> Option<&mut Dense> {
        match self {
            Self::Dense(d) => Some(d),
            _ => None,
        }
    }

    /// Whether this is a softmax activation.
    #[must_use]
    pub fn is_softmax(&self) -> bool {
        matches!(self, Self::Activation(a) if a.kind() == Activation::Softmax)
    }
}

impl Propagate for Layer {
    fn forward(&mut self, input: MatrixView<'_>, training: bool) -> Result<()> {
        self.inner_mut().forward(input, training)
    }

    fn backward(&mut self, input: MatrixView<'_>, dvalues: MatrixView<'_>) -> Result<()> {
        self.inner_mut().backward(input, dvalues)
    }

    fn output(&self) -> &Matrix {
        self.inner().output()
    }

    fn dinputs(&self) -> &Matrix {
        self.inner().dinputs()
    }
}

impl From<Dense> for Layer {
    fn from(layer: Dense) -> Self {
        Self::Dense(layer)
    }
}

impl From<Dropout> for Layer {
    fn from(layer: Dropout) -> Self {
        Self::Dropout(layer)
    }
}

impl From<Activation> for Layer {
    fn from(kind: Activation) -> Self {
        Self::Activation(ActivationLayer::new(kind))
    }
}
