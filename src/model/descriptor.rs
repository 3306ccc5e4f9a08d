use crate::error::{Error, Result};
use crate::layers::{Activation, Regularization, WeightInit};
use crate::loss::LossKind;
use crate::optim::OptimizerKind;
use crate::tensors::TensorFloat;

/// One entry of a [`ModelDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerDescriptor {
    /// A fully connected layer.
    Dense {
        /// Output feature count.
        neurons: usize,
        /// Weight initialization scheme.
        init: WeightInit,
        /// Penalty coefficients on the layer's parameters.
        regularization: Regularization,
    },
    /// Inverted dropout.
    Dropout {
        /// Probability of zeroing an element, in `[0, 1)`.
        rate: TensorFloat,
    },
    /// A parameter-free nonlinearity.
    Activation(Activation),
}

impl LayerDescriptor {
    /// A dense layer with default initialization and no regularization.
    #[must_use]
    pub fn dense(neurons: usize) -> Self {
        Self::Dense {
            neurons,
            init: WeightInit::default(),
            regularization: Regularization::default(),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        match *self {
            Self::Dense { neurons: 0, .. } => Err(Error::config(format!("layer {index}: dense layer has zero neurons"))),
            Self::Dropout { rate } if !(0.0..1.0).contains(&rate) => Err(Error::config(format!(
                "layer {index}: dropout rate must be in [0, 1), got {rate}"
            ))),
            Self::Activation(Activation::LeakyRelu { alpha }) if !alpha.is_finite() => Err(Error::config(format!(
                "layer {index}: leaky ReLU slope must be finite, got {alpha}"
            ))),
            _ => Ok(()),
        }
    }
}

impl From<Activation> for LayerDescriptor {
    fn from(kind: Activation) -> Self {
        Self::Activation(kind)
    }
}

/// The shape of a network: input width and the ordered layer list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelDescriptor {
    /// Feature count of every input row.
    pub inputs: usize,
    /// Layers in forward order.
    pub layers: Vec<LayerDescriptor>,
}

impl ModelDescriptor {
    /// A description with `inputs` features and no layers yet.
    #[must_use]
    pub fn new(inputs: usize) -> Self {
        Self {
            inputs,
            layers: Vec::new(),
        }
    }

    /// Appends a layer.
    #[must_use]
    pub fn layer(mut self, layer: impl Into<LayerDescriptor>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Appends a dense layer with the given initialization.
    #[must_use]
    pub fn dense(self, neurons: usize, init: WeightInit) -> Self {
        self.layer(LayerDescriptor::Dense {
            neurons,
            init,
            regularization: Regularization::default(),
        })
    }

    /// Checks that the description can be built.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for zero inputs, an empty layer list, a dense
    /// layer without neurons or an out-of-range dropout rate.
    pub fn validate(&self) -> Result<()> {
        if self.inputs == 0 {
            return Err(Error::config("model declares zero inputs"));
        }
        if self.layers.is_empty() {
            return Err(Error::config("model has no layers"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate(i)?;
        }
        Ok(())
    }
}

/// How a model is trained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingDescriptor {
    /// Loss the model is trained against.
    pub loss: LossKind,
    /// Update rule and its hyperparameters.
    pub optimizer: OptimizerKind,
    /// Samples per optimizer step; the last batch of an epoch may be short.
    pub batch_size: usize,
    /// Passes over the training rows made by [`FeedForward::train`](super::FeedForward::train).
    pub epochs: usize,
    /// Trailing fraction of the data held out for validation, in `[0, 1)`.
    pub validation_split: f32,
    /// Reshuffle the training rows at the start of every epoch.
    pub shuffle: bool,
    /// Log epoch summaries at `info` and batches at `debug`.
    pub verbose: bool,
}

impl Default for TrainingDescriptor {
    fn default() -> Self {
        Self {
            loss: LossKind::default(),
            optimizer: OptimizerKind::default(),
            batch_size: 32,
            epochs: 1,
            validation_split: 0.0,
            shuffle: true,
            verbose: false,
        }
    }
}

impl TrainingDescriptor {
    /// Sets [`TrainingDescriptor::loss`].
    #[must_use]
    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    /// Sets [`TrainingDescriptor::optimizer`].
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets [`TrainingDescriptor::batch_size`].
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets [`TrainingDescriptor::epochs`].
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets [`TrainingDescriptor::validation_split`].
    #[must_use]
    pub fn with_validation_split(mut self, fraction: f32) -> Self {
        self.validation_split = fraction;
        self
    }

    /// Sets [`TrainingDescriptor::shuffle`].
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Sets [`TrainingDescriptor::verbose`].
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Checks batch size, epoch count, split and optimizer hyperparameters.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        if self.epochs == 0 {
            return Err(Error::config("epoch count must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::config(format!(
                "validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        self.optimizer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_models_are_rejected() {
        assert!(matches!(
            ModelDescriptor::new(4).validate(),
            Err(Error::Configuration(_))
        ));
        let zero_inputs = ModelDescriptor::new(0).layer(LayerDescriptor::dense(2));
        assert!(zero_inputs.validate().is_err());
    }

    #[test]
    fn layer_fields_are_checked() {
        let m = ModelDescriptor::new(2).layer(LayerDescriptor::dense(0));
        assert!(m.validate().is_err());
        let m = ModelDescriptor::new(2)
            .layer(LayerDescriptor::dense(3))
            .layer(LayerDescriptor::Dropout { rate: 1.0 });
        assert!(m.validate().is_err());
        let m = ModelDescriptor::new(2)
            .dense(3, WeightInit::He)
            .layer(Activation::Relu)
            .layer(LayerDescriptor::Dropout { rate: 0.2 })
            .dense(2, WeightInit::Xavier)
            .layer(Activation::Softmax);
        assert!(m.validate().is_ok());
        assert_eq!(m.layers.len(), 5);
    }

    #[test]
    fn training_defaults_are_valid() {
        let t = TrainingDescriptor::default();
        assert!(t.validate().is_ok());
        assert!(t.with_batch_size(0).validate().is_err());
        assert!(t.with_epochs(0).validate().is_err());
        assert!(t.with_validation_split(1.0).validate().is_err());
        assert!(t
            .with_optimizer(OptimizerKind::sgd().with_learning_rate(-1.0))
            .validate()
            .is_err());
    }
}
