//! The feed-forward network.
//!
//! # Lifecycle
//!
//! 1. [`FeedForward::configure`] builds the layer list from a
//!    [`ModelDescriptor`], threading the feature count forward: dense layers
//!    consume it and set a new one, every other layer passes it through.
//! 2. [`FeedForward::configure_training`] selects loss, optimizer and the
//!    batching parameters from a [`TrainingDescriptor`].
//! 3. [`FeedForward::train`] runs the epoch/batch loop; [`FeedForward::predict`]
//!    and [`FeedForward::evaluate`] run inference.
//!
//! ## Fused softmax
//!
//! With [`LossKind::SoftmaxCategorical`] the last layer must be a softmax.
//! Training and evaluation stop the forward chain before it and feed the
//! logits to the fused loss, whose gradient enters the backward chain at the
//! layer below. [`FeedForward::predict`] still applies the softmax.
//!
//! ## Example
//!
//! ```rust
//! use briny_mlp::data::Targets;
//! use briny_mlp::layers::{Activation, WeightInit};
//! use briny_mlp::loss::LossKind;
//! use briny_mlp::model::{FeedForward, ModelDescriptor, TrainingDescriptor};
//! use briny_mlp::optim::OptimizerKind;
//! use briny_mlp::rng::Generator;
//! use briny_mlp::tensors::{Matrix, TensorOps};
//!
//! let desc = ModelDescriptor::new(2)
//!     .dense(8, WeightInit::He)
//!     .layer(Activation::Relu)
//!     .dense(2, WeightInit::Xavier)
//!     .layer(Activation::Softmax);
//! let mut model = FeedForward::from_descriptor(&desc, Generator::seeded(1)).unwrap();
//! model
//!     .configure_training(
//!         &TrainingDescriptor::default()
//!             .with_loss(LossKind::SoftmaxCategorical)
//!             .with_optimizer(OptimizerKind::adam().with_learning_rate(0.05))
//!             .with_batch_size(4)
//!             .with_epochs(20),
//!     )
//!     .unwrap();
//!
//! let x = Matrix::from_vec(4, 2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]).unwrap();
//! let y = [0usize, 1, 1, 0];
//! let report = model.train(x.view(), Targets::Sparse(&y)).unwrap();
//! assert_eq!(report.epochs().len(), 20);
//! assert_eq!(model.predict(x.view()).unwrap().shape(), &[4, 2]);
//! ```

mod descriptor;
mod train;

pub use self::descriptor::{LayerDescriptor, ModelDescriptor, TrainingDescriptor};
pub use self::train::{BatchStats, EpochStats, Evaluation, TrainReport};

use crate::data::Targets;
use crate::error::{Error, Result};
use crate::layers::{Dense, Dropout, Layer, Propagate};
use crate::loss::{Loss, LossFunction, LossKind};
use crate::optim::{Optimize, Optimizer};
use crate::rng::Generator;
use crate::tensors::{MatrixView, TensorFloat, TensorOps};
use log::debug;

/// Loss, optimizer and batching parameters of a configured model.
#[derive(Debug, Clone)]
struct Training {
    descriptor: TrainingDescriptor,
    loss: Loss,
    optimizer: Optimizer,
}

impl Training {
    fn new(descriptor: &TrainingDescriptor) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self {
            descriptor: *descriptor,
            loss: Loss::new(descriptor.loss),
            optimizer: Optimizer::new(descriptor.optimizer)?,
        })
    }
}

/// A sequential stack of layers trained end to end.
#[derive(Debug, Clone)]
pub struct FeedForward {
    inputs: usize,
    outputs: usize,
    layers: Vec<Layer>,
    training: Option<Training>,
    generator: Generator,
}

/// Input to layer `i`: the batch itself for the first layer, else the
/// previous layer's output.
fn input_of<'a>(layers: &'a [Layer], x: MatrixView<'a>, i: usize) -> MatrixView<'a> {
    match i {
        0 => x,
        _ => layers[i - 1].output().view(),
    }
}

/// Runs `layers[..end]` forward.
fn forward_chain(layers: &mut [Layer], x: MatrixView<'_>, end: usize, training: bool) -> Result<()> {
    for i in 0..end {
        let (prev, rest) = layers.split_at_mut(i);
        let input = input_of(prev, x, i);
        rest[0].forward(input, training)?;
    }
    Ok(())
}

/// Runs `layers[..end]` backward, starting from the gradient `top`
/// with respect to the output of `layers[end - 1]`.
fn backward_chain(layers: &mut [Layer], x: MatrixView<'_>, end: usize, top: MatrixView<'_>) -> Result<()> {
    for i in (0..end).rev() {
        let (prev, rest) = layers.split_at_mut(i);
        let (current, next) = rest
            .split_first_mut()
            .ok_or_else(|| Error::config("backward pass past the last layer"))?;
        let input = input_of(prev, x, i);
        let dvalues = if i + 1 == end { top } else { next[0].dinputs().view() };
        current.backward(input, dvalues)?;
    }
    Ok(())
}

impl FeedForward {
    /// An unconfigured model drawing its randomness from `generator`.
    #[must_use]
    pub fn new(generator: Generator) -> Self {
        Self {
            inputs: 0,
            outputs: 0,
            layers: Vec::new(),
            training: None,
            generator,
        }
    }

    /// Builds and configures a model in one step.
    ///
    /// # Errors
    ///
    /// As [`FeedForward::configure`].
    pub fn from_descriptor(descriptor: &ModelDescriptor, generator: Generator) -> Result<Self> {
        let mut model = Self::new(generator);
        model.configure(descriptor)?;
        Ok(model)
    }

    /// Replaces the layer stack with the one `descriptor` describes.
    ///
    /// Weights are drawn from the model's generator and every dropout layer
    /// receives its own fork of it. A previous training configuration is
    /// kept, with fresh loss and optimizer state.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the descriptor is invalid. The model is
    /// left unchanged in that case.
    pub fn configure(&mut self, descriptor: &ModelDescriptor) -> Result<()> {
        descriptor.validate()?;
        let mut width = descriptor.inputs;
        let mut layers = Vec::with_capacity(descriptor.layers.len());
        for layer in &descriptor.layers {
            let built: Layer = match *layer {
                LayerDescriptor::Dense {
                    neurons,
                    init,
                    regularization,
                } => Dense::new(width, neurons, init, regularization, &mut self.generator)?.into(),
                LayerDescriptor::Dropout { rate } => Dropout::new(rate, self.generator.fork())?.into(),
                LayerDescriptor::Activation(kind) => kind.into(),
            };
            width = built.output_size(width);
            layers.push(built);
        }

        let training = match &self.training {
            Some(t) => {
                check_fused_tail(t.descriptor.loss, &layers)?;
                Some(Training::new(&t.descriptor)?)
            }
            None => None,
        };

        debug!(
            "configured model: {} inputs, {} layers, {} outputs",
            descriptor.inputs,
            layers.len(),
            width
        );
        self.inputs = descriptor.inputs;
        self.outputs = width;
        self.layers = layers;
        self.training = training;
        Ok(())
    }

    /// Selects loss, optimizer and batching parameters.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the descriptor is invalid, or if it asks
    /// for the fused softmax loss on a model whose last layer is not a
    /// softmax.
    pub fn configure_training(&mut self, descriptor: &TrainingDescriptor) -> Result<()> {
        let training = Training::new(descriptor)?;
        if !self.layers.is_empty() {
            check_fused_tail(descriptor.loss, &self.layers)?;
        }
        debug!(
            "configured training: {:?} loss, {:?}, batch {} x {} epochs",
            descriptor.loss, descriptor.optimizer, descriptor.batch_size, descriptor.epochs
        );
        self.training = Some(training);
        Ok(())
    }

    /// Input feature count (`0` before [`FeedForward::configure`]).
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Output feature count (`0` before [`FeedForward::configure`]).
    #[must_use]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// The layer stack in forward order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Dense layers in network order.
    pub fn dense_layers(&self) -> impl Iterator<Item = &Dense> {
        self.layers.iter().filter_map(Layer::as_dense)
    }

    /// Dense layers in network order, mutably.
    pub fn dense_layers_mut(&mut self) -> impl Iterator<Item = &mut Dense> {
        self.layers.iter_mut().filter_map(Layer::as_dense_mut)
    }

    /// The active training configuration, if any.
    #[must_use]
    pub fn training_descriptor(&self) -> Option<&TrainingDescriptor> {
        self.training.as_ref().map(|t| &t.descriptor)
    }

    /// Learning rate of the most recent optimizer step.
    #[must_use]
    pub fn learning_rate(&self) -> Option<TensorFloat> {
        self.training.as_ref().map(|t| t.optimizer.current_learning_rate())
    }

    /// Sum of every dense layer's regularization penalty.
    #[must_use]
    pub fn regularization_loss(&self) -> TensorFloat {
        self.dense_layers().map(Dense::regularization_loss).sum()
    }

    fn check_inputs(&self, x: MatrixView<'_>) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::config("model has not been configured"));
        }
        if x.cols() != self.inputs {
            return Err(Error::dimension("FeedForward inputs", &[x.rows(), self.inputs], x.shape()));
        }
        Ok(())
    }

    fn check_targets(&self, x: MatrixView<'_>, targets: &Targets<'_>) -> Result<()> {
        let expected = [x.rows(), self.outputs];
        match targets {
            Targets::Sparse(idx) => {
                if idx.len() != x.rows() {
                    return Err(Error::dimension("FeedForward targets", &[x.rows()], &[idx.len()]));
                }
                if let Some(&bad) = idx.iter().find(|&&c| c >= self.outputs) {
                    return Err(Error::Range {
                        start: bad,
                        end: bad + 1,
                        len: self.outputs,
                    });
                }
            }
            Targets::Dense(y) => {
                if y.shape() != &expected[..] {
                    return Err(Error::dimension("FeedForward targets", &expected, y.shape()));
                }
            }
        }
        Ok(())
    }

    /// Number of leading layers whose output the loss consumes.
    fn loss_depth(&self, loss: &Loss) -> usize {
        if loss.is_fused() {
            self.layers.len() - 1
        } else {
            self.layers.len()
        }
    }

    /// Runs the forward chain in inference mode and returns the output.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] before [`FeedForward::configure`],
    /// [`Error::Dimension`] if `inputs` has the wrong feature count.
    pub fn predict(&mut self, inputs: MatrixView<'_>) -> Result<MatrixView<'_>> {
        self.check_inputs(inputs)?;
        let n = self.layers.len();
        forward_chain(&mut self.layers, inputs, n, false)?;
        Ok(self.layers[n - 1].output().view())
    }

    /// Row argmax of [`FeedForward::predict`].
    ///
    /// # Errors
    ///
    /// As [`FeedForward::predict`].
    pub fn predict_classes(&mut self, inputs: MatrixView<'_>) -> Result<Vec<usize>> {
        Ok(self.predict(inputs)?.argmax_rows())
    }

    /// One optimizer step on a single batch.
    ///
    /// Runs the forward chain in training mode, the loss and its gradient,
    /// the backward chain in reverse layer order, then
    /// `pre_update`/`update_params`/`post_update` over every dense layer.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the model or its training is not
    /// configured, [`Error::Dimension`] for mismatched inputs or targets,
    /// [`Error::Range`] for a class index outside the output width.
    pub fn train_batch(&mut self, inputs: MatrixView<'_>, targets: &Targets<'_>) -> Result<BatchStats> {
        self.check_inputs(inputs)?;
        self.check_targets(inputs, targets)?;
        let depth = match &self.training {
            Some(t) => self.loss_depth(&t.loss),
            None => return Err(Error::config("training has not been configured")),
        };
        let regularization_loss = self.regularization_loss();
        let Self { layers, training, .. } = self;
        let training = training
            .as_mut()
            .ok_or_else(|| Error::config("training has not been configured"))?;

        forward_chain(layers, inputs, depth, true)?;
        let predictions = input_of(layers, inputs, depth);
        training.loss.forward(predictions, targets)?;
        let data_loss = training.loss.mean();
        let accuracy = training.loss.accuracy(predictions, targets)?;
        training.loss.backward(predictions, targets)?;

        backward_chain(layers, inputs, depth, training.loss.dinputs().view())?;

        let optimizer = &mut training.optimizer;
        optimizer.pre_update()?;
        let learning_rate = optimizer.current_learning_rate();
        for dense in layers.iter_mut().filter_map(Layer::as_dense_mut) {
            optimizer.update_params(dense)?;
        }
        optimizer.post_update()?;

        Ok(BatchStats {
            data_loss,
            regularization_loss,
            accuracy,
            learning_rate,
        })
    }

    /// Mean loss and accuracy over `inputs` in inference mode.
    ///
    /// Works through the data in batches of the configured batch size.
    /// The regularization penalty is not included.
    ///
    /// # Errors
    ///
    /// As [`FeedForward::train_batch`].
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&mut self, inputs: MatrixView<'_>, targets: Targets<'_>) -> Result<Evaluation> {
        self.check_inputs(inputs)?;
        self.check_targets(inputs, &targets)?;
        let (depth, batch_size) = match &self.training {
            Some(t) => (self.loss_depth(&t.loss), t.descriptor.batch_size),
            None => return Err(Error::config("training has not been configured")),
        };
        let Self { layers, training, .. } = self;
        let training = training
            .as_mut()
            .ok_or_else(|| Error::config("training has not been configured"))?;

        let rows = inputs.rows();
        let mut loss_sum = 0.0;
        let mut accuracy_sum = None;
        let mut start = 0;
        while start < rows {
            let end = (start + batch_size).min(rows);
            let x = inputs.rows_range(start, end)?;
            let y = targets.rows_range(start, end)?;
            forward_chain(layers, x, depth, false)?;
            let predictions = input_of(layers, x, depth);
            training.loss.forward(predictions, &y)?;
            loss_sum += training.loss.sample_losses().sum();
            if let Some(acc) = training.loss.accuracy(predictions, &y)? {
                *accuracy_sum.get_or_insert(0.0) += acc * (end - start) as TensorFloat;
            }
            start = end;
        }
        let n = rows.max(1) as TensorFloat;
        Ok(Evaluation {
            loss: loss_sum / n,
            accuracy: accuracy_sum.map(|a| a / n),
        })
    }
}

fn check_fused_tail(loss: LossKind, layers: &[Layer]) -> Result<()> {
    if loss == LossKind::SoftmaxCategorical && !layers.last().is_some_and(Layer::is_softmax) {
        return Err(Error::config(
            "the fused softmax loss needs a softmax activation as the last layer",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Activation, WeightInit};
    use crate::tensors::Matrix;

    fn xor_model() -> FeedForward {
        let desc = ModelDescriptor::new(2)
            .dense(4, WeightInit::He)
            .layer(Activation::Relu)
            .layer(LayerDescriptor::Dropout { rate: 0.1 })
            .dense(3, WeightInit::Xavier)
            .layer(Activation::Softmax);
        FeedForward::from_descriptor(&desc, Generator::seeded(9)).unwrap()
    }

    #[test]
    fn widths_thread_through_the_stack() {
        let model = xor_model();
        assert_eq!(model.inputs(), 2);
        assert_eq!(model.outputs(), 3);
        let shapes: Vec<_> = model.dense_layers().map(|d| (d.inputs(), d.neurons())).collect();
        assert_eq!(shapes, vec![(2, 4), (4, 3)]);
    }

    #[test]
    fn configure_rejects_empty_descriptor_and_keeps_state() {
        let mut model = xor_model();
        assert!(model.configure(&ModelDescriptor::new(2)).is_err());
        assert_eq!(model.layers().len(), 5);
    }

    #[test]
    fn fused_loss_requires_softmax_tail() {
        let desc = ModelDescriptor::new(2).dense(2, WeightInit::Random);
        let mut model = FeedForward::from_descriptor(&desc, Generator::seeded(1)).unwrap();
        let t = TrainingDescriptor::default().with_loss(LossKind::SoftmaxCategorical);
        assert!(matches!(model.configure_training(&t), Err(Error::Configuration(_))));
        model
            .configure_training(&t.with_loss(LossKind::MeanSquared))
            .unwrap();
    }

    #[test]
    fn predict_is_deterministic_despite_dropout() {
        let mut model = xor_model();
        let x = Matrix::from_vec(2, 2, vec![0.5, -1.0, 2.0, 0.25]).unwrap();
        let a = model.predict(x.view()).unwrap().as_slice().to_vec();
        let b = model.predict(x.view()).unwrap().as_slice().to_vec();
        assert_eq!(a, b);
        for row in a.chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn unconfigured_model_fails_fast() {
        let mut model = FeedForward::new(Generator::seeded(0));
        let x = Matrix::zeros(1, 2);
        assert!(matches!(model.predict(x.view()), Err(Error::Configuration(_))));
        let mut model = xor_model();
        assert!(model.train_batch(x.view(), &Targets::Sparse(&[0])).is_err());
    }

    #[test]
    fn targets_must_match_outputs() {
        let mut model = xor_model();
        model.configure_training(&TrainingDescriptor::default()).unwrap();
        let x = Matrix::zeros(2, 2);
        assert!(matches!(
            model.train_batch(x.view(), &Targets::Sparse(&[0, 3])),
            Err(Error::Range { .. })
        ));
        let y = Matrix::zeros(2, 2);
        assert!(matches!(
            model.train_batch(x.view(), &Targets::from(&y)),
            Err(Error::Dimension { .. })
        ));
        let wide = Matrix::zeros(2, 3);
        assert!(model.predict(wide.view()).is_err());
    }
}
