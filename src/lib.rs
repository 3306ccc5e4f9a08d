//! briny_mlp: a hand-differentiated feed-forward network engine.
//!
//! Dense tensor primitives, layers with explicit backward passes, losses
//! (including a fused softmax cross-entropy) and gradient optimizers,
//! driven by an epoch/batch training loop. Every derivative is written out
//! by hand; there is no computation graph.
//!
//! # Features
//!
//! - Row-major [`Matrix`](tensors::Matrix)/[`Vector`](tensors::Vector)
//!   buffers with borrow-checked views and shape-checked kernels.
//! - Dense, dropout and activation layers (step, ReLU, leaky ReLU, sigmoid,
//!   softmax) with L1/L2 regularization on dense parameters.
//! - Categorical, fused softmax-categorical, binary cross-entropy, mean
//!   squared and mean absolute losses.
//! - SGD with momentum, Adagrad, RMSProp and Adam, all with inverse-time
//!   learning-rate decay.
//! - Fork-join parallel loops on rayon that fall back to sequential
//!   execution for small workloads.
//! - Parameter persistence with a validated file header.
//!
//! # Modules
//!
//! - [`tensors`]: containers, views, products and element-wise transforms.
//! - [`parallel`]: the fork-join loop helpers every kernel is built on.
//! - [`layers`]: forward/backward units.
//! - [`loss`]: losses, gradients and accuracy.
//! - [`optim`]: parameter update rules.
//! - [`model`]: descriptors, the [`FeedForward`](model::FeedForward)
//!   orchestrator and the training loop.
//! - [`data`]: borrowed datasets and batch targets.
//! - [`modelio`]: saving and loading parameters.
//! - [`rng`]: the seedable generator behind initialization, dropout and
//!   shuffling.
//!
//! # Example
//!
//! ```rust
//! use briny_mlp::data::Targets;
//! use briny_mlp::layers::{Activation, WeightInit};
//! use briny_mlp::model::{FeedForward, ModelDescriptor, TrainingDescriptor};
//! use briny_mlp::optim::OptimizerKind;
//! use briny_mlp::rng::Generator;
//! use briny_mlp::tensors::Matrix;
//!
//! let desc = ModelDescriptor::new(4)
//!     .dense(3, WeightInit::Random)
//!     .layer(Activation::Softmax);
//! let mut model = FeedForward::from_descriptor(&desc, Generator::seeded(7))?;
//! model.configure_training(
//!     &TrainingDescriptor::default()
//!         .with_optimizer(OptimizerKind::sgd().with_learning_rate(0.1))
//!         .with_batch_size(2),
//! )?;
//!
//! let x = Matrix::from_vec(2, 4, vec![1.0, 0.0, 0.5, -0.5, 0.0, 1.0, -0.5, 0.5])?;
//! let stats = model.train_batch(x.view(), &Targets::Sparse(&[0, 2]))?;
//! assert!(stats.data_loss.is_finite());
//! # Ok::<(), briny_mlp::Error>(())
//! ```

#![forbid(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod model;
pub mod modelio;
pub mod optim;
pub mod parallel;
pub mod rng;
pub mod tensors;

pub use error::{Error, Result};
