//! Gradient-based parameter updates.
//!
//! # Update Protocol
//!
//! An optimizer step over a batch is three calls:
//!
//! 1. [`Optimize::pre_update`] decays the learning rate,
//!    `lr = max(lr0 / (1 + decay * iteration), floor)`.
//! 2. [`Optimize::update_params`] once per [`Dense`] layer.
//! 3. [`Optimize::post_update`] advances the iteration counter.
//!
//! Calling `update_params` outside a `pre_update`/`post_update` pair is a
//! [`Error::Configuration`].
//!
//! Optimizers own only hyperparameters and the schedule. Momentum and cache
//! buffers live on each [`Dense`] layer, so one optimizer serves every layer
//! of a model and the accumulators persist for the life of the layer.
//!
//! ## Kinds
//!
//! - [`Sgd`]: `update = momentum * update - lr * grad; param += update`.
//! - [`Adagrad`]: `cache += grad²; param -= lr * grad / (sqrt(cache) + eps)`.
//! - [`RmsProp`]: as Adagrad with `cache = rho * cache + (1 - rho) * grad²`.
//! - [`Adam`]: bias-corrected first and second moments.

mod adagrad;
mod adam;
mod rmsprop;
mod sgd;

pub use self::adagrad::Adagrad;
pub use self::adam::Adam;
pub use self::rmsprop::RmsProp;
pub use self::sgd::Sgd;

use crate::error::{Error, Result};
use crate::layers::{Dense, ParamSlot};
use crate::parallel;
use crate::tensors::TensorFloat;
use rayon::prelude::*;

/// Estimated work per parameter, used for the parallel/sequential decision.
const PARAM_COST: usize = 8;

/// Inverse-time learning-rate decay with a floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRate {
    /// Rate at iteration zero.
    pub initial: TensorFloat,
    /// Decay factor; `0` keeps the rate constant.
    pub decay: TensorFloat,
    /// Lower bound for the decayed rate.
    pub floor: TensorFloat,
}

impl LearningRate {
    /// A constant rate of `initial`.
    #[must_use]
    pub fn new(initial: TensorFloat) -> Self {
        Self {
            initial,
            decay: 0.0,
            floor: 0.0,
        }
    }

    /// Rate after `iteration` completed steps.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn at(&self, iteration: u64) -> TensorFloat {
        (self.initial / (1.0 + self.decay * iteration as TensorFloat)).max(self.floor)
    }

    fn validate(&self) -> Result<()> {
        if !(self.initial.is_finite() && self.initial > 0.0) {
            return Err(Error::config(format!(
                "learning rate must be positive and finite, got {}",
                self.initial
            )));
        }
        if !(self.decay.is_finite() && self.decay >= 0.0) || !(self.floor.is_finite() && self.floor >= 0.0) {
            return Err(Error::config(format!(
                "decay and learning-rate floor must be non-negative, got {} and {}",
                self.decay, self.floor
            )));
        }
        Ok(())
    }
}

/// The running state every optimizer shares: current rate, completed
/// iterations and whether an update pair is open.
#[derive(Debug, Clone)]
pub struct Schedule {
    rate: LearningRate,
    current: TensorFloat,
    iterations: u64,
    pending: bool,
}

impl Schedule {
    /// A schedule at step zero with no update open.
    #[must_use]
    pub fn new(rate: LearningRate) -> Self {
        Self {
            rate,
            current: rate.initial,
            iterations: 0,
            pending: false,
        }
    }

    /// Learning rate of the current (or most recent) step.
    #[must_use]
    pub fn current(&self) -> TensorFloat {
        self.current
    }

    /// Completed steps.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    fn begin(&mut self) -> Result<()> {
        if self.pending {
            return Err(Error::config("pre_update called twice without post_update"));
        }
        self.current = self.rate.at(self.iterations);
        self.pending = true;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.pending {
            Ok(())
        } else {
            Err(Error::config("update_params called outside pre_update/post_update"))
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.check_open()?;
        self.iterations += 1;
        self.pending = false;
        Ok(())
    }
}

/// Hyperparameters selecting and configuring an optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    /// Stochastic gradient descent, optionally with momentum.
    Sgd {
        /// Learning-rate schedule.
        rate: LearningRate,
        /// Momentum factor in `[0, 1)`; `0` is plain SGD.
        momentum: TensorFloat,
    },
    /// Per-parameter rates scaled by the accumulated squared gradient.
    Adagrad {
        /// Learning-rate schedule.
        rate: LearningRate,
        /// Added to the denominator's square root.
        epsilon: TensorFloat,
    },
    /// Like Adagrad with an exponentially decaying cache.
    RmsProp {
        /// Learning-rate schedule.
        rate: LearningRate,
        /// Added to the denominator's square root.
        epsilon: TensorFloat,
        /// Cache decay factor in `[0, 1)`.
        rho: TensorFloat,
    },
    /// Bias-corrected first and second moment estimates.
    Adam {
        /// Learning-rate schedule.
        rate: LearningRate,
        /// Added to the denominator's square root.
        epsilon: TensorFloat,
        /// First-moment decay in `[0, 1)`.
        beta1: TensorFloat,
        /// Second-moment decay in `[0, 1)`.
        beta2: TensorFloat,
    },
}

/// Default `epsilon` of the adaptive optimizers.
pub const DEFAULT_EPSILON: TensorFloat = 1e-7;

impl OptimizerKind {
    /// Plain SGD with learning rate `1.0` and no momentum.
    #[must_use]
    pub fn sgd() -> Self {
        Self::Sgd {
            rate: LearningRate::new(1.0),
            momentum: 0.0,
        }
    }

    /// Adagrad with learning rate `1e-3`.
    #[must_use]
    pub fn adagrad() -> Self {
        Self::Adagrad {
            rate: LearningRate::new(1e-3),
            epsilon: DEFAULT_EPSILON,
        }
    }

    /// RMSProp with learning rate `1e-3` and `rho = 0.9`.
    #[must_use]
    pub fn rms_prop() -> Self {
        Self::RmsProp {
            rate: LearningRate::new(1e-3),
            epsilon: DEFAULT_EPSILON,
            rho: 0.9,
        }
    }

    /// Adam with learning rate `1e-3`, `beta1 = 0.9`, `beta2 = 0.999`.
    #[must_use]
    pub fn adam() -> Self {
        Self::Adam {
            rate: LearningRate::new(1e-3),
            epsilon: DEFAULT_EPSILON,
            beta1: 0.9,
            beta2: 0.999,
        }
    }

    fn rate_mut(&mut self) -> &mut LearningRate {
        match self {
            Self::Sgd { rate, .. }
            | Self::Adagrad { rate, .. }
            | Self::RmsProp { rate, .. }
            | Self::Adam { rate, .. } => rate,
        }
    }

    /// The learning-rate schedule.
    #[must_use]
    pub fn rate(&self) -> LearningRate {
        match *self {
            Self::Sgd { rate, .. }
            | Self::Adagrad { rate, .. }
            | Self::RmsProp { rate, .. }
            | Self::Adam { rate, .. } => rate,
        }
    }

    /// Sets the initial learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: TensorFloat) -> Self {
        self.rate_mut().initial = learning_rate;
        self
    }

    /// Sets the inverse-time decay factor.
    #[must_use]
    pub fn with_decay(mut self, decay: TensorFloat) -> Self {
        self.rate_mut().decay = decay;
        self
    }

    /// Sets the lower bound of the decayed rate.
    #[must_use]
    pub fn with_min_learning_rate(mut self, floor: TensorFloat) -> Self {
        self.rate_mut().floor = floor;
        self
    }

    /// Sets SGD momentum; ignored by other kinds.
    #[must_use]
    pub fn with_momentum(mut self, value: TensorFloat) -> Self {
        if let Self::Sgd { momentum, .. } = &mut self {
            *momentum = value;
        }
        self
    }

    /// Checks every hyperparameter.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a non-positive learning rate, negative
    /// decay or floor, a non-positive epsilon, or a momentum/rho/beta outside
    /// `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        self.rate().validate()?;
        let unit = |name: &str, v: TensorFloat| {
            if (0.0..1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::config(format!("{name} must be in [0, 1), got {v}")))
            }
        };
        let positive = |v: TensorFloat| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::config(format!("epsilon must be positive, got {v}")))
            }
        };
        match *self {
            Self::Sgd { momentum, .. } => unit("momentum", momentum),
            Self::Adagrad { epsilon, .. } => positive(epsilon),
            Self::RmsProp { epsilon, rho, .. } => {
                positive(epsilon)?;
                unit("rho", rho)
            }
            Self::Adam {
                epsilon, beta1, beta2, ..
            } => {
                positive(epsilon)?;
                unit("beta1", beta1)?;
                unit("beta2", beta2)
            }
        }
    }
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::adam()
    }
}

/// A three-phase parameter update rule.
pub trait Optimize {
    /// Shared schedule state.
    fn schedule(&self) -> &Schedule;

    /// Mutable access to the shared schedule state.
    fn schedule_mut(&mut self) -> &mut Schedule;

    /// Updates one parameter tensor at learning rate `lr` for 1-based step `t`.
    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, t: u64);

    /// Decays the learning rate and opens an update.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if an update is already open.
    fn pre_update(&mut self) -> Result<()> {
        self.schedule_mut().begin()
    }

    /// Updates a layer's weights and biases from its stored gradients.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] outside a `pre_update`/`post_update` pair.
    fn update_params(&self, layer: &mut Dense) -> Result<()> {
        let schedule = self.schedule();
        schedule.check_open()?;
        let (lr, t) = (schedule.current(), schedule.iterations() + 1);
        for slot in layer.param_slots() {
            self.apply(slot, lr, t);
        }
        Ok(())
    }

    /// Closes the update and advances the iteration counter.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if no update is open.
    fn post_update(&mut self) -> Result<()> {
        self.schedule_mut().finish()
    }

    /// Learning rate of the open or most recent update.
    fn current_learning_rate(&self) -> TensorFloat {
        self.schedule().current()
    }

    /// Completed updates.
    fn iterations(&self) -> u64 {
        self.schedule().iterations()
    }
}

/// Runs `f(param, grad, momentum, cache)` over every element of `slot`,
/// on rayon when the tensor is large enough.
pub(crate) fn for_each_param<F>(slot: ParamSlot<'_>, f: F)
where
    F: Fn(&mut TensorFloat, TensorFloat, &mut TensorFloat, &mut TensorFloat) + Sync + Send,
{
    let ParamSlot {
        param,
        grad,
        momentum,
        cache,
    } = slot;
    if parallel::should_parallelize(PARAM_COST, param.len(), None) {
        param
            .par_iter_mut()
            .zip(grad.par_iter())
            .zip(momentum.par_iter_mut().zip(cache.par_iter_mut()))
            .for_each(|((p, &g), (m, c))| f(p, g, m, c));
    } else {
        param
            .iter_mut()
            .zip(grad)
            .zip(momentum.iter_mut().zip(cache.iter_mut()))
            .for_each(|((p, &g), (m, c))| f(p, g, m, c));
    }
}

/// An optimizer of one of the supported kinds.
#[derive(Debug, Clone)]
pub enum Optimizer {
    /// See [`OptimizerKind::Sgd`].
    Sgd(Sgd),
    /// See [`OptimizerKind::Adagrad`].
    Adagrad(Adagrad),
    /// See [`OptimizerKind::RmsProp`].
    RmsProp(RmsProp),
    /// See [`OptimizerKind::Adam`].
    Adam(Adam),
}

impl Optimizer {
    /// Builds the optimizer described by `kind`.
    ///
    /// # Errors
    ///
    /// As [`OptimizerKind::validate`].
    pub fn new(kind: OptimizerKind) -> Result<Self> {
        kind.validate()?;
        Ok(match kind {
            OptimizerKind::Sgd { rate, momentum } => Self::Sgd(Sgd::new(rate, momentum)),
            OptimizerKind::Adagrad { rate, epsilon } => Self::Adagrad(Adagrad::new(rate, epsilon)),
            OptimizerKind::RmsProp { rate, epsilon, rho } => Self::RmsProp(RmsProp::new(rate, epsilon, rho)),
            OptimizerKind::Adam {
                rate,
                epsilon,
                beta1,
                beta2,
            } => Self::Adam(Adam::new(rate, epsilon, beta1, beta2)),
        })
    }

    fn inner(&self) -> &dyn Optimize {
        match self {
            Self::Sgd(o) => o,
            Self::Adagrad(o) => o,
            Self::RmsProp(o) => o,
            Self::Adam(o) => o,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Optimize {
        match self {
            Self::Sgd(o) => o,
            Self::Adagrad(o) => o,
            Self::RmsProp(o) => o,
            Self::Adam(o) => o,
        }
    }
}

impl Optimize for Optimizer {
    fn schedule(&self) -> &Schedule {
        self.inner().schedule()
    }

    fn schedule_mut(&mut self) -> &mut Schedule {
        self.inner_mut().schedule_mut()
    }

    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, t: u64) {
        self.inner().apply(slot, lr, t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Regularization;
    use crate::tensors::{Matrix, Vector};

    #[test]
    fn inverse_time_decay_with_floor() {
        let rate = LearningRate {
            initial: 1.0,
            decay: 0.5,
            floor: 0.3,
        };
        assert_eq!(rate.at(0), 1.0);
        assert_eq!(rate.at(2), 0.5);
        assert_eq!(rate.at(100), 0.3);
    }

    #[test]
    fn protocol_is_enforced() {
        let mut opt = Optimizer::new(OptimizerKind::sgd()).unwrap();
        let w = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        let mut layer = Dense::from_parameters(w, Vector::zeros(1), Regularization::default()).unwrap();

        assert!(matches!(opt.update_params(&mut layer), Err(Error::Configuration(_))));
        assert!(opt.post_update().is_err());
        opt.pre_update().unwrap();
        assert!(opt.pre_update().is_err());
        opt.update_params(&mut layer).unwrap();
        opt.post_update().unwrap();
        assert_eq!(opt.iterations(), 1);
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        assert!(Optimizer::new(OptimizerKind::sgd().with_learning_rate(0.0)).is_err());
        assert!(Optimizer::new(OptimizerKind::sgd().with_momentum(1.0)).is_err());
        assert!(Optimizer::new(OptimizerKind::adam().with_decay(-1.0)).is_err());
        assert!(OptimizerKind::RmsProp {
            rate: LearningRate::new(0.1),
            epsilon: 0.0,
            rho: 0.9,
        }
        .validate()
        .is_err());
    }

    #[test]
    fn builders_touch_the_shared_schedule() {
        let kind = OptimizerKind::adam()
            .with_learning_rate(0.05)
            .with_decay(1e-3)
            .with_min_learning_rate(1e-4)
            .with_momentum(0.5);
        assert_eq!(
            kind.rate(),
            LearningRate {
                initial: 0.05,
                decay: 1e-3,
                floor: 1e-4
            }
        );
        assert_eq!(kind, OptimizerKind::Adam {
            rate: kind.rate(),
            epsilon: DEFAULT_EPSILON,
            beta1: 0.9,
            beta2: 0.999,
        });
    }
}
