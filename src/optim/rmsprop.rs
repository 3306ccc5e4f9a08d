use super::{for_each_param, LearningRate, Optimize, Schedule};
use crate::layers::ParamSlot;
use crate::tensors::TensorFloat;

/// RMSProp: like Adagrad, with an exponentially decayed cache.
#[derive(Debug, Clone)]
pub struct RmsProp {
    schedule: Schedule,
    epsilon: TensorFloat,
    rho: TensorFloat,
}

impl RmsProp {
    /// An optimizer at step zero. Hyperparameters are not checked here;
    /// see [`Optimizer::new`](super::Optimizer::new).
    #[must_use]
    pub fn new(rate: LearningRate, epsilon: TensorFloat, rho: TensorFloat) -> Self {
        Self {
            schedule: Schedule::new(rate),
            epsilon,
            rho,
        }
    }
}

impl Optimize for RmsProp {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, _t: u64) {
        let (eps, rho) = (self.epsilon, self.rho);
        for_each_param(slot, |p, g, _, c| {
            *c = rho * *c + (1.0 - rho) * g * g;
            *p -= lr * g / (c.sqrt() + eps);
        });
    }
}
