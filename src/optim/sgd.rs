use super::{for_each_param, LearningRate, Optimize, Schedule};
use crate::layers::ParamSlot;
use crate::tensors::TensorFloat;

/// Stochastic gradient descent with optional momentum.
///
/// The per-parameter update is stored in the layer's momentum buffer, so
/// with `momentum = 0` a step is exactly `param -= lr * grad`.
#[derive(Debug, Clone)]
pub struct Sgd {
    schedule: Schedule,
    momentum: TensorFloat,
}

impl Sgd {
    /// An optimizer at step zero. Hyperparameters are not checked here;
    /// see [`Optimizer::new`](super::Optimizer::new).
    #[must_use]
    pub fn new(rate: LearningRate, momentum: TensorFloat) -> Self {
        Self {
            schedule: Schedule::new(rate),
            momentum,
        }
    }

    /// Momentum factor.
    #[must_use]
    pub fn momentum(&self) -> TensorFloat {
        self.momentum
    }
}

impl Optimize for Sgd {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, _t: u64) {
        let beta = self.momentum;
        if beta == 0.0 {
            for_each_param(slot, |p, g, m, _| {
                *m = -lr * g;
                *p -= lr * g;
            });
        } else {
            for_each_param(slot, |p, g, m, _| {
                *m = beta * *m - lr * g;
                *p += *m;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_accumulates_updates() {
        let sgd = Sgd::new(LearningRate::new(0.1), 0.9);
        let mut param = [1.0];
        let grad = [2.0];
        let mut momentum = [0.0];
        let mut cache = [0.0];
        for _ in 0..2 {
            sgd.apply(
                ParamSlot {
                    param: &mut param,
                    grad: &grad,
                    momentum: &mut momentum,
                    cache: &mut cache,
                },
                0.1,
                1,
            );
        }
        // -0.2, then 0.9 * -0.2 - 0.2
        assert!((momentum[0] + 0.38).abs() < 1e-6);
        assert!((param[0] - (1.0 - 0.2 - 0.38)).abs() < 1e-6);
        assert_eq!(cache[0], 0.0);
    }
}
