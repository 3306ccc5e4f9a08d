use super::{for_each_param, LearningRate, Optimize, Schedule};
use crate::layers::ParamSlot;
use crate::tensors::TensorFloat;

/// Adagrad: per-parameter steps shrink with the accumulated squared gradient.
#[derive(Debug, Clone)]
pub struct Adagrad {
    schedule: Schedule,
    epsilon: TensorFloat,
}

impl Adagrad {
    /// An optimizer at step zero. Hyperparameters are not checked here;
    /// see [`Optimizer::new`](super::Optimizer::new).
    #[must_use]
    pub fn new(rate: LearningRate, epsilon: TensorFloat) -> Self {
        Self {
            schedule: Schedule::new(rate),
            epsilon,
        }
    }
}

impl Optimize for Adagrad {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, _t: u64) {
        let eps = self.epsilon;
        for_each_param(slot, |p, g, _, c| {
            *c += g * g;
            *p -= lr * g / (c.sqrt() + eps);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_is_normalized() {
        let opt = Adagrad::new(LearningRate::new(0.5), 1e-7);
        let mut param = [0.0, 0.0];
        let grad = [4.0, -0.01];
        let (mut m, mut c) = ([0.0; 2], [0.0; 2]);
        opt.apply(
            ParamSlot {
                param: &mut param,
                grad: &grad,
                momentum: &mut m,
                cache: &mut c,
            },
            0.5,
            1,
        );
        assert!((param[0] + 0.5).abs() < 1e-5);
        assert!((param[1] - 0.5).abs() < 1e-4);
        assert_eq!(c[0], 16.0);
    }
}
