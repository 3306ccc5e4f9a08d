use super::{for_each_param, LearningRate, Optimize, Schedule};
use crate::layers::ParamSlot;
use crate::tensors::TensorFloat;

/// Adam with bias-corrected moment estimates.
///
/// The first moment lives in the layer's momentum buffer and the second in
/// its cache buffer.
#[derive(Debug, Clone)]
pub struct Adam {
    schedule: Schedule,
    epsilon: TensorFloat,
    beta1: TensorFloat,
    beta2: TensorFloat,
}

impl Adam {
    /// An optimizer at step zero. Hyperparameters are not checked here;
    /// see [`Optimizer::new`](super::Optimizer::new).
    #[must_use]
    pub fn new(rate: LearningRate, epsilon: TensorFloat, beta1: TensorFloat, beta2: TensorFloat) -> Self {
        Self {
            schedule: Schedule::new(rate),
            epsilon,
            beta1,
            beta2,
        }
    }
}

impl Optimize for Adam {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    #[allow(clippy::suspicious_operation_groupings)]
    fn apply(&self, slot: ParamSlot<'_>, lr: TensorFloat, t: u64) {
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let t = i32::try_from(t).unwrap_or(i32::MAX);
        let c1 = 1.0 - b1.powi(t);
        let c2 = 1.0 - b2.powi(t);
        for_each_param(slot, |p, g, m, v| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / c1;
            let v_hat = *v / c2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let opt = Adam::new(LearningRate::new(0.01), 1e-7, 0.9, 0.999);
        let mut param = [0.0, 0.0];
        let grad = [3.0, -0.5];
        let (mut m, mut v) = ([0.0; 2], [0.0; 2]);
        opt.apply(
            ParamSlot {
                param: &mut param,
                grad: &grad,
                momentum: &mut m,
                cache: &mut v,
            },
            0.01,
            1,
        );
        // m_hat = g and v_hat = g² after one step, so each parameter moves by ~lr.
        assert!((param[0] + 0.01).abs() < 1e-5);
        assert!((param[1] - 0.01).abs() < 1e-5);
    }
}
