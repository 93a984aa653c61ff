//! Per-parameter update rules.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

/// Moment buffers an optimizer keeps for one parameter tensor.
#[derive(Debug, Clone)]
pub struct MomentSlot {
    /// Velocity, first moment, or nothing, depending on the rule
    pub first: ArrayD<f32>,
    /// Squared-gradient accumulator or infinity norm
    pub second: ArrayD<f32>,
}

impl MomentSlot {
    pub fn zeros(shape: &[usize]) -> Self {
        MomentSlot {
            first: ArrayD::zeros(shape),
            second: ArrayD::zeros(shape),
        }
    }

    pub fn matches(&self, shape: &[usize]) -> bool {
        self.first.shape() == shape
    }
}

/// Update rule with its hyperparameters resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateRule {
    Sgd,
    Momentum { momentum: f32 },
    AdaGrad { epsilon: f32 },
    RmsProp { decay: f32, epsilon: f32 },
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
    Adamax { beta1: f32, beta2: f32, epsilon: f32 },
    Nadam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl UpdateRule {
    /// Apply one step to `value` given its gradient. `t` is the 1-based
    /// iteration used for bias correction.
    pub fn apply(
        &self,
        value: &mut ArrayViewMutD<f32>,
        gradient: &ArrayViewD<f32>,
        slot: &mut MomentSlot,
        lr: f32,
        t: u64,
    ) {
        let t = t.clamp(1, i32::MAX as u64) as i32;

        match *self {
            UpdateRule::Sgd => {
                value.scaled_add(-lr, gradient);
            }
            UpdateRule::Momentum { momentum } => {
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.first)
                    .for_each(|w, &g, v| {
                        *v = momentum * *v - lr * g;
                        *w += *v;
                    });
            }
            UpdateRule::AdaGrad { epsilon } => {
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.second)
                    .for_each(|w, &g, acc| {
                        *acc += g * g;
                        *w -= lr * g / (acc.sqrt() + epsilon);
                    });
            }
            UpdateRule::RmsProp { decay, epsilon } => {
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.second)
                    .for_each(|w, &g, avg| {
                        *avg = decay * *avg + (1.0 - decay) * g * g;
                        *w -= lr * g / (avg.sqrt() + epsilon);
                    });
            }
            UpdateRule::Adam { beta1, beta2, epsilon } => {
                let bc1 = 1.0 - beta1.powi(t);
                let bc2 = 1.0 - beta2.powi(t);
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.first)
                    .and(&mut slot.second)
                    .for_each(|w, &g, m, v| {
                        *m = beta1 * *m + (1.0 - beta1) * g;
                        *v = beta2 * *v + (1.0 - beta2) * g * g;
                        let m_hat = *m / bc1;
                        let v_hat = *v / bc2;
                        *w -= lr * m_hat / (v_hat.sqrt() + epsilon);
                    });
            }
            UpdateRule::Adamax { beta1, beta2, epsilon } => {
                let step = lr / (1.0 - beta1.powi(t));
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.first)
                    .and(&mut slot.second)
                    .for_each(|w, &g, m, u| {
                        *m = beta1 * *m + (1.0 - beta1) * g;
                        *u = (beta2 * *u).max(g.abs());
                        *w -= step * *m / (*u + epsilon);
                    });
            }
            UpdateRule::Nadam { beta1, beta2, epsilon } => {
                let bc1 = 1.0 - beta1.powi(t);
                let bc2 = 1.0 - beta2.powi(t);
                Zip::from(value.view_mut())
                    .and(gradient)
                    .and(&mut slot.first)
                    .and(&mut slot.second)
                    .for_each(|w, &g, m, v| {
                        *m = beta1 * *m + (1.0 - beta1) * g;
                        *v = beta2 * *v + (1.0 - beta2) * g * g;
                        let m_hat = *m / bc1;
                        let v_hat = *v / bc2;
                        // Nesterov look-ahead on the first moment
                        let m_bar = beta1 * m_hat + (1.0 - beta1) * g / bc1;
                        *w -= lr * m_bar / (v_hat.sqrt() + epsilon);
                    });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, ArrayD, IxDyn};

    fn step(rule: UpdateRule, w: f32, g: f32, slot: &mut MomentSlot, t: u64) -> f32 {
        let mut value = ArrayD::from_elem(IxDyn(&[1]), w);
        let grad = arr1(&[g]).into_dyn();
        rule.apply(&mut value.view_mut(), &grad.view(), slot, 0.1, t);
        value.iter().next().copied().unwrap()
    }

    #[test]
    fn test_sgd_step() {
        let mut slot = MomentSlot::zeros(&[1]);
        assert!((step(UpdateRule::Sgd, 1.0, 2.0, &mut slot, 1) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_momentum_accumulates_velocity() {
        let rule = UpdateRule::Momentum { momentum: 0.9 };
        let mut slot = MomentSlot::zeros(&[1]);
        let w1 = step(rule, 0.0, 1.0, &mut slot, 1);
        let w2 = step(rule, w1, 1.0, &mut slot, 2);
        assert!((w1 + 0.1).abs() < 1e-6);
        // second step moves further: v = 0.9 * -0.1 - 0.1 = -0.19
        assert!((w2 - (w1 - 0.19)).abs() < 1e-6);
    }

    #[test]
    fn test_adam_first_step_is_lr_sized() {
        let rule = UpdateRule::Adam { beta1: 0.9, beta2: 0.999, epsilon: 1e-8 };
        let mut slot = MomentSlot::zeros(&[1]);
        let w = step(rule, 0.0, 5.0, &mut slot, 1);
        assert!((w + 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_adamax_and_nadam_move_against_gradient() {
        for rule in [
            UpdateRule::Adamax { beta1: 0.9, beta2: 0.999, epsilon: 1e-8 },
            UpdateRule::Nadam { beta1: 0.9, beta2: 0.999, epsilon: 1e-8 },
            UpdateRule::AdaGrad { epsilon: 1e-8 },
            UpdateRule::RmsProp { decay: 0.9, epsilon: 1e-8 },
        ] {
            let mut slot = MomentSlot::zeros(&[1]);
            assert!(step(rule, 0.0, 1.0, &mut slot, 1) < 0.0, "{:?}", rule);
            let mut slot = MomentSlot::zeros(&[1]);
            assert!(step(rule, 0.0, -1.0, &mut slot, 1) > 0.0, "{:?}", rule);
        }
    }
}
