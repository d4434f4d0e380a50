//! Optimizers and learning-rate schedules, mirroring `bcnn_learner` /
//! `bcnn_lr_decay`. The teacher's `optim::Optimizer` trait operates directly
//! on a concrete `Linear` layer's fields; here an optimizer instead walks a
//! `(data, grad)` pair per parameter tensor, since the engine's parameters
//! live in the network's flat tensor table rather than inside layer structs.

use serde::{Deserialize, Serialize};

use crate::types::LrSchedule;

/// Resolves the effective learning rate at step `seen`, mirroring
/// `bcnn_learner`'s six `bcnn_lr_decay` variants exactly.
pub fn learning_rate(schedule: LrSchedule, base_lr: f32, gamma: f32, power: f32, step_size: usize, seen: usize) -> f32 {
    match schedule {
        LrSchedule::Constant => base_lr,
        LrSchedule::Step => base_lr * gamma.powi((seen / step_size.max(1)) as i32),
        LrSchedule::Inv => base_lr * (1.0 + gamma * seen as f32).powf(-power),
        LrSchedule::Exp => base_lr * gamma.powi(seen as i32),
        LrSchedule::Poly => base_lr * (1.0 - seen as f32 / step_size.max(1) as f32).max(0.0).powf(power),
        LrSchedule::Sigmoid => base_lr * (1.0 / (1.0 + (gamma * (seen as f32 - step_size as f32)).exp())),
    }
}

/// Per-parameter momentum buffer (SGD) or first/second moment pair (Adam).
/// Allocated once per differentiable tensor at compile time, sized to match.
#[derive(Debug, Clone, Default)]
pub enum ParamState {
    #[default]
    Sgd {
        velocity: Vec<f32>,
    },
    Adam {
        m: Vec<f32>,
        v: Vec<f32>,
    },
}

impl ParamState {
    pub fn new_sgd(len: usize) -> Self {
        ParamState::Sgd { velocity: vec![0.0; len] }
    }

    pub fn new_adam(len: usize) -> Self {
        ParamState::Adam {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SgdConfig {
    pub momentum: f32,
    pub weight_decay: f32,
}

/// `v <- momentum*v - lr*(grad + weight_decay*data); data <- data + v`
pub fn sgd_step(config: &SgdConfig, lr: f32, data: &mut [f32], grad: &[f32], state: &mut ParamState) {
    let velocity = match state {
        ParamState::Sgd { velocity } => velocity,
        _ => panic!("sgd_step called on a non-SGD parameter state"),
    };
    for ((d, &g), v) in data.iter_mut().zip(grad.iter()).zip(velocity.iter_mut()) {
        *v = config.momentum * *v - lr * (g + config.weight_decay * *d);
        *d += *v;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamConfig {
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Standard bias-corrected Adam update (`bcnn_optimizer::ADAM`).
pub fn adam_step(config: &AdamConfig, lr: f32, step: u32, data: &mut [f32], grad: &[f32], state: &mut ParamState) {
    let (m, v) = match state {
        ParamState::Adam { m, v } => (m, v),
        _ => panic!("adam_step called on a non-Adam parameter state"),
    };
    let t = step.max(1) as i32;
    let bias_correction1 = 1.0 - config.beta1.powi(t);
    let bias_correction2 = 1.0 - config.beta2.powi(t);
    for ((d, &g), (mi, vi)) in data.iter_mut().zip(grad.iter()).zip(m.iter_mut().zip(v.iter_mut())) {
        *mi = config.beta1 * *mi + (1.0 - config.beta1) * g;
        *vi = config.beta2 * *vi + (1.0 - config.beta2) * g * g;
        let m_hat = *mi / bias_correction1;
        let v_hat = *vi / bias_correction2;
        *d -= lr * m_hat / (v_hat.sqrt() + config.eps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_schedule_ignores_step() {
        let lr0 = learning_rate(LrSchedule::Constant, 0.1, 0.9, 1.0, 100, 0);
        let lr1 = learning_rate(LrSchedule::Constant, 0.1, 0.9, 1.0, 100, 10_000);
        assert_eq!(lr0, lr1);
    }

    #[test]
    fn step_schedule_decays_after_each_step_size() {
        let lr = learning_rate(LrSchedule::Step, 0.1, 0.5, 1.0, 100, 250);
        assert!((lr - 0.1 * 0.5f32.powi(2)).abs() < 1e-6);
    }

    #[test]
    fn sgd_step_moves_data_opposite_gradient() {
        let mut data = vec![1.0];
        let grad = vec![1.0];
        let mut state = ParamState::new_sgd(1);
        let config = SgdConfig {
            momentum: 0.0,
            weight_decay: 0.0,
        };
        sgd_step(&config, 0.1, &mut data, &grad, &mut state);
        assert!((data[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn adam_step_reduces_loss_direction_gradient() {
        let mut data = vec![1.0];
        let grad = vec![1.0];
        let mut state = ParamState::new_adam(1);
        adam_step(&AdamConfig::default(), 0.1, 1, &mut data, &grad, &mut state);
        assert!(data[0] < 1.0);
    }
}
