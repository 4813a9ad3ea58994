//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::autograd::Tensor;
use ndarray::Array1;

/// SGD optimizer with optional momentum
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl Sgd {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }

    /// Initialize velocities if needed
    fn ensure_velocities(&mut self, count: usize) {
        if self.velocities.is_empty() {
            self.velocities = (0..count).map(|_| None).collect();
        }
    }
}

impl Optimizer for Sgd {
    fn step_refs(&mut self, params: &mut [&mut Tensor]) {
        self.ensure_velocities(params.len());

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                if self.momentum > 0.0 {
                    // v = momentum * v - lr * grad
                    let velocity = if let Some(v) = &self.velocities[i] {
                        v * self.momentum - &grad * self.lr
                    } else {
                        &grad * (-self.lr)
                    };

                    *param.data_mut() = param.data() + &velocity;
                    self.velocities[i] = Some(velocity);
                } else {
                    // Simple SGD: param -= lr * grad
                    *param.data_mut() = param.data() - &(&grad * self.lr);
                }
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_step() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        params[0].set_grad(ndarray::arr1(&[1.0, 1.0]));

        let mut opt = Sgd::new(0.1, 0.0);
        opt.step(&mut params);

        assert!((params[0].data()[0] - 0.9).abs() < 1e-6);
        assert!((params[0].data()[1] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_step_refs_updates_in_place() {
        let mut param = Tensor::from_vec(vec![1.0], true);
        param.set_grad(ndarray::arr1(&[1.0]));

        let mut opt = Sgd::new(0.5, 0.0);
        opt.step_refs(&mut [&mut param]);

        assert!((param.data()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_skips_params_without_grad() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut opt = Sgd::new(0.1, 0.0);
        opt.step(&mut params);
        assert_eq!(params[0].data()[0], 1.0);
    }

    #[test]
    fn test_zero_grad() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        params[0].set_grad(ndarray::arr1(&[1.0]));

        let mut opt = Sgd::new(0.1, 0.0);
        opt.zero_grad(&mut params);
        assert!(params[0].grad().is_none());
    }

    #[test]
    fn test_momentum_accelerates() {
        let mut plain = vec![Tensor::from_vec(vec![1.0], true)];
        let mut with_momentum = vec![Tensor::from_vec(vec![1.0], true)];

        let mut opt_plain = Sgd::new(0.1, 0.0);
        let mut opt_momentum = Sgd::new(0.1, 0.9);

        for _ in 0..3 {
            plain[0].set_grad(ndarray::arr1(&[1.0]));
            with_momentum[0].set_grad(ndarray::arr1(&[1.0]));
            opt_plain.step(&mut plain);
            opt_momentum.step(&mut with_momentum);
            plain[0].zero_grad();
            with_momentum[0].zero_grad();
        }

        assert!(with_momentum[0].data()[0] < plain[0].data()[0]);
    }
}
