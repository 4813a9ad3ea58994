//! Loss functions for adversarial frame prediction
//!
//! Every loss returns a scalar tensor wired into the autograd tape. The
//! backward operation reads the scalar's own output gradient, so losses
//! compose correctly under [`weighted_sum`] (weights are applied with
//! [`crate::autograd::scale`], never baked into the loss itself).

use crate::autograd::{grad_enabled, BackwardOp, Tensor};
use crate::error::{Error, Result};
use ndarray::Array1;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Trait for loss functions
pub trait Loss {
    /// Compute loss given predictions and targets
    ///
    /// Returns a scalar loss value and sets up gradients for backpropagation
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// Loss name → callable loss function
pub type LossSet = BTreeMap<String, Box<dyn Loss>>;

/// Loss name → scalar weight ("lamada" in the configuration)
pub type WeightMap = BTreeMap<String, f32>;

/// Verify the weight map covers every loss a concrete engine combines
pub fn ensure_weights(weights: &WeightMap, required: &[&str]) -> Result<()> {
    for name in required {
        if !weights.contains_key(*name) {
            return Err(Error::MissingLossWeight((*name).to_string()));
        }
    }
    Ok(())
}

/// Combine already-computed loss scalars into one weighted scalar
///
/// Gradients flow back into each term scaled by its weight.
pub fn weighted_sum(terms: &[(f32, Tensor)]) -> Tensor {
    assert!(!terms.is_empty(), "weighted_sum needs at least one term");
    let mut acc = crate::autograd::scale(&terms[0].1, terms[0].0);
    for (weight, term) in &terms[1..] {
        acc = crate::autograd::add(&acc, &crate::autograd::scale(term, *weight));
    }
    acc
}

/// Backward op shared by the loss functions below: accumulate the
/// precomputed input gradient into the prediction, scaled by the scalar
/// upstream gradient.
struct ScaledGradBackward {
    pred: Tensor,
    grad: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ScaledGradBackward {
    fn backward(&self) {
        if let Some(upstream) = self.result_grad.borrow().as_ref() {
            let g = upstream[0];
            if self.pred.requires_grad() {
                self.pred.accumulate_grad(&self.grad * g);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.pred.clone()]
    }
}

fn scalar_loss(predictions: &Tensor, value: f32, grad: Array1<f32>) -> Tensor {
    let attach = predictions.requires_grad() && grad_enabled();
    let mut loss = Tensor::from_vec(vec![value], attach);
    if attach {
        loss.set_backward_op(Rc::new(ScaledGradBackward {
            pred: predictions.clone(),
            grad,
            result_grad: loss.grad_cell(),
        }));
    }
    loss
}

/// Least-squares adversarial loss
///
/// L = mean((logits - labels)²), with all-ones labels for "real" and
/// all-zeros for "fake". Targets are produced by [`GanLoss::labels`].
pub struct GanLoss;

impl GanLoss {
    /// Label tensor for a batch of logits: ones for real, zeros for fake
    pub fn labels(len: usize, real: bool) -> Tensor {
        if real {
            Tensor::ones(len, false)
        } else {
            Tensor::zeros(len, false)
        }
    }
}

impl Loss for GanLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let diff = predictions.data() - targets.data();
        let value = (&diff * &diff).mean().unwrap_or(0.0);

        let n = predictions.len().max(1) as f32;
        scalar_loss(predictions, value, &diff * (2.0 / n))
    }

    fn name(&self) -> &str {
        "gan"
    }
}

/// Pixel intensity loss: mean squared error between frames
pub struct IntensityLoss;

impl Loss for IntensityLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let diff = predictions.data() - targets.data();
        let value = (&diff * &diff).mean().unwrap_or(0.0);

        let n = predictions.len().max(1) as f32;
        scalar_loss(predictions, value, &diff * (2.0 / n))
    }

    fn name(&self) -> &str {
        "intensity"
    }
}

/// Gradient-consistency loss
///
/// Compares adjacent-element differences of prediction and target:
/// L = mean(|Δpred - Δtarget|). Penalizes blur that intensity loss tolerates.
pub struct GradientLoss;

impl GradientLoss {
    fn diffs(data: &Array1<f32>) -> Vec<f32> {
        data.iter()
            .zip(data.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect()
    }
}

impl Loss for GradientLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let n = predictions.len();
        if n < 2 {
            return scalar_loss(predictions, 0.0, Array1::zeros(n));
        }

        let dp = Self::diffs(predictions.data());
        let dt = Self::diffs(targets.data());
        let m = dp.len() as f32;

        let mut value = 0.0;
        let mut signs = vec![0.0f32; dp.len()];
        for (i, (p, t)) in dp.iter().zip(dt.iter()).enumerate() {
            let d = p - t;
            value += d.abs();
            signs[i] = d.signum();
        }
        value /= m;

        // dL/dx_i collects -sign from the diff starting at i and +sign from
        // the diff ending at i
        let mut grad = vec![0.0f32; n];
        for (i, s) in signs.iter().enumerate() {
            grad[i] -= s / m;
            grad[i + 1] += s / m;
        }

        scalar_loss(predictions, value, Array1::from(grad))
    }

    fn name(&self) -> &str {
        "gradient"
    }
}

/// Flow reconstruction loss: root of the mean squared flow error
pub struct FlowLoss;

const FLOW_EPS: f32 = 1e-8;

impl Loss for FlowLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let diff = predictions.data() - targets.data();
        let mse = (&diff * &diff).mean().unwrap_or(0.0);
        let value = (mse + FLOW_EPS).sqrt();

        // dL/dp = (p - t) / (n * L)
        let n = predictions.len().max(1) as f32;
        scalar_loss(predictions, value, &diff * (1.0 / (n * value)))
    }

    fn name(&self) -> &str {
        "flow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_relative_eq;

    #[test]
    fn test_intensity_loss_value() {
        let pred = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let target = Tensor::from_vec(vec![1.5, 2.5, 3.5], false);
        let loss = IntensityLoss.forward(&pred, &target);
        assert_relative_eq!(loss.data()[0], 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_intensity_gradient() {
        let pred = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let target = Tensor::from_vec(vec![0.0, 0.0, 0.0], false);
        let mut loss = IntensityLoss.forward(&pred, &target);
        backward(&mut loss, None);

        let grad = pred.grad().unwrap();
        assert_relative_eq!(grad[0], 2.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(grad[2], 6.0 / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gan_loss_labels() {
        let real = GanLoss::labels(3, true);
        let fake = GanLoss::labels(3, false);
        assert_eq!(real.data()[0], 1.0);
        assert_eq!(fake.data()[2], 0.0);
    }

    #[test]
    fn test_gan_loss_perfect_real() {
        let logits = Tensor::from_vec(vec![1.0, 1.0], true);
        let loss = GanLoss.forward(&logits, &GanLoss::labels(2, true));
        assert_relative_eq!(loss.data()[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_flow_loss_is_rmse() {
        let pred = Tensor::from_vec(vec![3.0, 3.0], true);
        let target = Tensor::from_vec(vec![0.0, 0.0], false);
        let loss = FlowLoss.forward(&pred, &target);
        assert_relative_eq!(loss.data()[0], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_gradient_loss_flat_prediction() {
        // Target rises by 1 per element, prediction is flat
        let pred = Tensor::from_vec(vec![0.0, 0.0, 0.0], true);
        let target = Tensor::from_vec(vec![0.0, 1.0, 2.0], false);
        let loss = GradientLoss.forward(&pred, &target);
        assert_relative_eq!(loss.data()[0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gradient_loss_short_input() {
        let pred = Tensor::from_vec(vec![1.0], true);
        let target = Tensor::from_vec(vec![2.0], false);
        let loss = GradientLoss.forward(&pred, &target);
        assert_eq!(loss.data()[0], 0.0);
    }

    #[test]
    fn test_weighted_sum_scales_gradients() {
        let pred = Tensor::from_vec(vec![1.0, 2.0], true);
        let target = Tensor::from_vec(vec![0.0, 0.0], false);

        let l1 = IntensityLoss.forward(&pred, &target);
        let mut total = weighted_sum(&[(2.0, l1)]);
        backward(&mut total, None);

        // Plain MSE grad would be [1.0, 2.0]; weight 2 doubles it
        let grad = pred.grad().unwrap();
        assert_relative_eq!(grad[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(grad[1], 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_weighted_sum_value() {
        let pred = Tensor::from_vec(vec![1.0], true);
        let target = Tensor::from_vec(vec![0.0], false);
        let l1 = IntensityLoss.forward(&pred, &target);
        let l2 = FlowLoss.forward(&pred, &target);
        let total = weighted_sum(&[(1.0, l1), (0.5, l2)]);
        assert_relative_eq!(total.data()[0], 1.5, epsilon = 1e-3);
    }

    #[test]
    fn test_ensure_weights_missing() {
        let mut weights = WeightMap::new();
        weights.insert("gan".to_string(), 0.05);
        let err = ensure_weights(&weights, &["gan", "intensity"]).unwrap_err();
        assert!(matches!(err, Error::MissingLossWeight(name) if name == "intensity"));
    }

    #[test]
    fn test_ensure_weights_complete() {
        let mut weights = WeightMap::new();
        weights.insert("gan".to_string(), 0.05);
        weights.insert("intensity".to_string(), 1.0);
        assert!(ensure_weights(&weights, &["gan", "intensity"]).is_ok());
    }

    #[test]
    fn test_no_grad_loss_has_no_backward_op() {
        let pred = Tensor::from_vec(vec![1.0, 2.0], true);
        let target = Tensor::from_vec(vec![0.0, 0.0], false);
        let loss = crate::autograd::no_grad(|| IntensityLoss.forward(&pred, &target));
        assert!(loss.backward_op().is_none());
    }
}
