//! Optimizer trait

use crate::autograd::Tensor;

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step on parameters borrowed from a
    /// module
    fn step_refs(&mut self, params: &mut [&mut Tensor]);

    /// Perform a single optimization step on an owned parameter list
    fn step(&mut self, params: &mut [Tensor]) {
        let mut refs: Vec<&mut Tensor> = params.iter_mut().collect();
        self.step_refs(&mut refs);
    }

    /// Zero out all gradients
    ///
    /// Gradient cells are shared between clones, so zeroing through any
    /// handle clears the cell for every holder.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
