//! Model abstractions the engine orchestrates
//!
//! The harness never builds production network architectures; it drives
//! anything implementing [`Module`]. [`Dense`] is the reference
//! implementation used by the synthetic pipeline and the test suite.

use crate::autograd::{self, Tensor};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::debug;

/// A trainable sub-model slotted into a named role ("G", "D", "F", ...)
pub trait Module {
    /// Run the forward pass; multi-input, multi-output
    fn forward(&self, inputs: &[Tensor]) -> Vec<Tensor>;

    /// Parameter handles; clones share the gradient cell and requires-grad
    /// flag with the module's own copies
    fn parameters(&self) -> Vec<Tensor>;

    /// Borrowed parameter handles for in-place optimizer updates
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Toggle training/evaluation mode
    fn set_training(&mut self, training: bool);

    /// Whether the module is in training mode
    fn training(&self) -> bool;
}

/// Role name → model handle, iterated in deterministic order
pub type ModelSet = BTreeMap<String, Box<dyn Module>>;

/// Toggle gradient accumulation for every parameter of a module
///
/// Idempotent; used to freeze auxiliary networks and to alternate the
/// trainable role between generator and discriminator phases.
pub fn set_requires_grad(module: &dyn Module, requires_grad: bool) {
    for param in module.parameters() {
        param.set_requires_grad(requires_grad);
    }
}

/// Prepare a role dictionary for (single-process) data-parallel execution
///
/// The parallel flag only affects how collaborators shard models and data;
/// control flow here stays sequential. An empty container is rejected: there
/// is nothing to shard and it always indicates a wiring bug upstream.
pub fn parallelize(models: &ModelSet, parallel: bool) -> Result<()> {
    if models.is_empty() {
        return Err(Error::UnsupportedModel(
            "empty role dictionary".to_string(),
        ));
    }
    if parallel {
        for role in models.keys() {
            debug!(role = role.as_str(), "role prepared for data-parallel execution");
        }
    }
    Ok(())
}

/// Fully connected layer over flat tensors
pub struct Dense {
    weight: Tensor,
    bias: Tensor,
    in_dim: usize,
    out_dim: usize,
    training: bool,
}

impl Dense {
    /// Create a layer with seeded uniform initialization
    pub fn new(in_dim: usize, out_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
        let weight: Vec<f32> = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();

        Self {
            weight: Tensor::from_vec(weight, true),
            bias: Tensor::zeros(out_dim, true),
            in_dim,
            out_dim,
            training: true,
        }
    }

    /// Input width
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Output width
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    fn apply(&self, input: &Tensor) -> Tensor {
        let projected = autograd::matmul(&self.weight, input, self.out_dim, self.in_dim, 1);
        autograd::add(&projected, &self.bias)
    }
}

impl Module for Dense {
    fn forward(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        assert_eq!(inputs.len(), 1, "Dense takes exactly one input");
        vec![self.apply(&inputs[0])]
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn training(&self) -> bool {
        self.training
    }
}

/// Generator-shaped module: one input frame, a flow estimate and a
/// reconstructed frame out
pub struct FlowFrameNet {
    flow_head: Dense,
    frame_head: Dense,
    training: bool,
}

impl FlowFrameNet {
    /// `frame_dim` flat pixels in, `flow_dim` flat flow components out
    pub fn new(frame_dim: usize, flow_dim: usize, seed: u64) -> Self {
        Self {
            flow_head: Dense::new(frame_dim, flow_dim, seed),
            frame_head: Dense::new(frame_dim, frame_dim, seed.wrapping_add(1)),
            training: true,
        }
    }
}

impl Module for FlowFrameNet {
    fn forward(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        assert_eq!(inputs.len(), 1, "FlowFrameNet takes exactly one input");
        let flow = self.flow_head.apply(&inputs[0]);
        let frame = self.frame_head.apply(&inputs[0]);
        vec![flow, frame]
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.flow_head.parameters();
        params.extend(self.frame_head.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.flow_head.parameters_mut();
        params.extend(self.frame_head.parameters_mut());
        params
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn training(&self) -> bool {
        self.training
    }
}

/// Critic-shaped module: frame∥flow pair in, realness logits out
pub struct CriticNet {
    layer: Dense,
    training: bool,
}

impl CriticNet {
    pub fn new(pair_dim: usize, logit_dim: usize, seed: u64) -> Self {
        Self {
            layer: Dense::new(pair_dim, logit_dim, seed),
            training: true,
        }
    }
}

impl Module for CriticNet {
    fn forward(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        assert_eq!(inputs.len(), 1, "CriticNet takes exactly one input");
        vec![autograd::relu(&self.layer.apply(&inputs[0]))]
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.layer.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layer.parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn training(&self) -> bool {
        self.training
    }
}

/// Flow-estimator-shaped module: a frame pair in, ground-truth flow out
pub struct FlowEstimator {
    layer: Dense,
    training: bool,
}

impl FlowEstimator {
    pub fn new(frame_dim: usize, flow_dim: usize, seed: u64) -> Self {
        Self {
            layer: Dense::new(frame_dim * 2, flow_dim, seed),
            training: true,
        }
    }
}

impl Module for FlowEstimator {
    fn forward(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        assert_eq!(inputs.len(), 2, "FlowEstimator takes a frame pair");
        let stacked = autograd::concat(&inputs[0], &inputs[1]);
        vec![self.layer.apply(&stacked)]
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.layer.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layer.parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn training(&self) -> bool {
        self.training
    }
}
