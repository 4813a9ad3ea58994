//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with
//! gradient tape. Gradient tracking can be suspended for evaluation-only
//! forward passes with [`no_grad`].

mod backward;
mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether newly created ops record backward operations
pub fn grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Run `f` with gradient recording disabled
///
/// Forward passes inside the closure build no graph and mark no result as
/// requiring gradients. The previous state is restored when the closure
/// returns or panics.
pub fn no_grad<T>(f: impl FnOnce() -> T) -> T {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            GRAD_ENABLED.with(|g| g.set(self.0));
        }
    }

    let _restore = Restore(GRAD_ENABLED.with(|g| g.replace(false)));
    f()
}

/// Perform backward pass on a tensor
///
/// Seeds the output gradient (ones for a scalar loss), then invokes every
/// reachable backward op exactly once in reverse topological order. A tensor
/// consumed by several downstream ops has all contributions accumulated
/// before its own producer fires, so shared subgraphs are not double-counted.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    let Some(root) = tensor.backward_op() else {
        return;
    };

    let mut visited: std::collections::HashSet<*const ()> = std::collections::HashSet::new();
    let mut order: Vec<std::rc::Rc<dyn BackwardOp>> = Vec::new();
    collect_ops(&root, &mut visited, &mut order);

    // Post-order reversed is a topological order: producers after consumers
    for op in order.iter().rev() {
        op.backward();
    }
}

fn collect_ops(
    op: &std::rc::Rc<dyn BackwardOp>,
    visited: &mut std::collections::HashSet<*const ()>,
    order: &mut Vec<std::rc::Rc<dyn BackwardOp>>,
) {
    let key = std::rc::Rc::as_ptr(op) as *const ();
    if !visited.insert(key) {
        return;
    }
    for input in op.inputs() {
        if let Some(producer) = input.backward_op() {
            collect_ops(&producer, visited, order);
        }
    }
    order.push(op.clone());
}
