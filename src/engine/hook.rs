//! Lifecycle hooks
//!
//! Hooks observe and mutate engine run-state at four lifecycle points around
//! the step loop, plus a one-shot `inference` entry for non-training runs.
//! They never hold a reference to the engine; the run-state arrives as an
//! explicit handle at every call. Dispatch preserves registration order.

use crate::autograd::no_grad;
use crate::engine::state::EngineState;
use crate::error::Result;
use tracing::info;

/// Scalar evaluation of the current models, higher is better
pub trait Evaluator {
    /// Compute a score for the engine's current state at `step`
    fn evaluate(&mut self, state: &mut EngineState, step: u64) -> Result<f32>;

    /// Name for logging
    fn name(&self) -> &str {
        "Evaluator"
    }
}

/// Trait for engine lifecycle hooks
///
/// All methods have default no-op implementations, so concrete hooks
/// override only the events they care about.
pub trait EngineHook {
    /// Called once before the first step
    fn before_train(&mut self, _state: &mut EngineState) -> Result<()> {
        Ok(())
    }

    /// Called before each step
    fn before_step(&mut self, _state: &mut EngineState, _step: u64) -> Result<()> {
        Ok(())
    }

    /// Called after each step
    fn after_step(&mut self, _state: &mut EngineState, _step: u64) -> Result<()> {
        Ok(())
    }

    /// Called once after the last step
    fn after_train(&mut self, _state: &mut EngineState) -> Result<()> {
        Ok(())
    }

    /// Called once per inference run; no step loop is involved
    fn inference(&mut self, _state: &mut EngineState) -> Result<()> {
        Ok(())
    }

    /// Hook name for logging
    fn name(&self) -> &str {
        "EngineHook"
    }
}

/// Ordered hook collection
///
/// Hooks fire in insertion order at every lifecycle point; the sequence is
/// deterministic across runs.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn EngineHook>>,
}

impl HookList {
    /// Create an empty list
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook
    pub fn add<H: EngineHook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Append a boxed hook
    pub fn add_boxed(&mut self, hook: Box<dyn EngineHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fire before_train on every hook
    pub fn before_train(&mut self, state: &mut EngineState) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_train(state)?;
        }
        Ok(())
    }

    /// Fire before_step on every hook
    pub fn before_step(&mut self, state: &mut EngineState, step: u64) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_step(state, step)?;
        }
        Ok(())
    }

    /// Fire after_step on every hook
    pub fn after_step(&mut self, state: &mut EngineState, step: u64) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_step(state, step)?;
        }
        Ok(())
    }

    /// Fire after_train on every hook
    pub fn after_train(&mut self, state: &mut EngineState) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_train(state)?;
        }
        Ok(())
    }

    /// Fire inference on every hook
    pub fn inference(&mut self, state: &mut EngineState) -> Result<()> {
        for hook in &mut self.hooks {
            hook.inference(state)?;
        }
        Ok(())
    }
}

/// Cadenced evaluation with best-accuracy-gated checkpoint retention
///
/// On the eval cadence the evaluator runs under a no-grad scope. A strictly
/// better score updates the engine's best accuracy and writes a best
/// checkpoint; otherwise, if the step is also on the save cadence, a routine
/// checkpoint is written without touching the best accuracy. Equal scores
/// never count as an improvement.
pub struct EvaluateHook {
    evaluator: Box<dyn Evaluator>,
}

impl EvaluateHook {
    /// Wrap an evaluation method
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl EngineHook for EvaluateHook {
    fn after_step(&mut self, state: &mut EngineState, step: u64) -> Result<()> {
        if step % state.cadence.eval == 0 && step != 0 {
            let accuracy = no_grad(|| self.evaluator.evaluate(state, step))?;
            if accuracy > state.best_accuracy {
                state.best_accuracy = accuracy;
                state.save(step, true)?;
            } else if step % state.cadence.save == 0 && step != 0 {
                state.save(step, false)?;
                info!(
                    step,
                    accuracy,
                    best = state.best_accuracy,
                    "accuracy did not improve but a checkpoint was saved"
                );
            }
        }
        Ok(())
    }

    fn inference(&mut self, state: &mut EngineState) -> Result<()> {
        let metric = no_grad(|| self.evaluator.evaluate(state, 0))?;
        info!(metric, "inference metric");
        Ok(())
    }

    fn name(&self) -> &str {
        "EvaluateHook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Evaluator returning a preset score sequence
    struct ScriptedEvaluator {
        scores: Vec<f32>,
        calls: Rc<RefCell<Vec<u64>>>,
    }

    impl Evaluator for ScriptedEvaluator {
        fn evaluate(&mut self, _state: &mut EngineState, step: u64) -> Result<f32> {
            assert!(
                !crate::autograd::grad_enabled(),
                "evaluation must run under no_grad"
            );
            self.calls.borrow_mut().push(step);
            Ok(self.scores.remove(0))
        }
    }

    fn hook_with(scores: Vec<f32>) -> (EvaluateHook, Rc<RefCell<Vec<u64>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let hook = EvaluateHook::new(Box::new(ScriptedEvaluator {
            scores,
            calls: calls.clone(),
        }));
        (hook, calls)
    }

    #[test]
    fn test_improvement_triggers_best_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;
        state.cadence.save = 4;
        state.best_accuracy = 0.5;

        let (mut hook, calls) = hook_with(vec![0.6]);
        hook.after_step(&mut state, 2).unwrap();

        assert_eq!(state.best_accuracy, 0.6);
        assert_eq!(calls.borrow().as_slice(), &[2]);
        let path = state.result_path.clone().unwrap();
        assert!(path.to_string_lossy().contains("best"));
    }

    #[test]
    fn test_no_improvement_routine_save_on_save_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;
        state.cadence.save = 4;
        state.best_accuracy = 0.5;

        // Step 4 is both an eval and a save step; score is worse
        let (mut hook, _) = hook_with(vec![0.4]);
        hook.after_step(&mut state, 4).unwrap();

        assert_eq!(state.best_accuracy, 0.5);
        let path = state.result_path.clone().unwrap();
        assert!(path.to_string_lossy().contains("step4"));
    }

    #[test]
    fn test_no_improvement_off_save_interval_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;
        state.cadence.save = 4;
        state.best_accuracy = 0.5;

        let (mut hook, _) = hook_with(vec![0.4]);
        hook.after_step(&mut state, 2).unwrap();

        assert_eq!(state.best_accuracy, 0.5);
        assert!(state.result_path.is_none());
    }

    #[test]
    fn test_equal_accuracy_is_not_an_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;
        state.cadence.save = 4;
        state.best_accuracy = 0.5;

        let (mut hook, _) = hook_with(vec![0.5]);
        hook.after_step(&mut state, 2).unwrap();

        assert_eq!(state.best_accuracy, 0.5);
        assert!(state.result_path.is_none());
    }

    #[test]
    fn test_step_zero_never_evaluates() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;

        let (mut hook, calls) = hook_with(vec![0.9]);
        hook.after_step(&mut state, 0).unwrap();

        assert!(calls.borrow().is_empty());
        assert_eq!(state.best_accuracy, super::super::state::BEST_ACCURACY_SENTINEL);
    }

    #[test]
    fn test_off_cadence_step_skips_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        state.cadence.eval = 2;

        let (mut hook, calls) = hook_with(vec![0.9]);
        hook.after_step(&mut state, 3).unwrap();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_inference_has_no_checkpoint_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());

        let (mut hook, calls) = hook_with(vec![0.7]);
        hook.inference(&mut state).unwrap();

        assert_eq!(calls.borrow().as_slice(), &[0]);
        assert!(state.result_path.is_none());
        assert_eq!(state.best_accuracy, super::super::state::BEST_ACCURACY_SENTINEL);
    }

    #[test]
    fn test_hook_list_insertion_order() {
        struct Recorder {
            id: usize,
            log: Rc<RefCell<Vec<usize>>>,
        }
        impl EngineHook for Recorder {
            fn before_step(&mut self, _state: &mut EngineState, _step: u64) -> Result<()> {
                self.log.borrow_mut().push(self.id);
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut hooks = HookList::new();
        for id in 0..3 {
            hooks.add(Recorder {
                id,
                log: log.clone(),
            });
        }
        assert_eq!(hooks.len(), 3);

        hooks.before_step(&mut state, 0).unwrap();
        assert_eq!(log.borrow().as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_default_hook_is_noop() {
        struct Plain;
        impl EngineHook for Plain {}

        let dir = tempfile::tempdir().unwrap();
        let mut state = testutil::state(dir.path());
        let mut hook = Plain;

        hook.before_train(&mut state).unwrap();
        hook.before_step(&mut state, 0).unwrap();
        hook.after_step(&mut state, 0).unwrap();
        hook.after_train(&mut state).unwrap();
        hook.inference(&mut state).unwrap();
        assert_eq!(hook.name(), "EngineHook");
    }
}
