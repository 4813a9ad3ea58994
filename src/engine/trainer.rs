//! The engine: run-state plus a per-step update strategy
//!
//! The engine owns the run-state and drives the fixed lifecycle sequence
//! around each step; the per-step update rule is a strategy object resolved
//! from the engine registry, not a subclass. States move Constructed →
//! Running → Stopped; Stopped is terminal whether the loop finished or an
//! unrecoverable error propagated.

use crate::engine::hook::HookList;
use crate::engine::state::EngineState;
use crate::error::Result;
use tracing::info;

/// Per-step update rule implemented by each concrete engine
pub trait TrainStep {
    /// Engine name, matching its registry key
    fn name(&self) -> &str;

    /// One-time setup after construction (meter allocation, weight checks)
    fn setup(&mut self, _state: &mut EngineState) -> Result<()> {
        Ok(())
    }

    /// Execute one training step
    fn train(&mut self, state: &mut EngineState, step: u64) -> Result<()>;
}

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Constructed,
    Running,
    Stopped,
}

/// Orchestration object owning run-state, hooks, and the step strategy
pub struct Engine {
    state: EngineState,
    hooks: HookList,
    strategy: Box<dyn TrainStep>,
    phase: EnginePhase,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Construct the engine and run the strategy's one-time setup
    pub fn new(
        mut state: EngineState,
        strategy: Box<dyn TrainStep>,
        hooks: HookList,
    ) -> Result<Self> {
        let mut strategy = strategy;
        strategy.setup(&mut state)?;
        Ok(Self {
            state,
            hooks,
            strategy,
            phase: EnginePhase::Constructed,
        })
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Shared view of the run-state
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Mutable view of the run-state
    pub fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    /// Register another hook; order of registration is dispatch order
    pub fn add_hook<H: crate::engine::hook::EngineHook + 'static>(&mut self, hook: H) {
        self.hooks.add(hook);
    }

    /// Drive the training loop over `[start_step, max_steps)`
    ///
    /// For each step the sequence is fixed: hooks.before_step → train →
    /// hooks.after_step, with before_train once before the loop and
    /// after_train once after it. Errors propagate after the engine moves to
    /// Stopped; there is no partial-state continuation.
    pub fn run(&mut self, start_step: u64, max_steps: u64) -> Result<()> {
        self.phase = EnginePhase::Running;
        info!(
            engine = self.strategy.name(),
            start_step, max_steps, "training loop starting"
        );

        let outcome = self.run_inner(start_step, max_steps);
        self.phase = EnginePhase::Stopped;

        if outcome.is_ok() {
            info!(engine = self.strategy.name(), "training loop finished");
        }
        outcome
    }

    fn run_inner(&mut self, start_step: u64, max_steps: u64) -> Result<()> {
        self.hooks.before_train(&mut self.state)?;

        for step in start_step..max_steps {
            self.hooks.before_step(&mut self.state, step)?;
            self.state.step = step;
            self.strategy.train(&mut self.state, step)?;
            self.hooks.after_step(&mut self.state, step)?;
        }

        self.hooks.after_train(&mut self.state)
    }

    /// One-shot evaluation entry: fire every hook's `inference` once
    pub fn run_inference(&mut self) -> Result<()> {
        self.phase = EnginePhase::Running;
        let outcome = self.hooks.inference(&mut self.state);
        self.phase = EnginePhase::Stopped;
        outcome
    }
}
