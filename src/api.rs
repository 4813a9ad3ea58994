//! Factory wiring: registries and engine assembly
//!
//! Four isolated registries map string keys from the configuration to
//! component factories. Builtins are registered by one explicit call at
//! process startup ([`Registries::builtin`]); additional engines, hooks,
//! dataset factories, or evaluation methods register through the same
//! typed entry points before the engine is built.

use crate::config::HarnessSpec;
use crate::data::LoaderSet;
use crate::engine::hook::{EngineHook, EvaluateHook, Evaluator, HookList};
use crate::engine::ma::{MaTrainer, MA_ENGINE};
use crate::engine::state::{EngineParts, EngineState, RunTag};
use crate::engine::trainer::{Engine, TrainStep};
use crate::error::Result;
use crate::eval::{PsnrEvaluator, FRAME_PSNR};
use crate::loss::{FlowLoss, GanLoss, GradientLoss, IntensityLoss, LossSet, WeightMap};
use crate::nn::{CriticNet, FlowEstimator, FlowFrameNet, ModelSet};
use crate::optim::{Adam, CosineAnnealingLr, OptimizerSet, SchedulerSet, Sgd};
use crate::registry::Registry;
use crate::summary::SummaryHub;
use tracing::info;

/// Builds a per-step update strategy
pub type EngineFactory = fn() -> Box<dyn TrainStep>;

/// Builds a lifecycle hook; the evaluation registry is available for hooks
/// that wrap an evaluation method
pub type HookFactory = fn(&HarnessSpec, &Registry<EvalFactory>) -> Result<Box<dyn EngineHook>>;

/// Builds the nested split → sub-dataset loader structure
pub type DatasetFactory = fn(&HarnessSpec) -> Result<LoaderSet>;

/// Builds an evaluation method
pub type EvalFactory = fn(&HarnessSpec) -> Box<dyn Evaluator>;

/// The four registry namespaces
pub struct Registries {
    pub engines: Registry<EngineFactory>,
    pub hooks: Registry<HookFactory>,
    pub datasets: Registry<DatasetFactory>,
    pub eval_methods: Registry<EvalFactory>,
}

fn build_ma_engine() -> Box<dyn TrainStep> {
    Box::new(MaTrainer::new())
}

fn build_evaluate_hook(
    spec: &HarnessSpec,
    eval_methods: &Registry<EvalFactory>,
) -> Result<Box<dyn EngineHook>> {
    let factory = eval_methods.get(&spec.dataset.eval_method)?;
    Ok(Box::new(EvaluateHook::new(factory(spec))))
}

fn build_psnr_evaluator(_spec: &HarnessSpec) -> Box<dyn Evaluator> {
    Box::new(PsnrEvaluator)
}

impl Registries {
    /// Create four empty namespaces
    pub fn empty() -> Self {
        Self {
            engines: Registry::new("engine"),
            hooks: Registry::new("hook"),
            datasets: Registry::new("dataset"),
            eval_methods: Registry::new("eval_method"),
        }
    }

    /// Create the namespaces and register every builtin component
    pub fn builtin() -> Result<Self> {
        let mut registries = Self::empty();
        registries.engines.register(MA_ENGINE, build_ma_engine)?;
        registries.hooks.register("evaluate", build_evaluate_hook)?;
        registries
            .datasets
            .register("synthetic", crate::data::synthetic_loaders)?;
        registries
            .eval_methods
            .register(FRAME_PSNR, build_psnr_evaluator)?;
        Ok(registries)
    }
}

/// Build the role-keyed model dictionary for the configured model type
pub fn build_models(spec: &HarnessSpec) -> ModelSet {
    let mut models = ModelSet::new();
    models.insert(
        "G".to_string(),
        Box::new(FlowFrameNet::new(
            spec.model.frame_dim,
            spec.model.flow_dim,
            spec.model.seed,
        )) as Box<dyn crate::nn::Module>,
    );
    models.insert(
        "D".to_string(),
        Box::new(CriticNet::new(
            spec.model.frame_dim + spec.model.flow_dim,
            spec.model.logit_dim,
            spec.model.seed + 1,
        )),
    );
    models.insert(
        "F".to_string(),
        Box::new(FlowEstimator::new(
            spec.model.frame_dim,
            spec.model.flow_dim,
            spec.model.seed + 2,
        )),
    );
    models
}

/// Build one optimizer per trainable role ("F" stays frozen and gets none)
pub fn build_optimizers(spec: &HarnessSpec) -> OptimizerSet {
    let mut optimizers = OptimizerSet::new();
    for role in ["G", "D"] {
        let optimizer: Box<dyn crate::optim::Optimizer> = match spec.train.optimizer.name.as_str()
        {
            "sgd" => Box::new(Sgd::new(spec.train.optimizer.lr, spec.train.optimizer.momentum)),
            _ => Box::new(Adam::default_params(spec.train.optimizer.lr)),
        };
        optimizers.insert(role.to_string(), optimizer);
    }
    optimizers
}

/// Build per-role schedulers when scheduling is enabled
pub fn build_schedulers(spec: &HarnessSpec) -> SchedulerSet {
    let mut schedulers = SchedulerSet::new();
    if spec.train.scheduler.enabled {
        for role in ["G", "D"] {
            schedulers.insert(
                role.to_string(),
                Box::new(CosineAnnealingLr::new(
                    spec.train.optimizer.lr,
                    spec.train.scheduler.t_max,
                    spec.train.scheduler.lr_min,
                )) as Box<dyn crate::optim::LrScheduler>,
            );
        }
    }
    schedulers
}

/// Build the loss dictionary and its weight mapping
pub fn build_losses(spec: &HarnessSpec) -> (LossSet, WeightMap) {
    let mut losses = LossSet::new();
    losses.insert("gan".to_string(), Box::new(GanLoss) as Box<dyn crate::loss::Loss>);
    losses.insert("intensity".to_string(), Box::new(IntensityLoss));
    losses.insert("gradient".to_string(), Box::new(GradientLoss));
    losses.insert("flow".to_string(), Box::new(FlowLoss));
    (losses, spec.train.lamada.clone())
}

/// Resolve every factory and assemble a ready-to-run engine
///
/// Mirrors the startup sequence: models → losses → optimizers → schedulers
/// → data → evaluation → summary writer → hooks → engine, with the concrete
/// engine class resolved from the registry by model name.
pub fn build_engine(
    registries: &Registries,
    spec: &HarnessSpec,
    config_name: &str,
    verbose: bool,
) -> Result<Engine> {
    let models = build_models(spec);
    let (losses, loss_weights) = build_losses(spec);
    let optimizers = build_optimizers(spec);
    let schedulers = build_schedulers(spec);

    let dataset_factory = registries.datasets.get(&spec.dataset.factory)?;
    let loaders = dataset_factory(spec)?;

    let summary = SummaryHub::create(&spec.system.summary_dir, &spec.model.name)?;

    let mut hooks = HookList::new();
    let hook_factory = registries.hooks.get("evaluate")?;
    hooks.add_boxed(hook_factory(spec, &registries.eval_methods)?);

    let engine_factory = registries.engines.get(&spec.model.name)?;
    let strategy = engine_factory();

    info!(
        engine = spec.model.name.as_str(),
        dataset = spec.dataset.factory.as_str(),
        eval_method = spec.dataset.eval_method.as_str(),
        "engine resolved from registries"
    );

    let run = RunTag::new(config_name, &spec.model.name, verbose, spec.system.parallel);
    let parts = EngineParts {
        models,
        optimizers,
        schedulers,
        losses,
        loss_weights,
        loaders,
        summary,
    };
    let state = EngineState::new(parts, spec.clone(), run)?;

    Engine::new(state, strategy, hooks)
}
