//! The engine: registry-driven, hook-extensible training and inference
//!
//! Run-state, hooks, checkpointing, meters, and the step loop live here.
//! Concrete per-step update rules (e.g. the "ma" adversarial trainer) plug
//! in as [`TrainStep`] strategies resolved from the engine registry.

pub mod checkpoint;
pub mod hook;
pub mod ma;
pub mod meter;
pub mod state;
pub mod trainer;

pub use hook::{EngineHook, EvaluateHook, Evaluator, HookList};
pub use ma::{MaService, MaTrainer, MA_ENGINE};
pub use meter::{progress_message, AverageMeter, StepCadence};
pub use state::{EngineParts, EngineState, RunTag, StagedSlots, BEST_ACCURACY_SENTINEL};
pub use trainer::{Engine, EnginePhase, TrainStep};

#[cfg(test)]
pub(crate) mod testutil {
    use super::state::{EngineParts, EngineState, RunTag};
    use crate::config::HarnessSpec;
    use crate::loss::{FlowLoss, GanLoss, GradientLoss, IntensityLoss, LossSet};
    use crate::nn::{CriticNet, FlowEstimator, FlowFrameNet, ModelSet};
    use crate::optim::{OptimizerSet, Sgd};
    use crate::summary::SummaryHub;
    use std::collections::BTreeMap;
    use std::path::Path;

    pub(crate) fn spec(dir: &Path) -> HarnessSpec {
        let yaml = format!(
            r#"
model:
  name: ma
  frame_dim: 6
  flow_dim: 4
  logit_dim: 3
  seed: 7
dataset:
  name: synthetic
  factory: synthetic
  eval_method: frame_psnr
  clip_length: 2
  videos: 2
  frames_per_video: 5
train:
  start_step: 0
  max_steps: 10
  batch_size: 1
  log_interval: 2
  vis_interval: 5
  eval_interval: 2
  save_interval: 4
  lamada:
    gan: 0.05
    intensity: 1.0
    gradient: 1.0
    flow: 2.0
  optimizer:
    name: sgd
    lr: 0.01
val:
  result_dir: {dir}/results
system:
  checkpoint_dir: {dir}/checkpoints
  summary_dir: {dir}/summary
"#,
            dir = dir.display()
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    pub(crate) fn state(dir: &Path) -> EngineState {
        let spec = spec(dir);

        let mut models: ModelSet = BTreeMap::new();
        models.insert(
            "G".to_string(),
            Box::new(FlowFrameNet::new(
                spec.model.frame_dim,
                spec.model.flow_dim,
                spec.model.seed,
            )),
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

        let mut optimizers: OptimizerSet = BTreeMap::new();
        optimizers.insert("G".to_string(), Box::new(Sgd::new(0.01, 0.0)));
        optimizers.insert("D".to_string(), Box::new(Sgd::new(0.01, 0.0)));

        let mut losses: LossSet = BTreeMap::new();
        losses.insert("gan".to_string(), Box::new(GanLoss));
        losses.insert("intensity".to_string(), Box::new(IntensityLoss));
        losses.insert("gradient".to_string(), Box::new(GradientLoss));
        losses.insert("flow".to_string(), Box::new(FlowLoss));

        let parts = EngineParts {
            models,
            optimizers,
            schedulers: BTreeMap::new(),
            losses,
            loss_weights: spec.train.lamada.clone(),
            loaders: crate::data::synthetic_loaders(&spec).unwrap(),
            summary: SummaryHub::create(&spec.system.summary_dir, &spec.model.name).unwrap(),
        };
        let run = RunTag::new("testcfg", &spec.model.name, false, false);
        EngineState::new(parts, spec, run).unwrap()
    }
}
