//! Engine run-state
//!
//! [`EngineState`] owns every piece of mutable run state: the role-keyed
//! collaborator dictionaries, data loaders, meters, counters, best accuracy,
//! checkpoint staging slots, and the summary hub. Hooks receive it as an
//! explicit `&mut` handle at each lifecycle point instead of holding a back
//! reference to the engine.

use crate::config::HarnessSpec;
use crate::data::LoaderSet;
use crate::engine::checkpoint::{
    checkpoint_path, payload_digest, save_checkpoint, snapshot_module, CheckpointRecord,
    OptimizerRecord,
};
use crate::engine::meter::{AverageMeter, StepCadence};
use crate::error::{Error, Result};
use crate::loss::{Loss, LossSet, WeightMap};
use crate::nn::{self, ModelSet, Module};
use crate::optim::{Optimizer, OptimizerSet, SchedulerSet};
use crate::summary::SummaryHub;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Best accuracy before any evaluation has run; strictly below every real
/// score and representable in JSON (unlike -inf)
pub const BEST_ACCURACY_SENTINEL: f32 = -1.0;

/// Identity of one run, folded into checkpoint and result file names
#[derive(Debug, Clone)]
pub struct RunTag {
    /// Configuration name (usually the config file stem)
    pub config_name: String,
    /// Wall-clock timestamp taken at construction
    pub timestamp: String,
    /// Model type tag, e.g. "ma"
    pub model_type: String,
    /// Extra verbosity requested on the command line
    pub verbose: bool,
    /// Multi-device flag; sharding belongs to the collaborators
    pub parallel: bool,
    /// Whether the run starts from pretrained weights
    pub pretrain: bool,
}

impl RunTag {
    /// Stamp a new run
    pub fn new(config_name: &str, model_type: &str, verbose: bool, parallel: bool) -> Self {
        Self {
            config_name: config_name.to_string(),
            timestamp: Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
            model_type: model_type.to_string(),
            verbose,
            parallel,
            pretrain: false,
        }
    }
}

/// Checkpoint staging slots, refreshed by the concrete engine every step so
/// a subsequent save captures current state
#[derive(Debug, Clone, Default)]
pub struct StagedSlots {
    /// Roles whose models belong in the next checkpoint
    pub models: Vec<String>,
    /// Roles whose optimizers belong in the next checkpoint
    pub optimizers: Vec<String>,
    /// Loss values at staging time
    pub losses: BTreeMap<String, f32>,
}

/// Collaborator dictionaries handed to the engine at construction
///
/// The engine stores them as-is and never builds its own models, optimizers,
/// losses, or loaders.
pub struct EngineParts {
    pub models: ModelSet,
    pub optimizers: OptimizerSet,
    pub schedulers: SchedulerSet,
    pub losses: LossSet,
    pub loss_weights: WeightMap,
    pub loaders: LoaderSet,
    pub summary: SummaryHub,
}

/// All mutable run state owned by an engine
pub struct EngineState {
    /// Role → model handle
    pub models: ModelSet,
    /// Role → optimizer handle
    pub optimizers: OptimizerSet,
    /// Role → scheduler handle (roles without scheduling are absent)
    pub schedulers: SchedulerSet,
    /// Loss name → loss function
    pub losses: LossSet,
    /// Loss name → scalar weight
    pub loss_weights: WeightMap,
    /// Split → sub-dataset → loader
    pub loaders: LoaderSet,
    /// The full configuration, stored as-is
    pub spec: HarnessSpec,
    /// Periodic behavior intervals
    pub cadence: StepCadence,
    /// Run identity
    pub run: RunTag,
    /// Scalar/image sink plus the engine-owned global step
    pub summary: SummaryHub,
    /// Per-loss meters allocated by the concrete engine
    pub meters: BTreeMap<String, AverageMeter>,
    /// Per-step wall time
    pub batch_time: AverageMeter,
    /// Data loading share of the step time
    pub data_time: AverageMeter,
    /// Training-loop step counter
    pub step: u64,
    /// Best evaluation score seen so far
    pub best_accuracy: f32,
    /// Checkpoint root
    pub checkpoint_dir: PathBuf,
    /// Staging slots for the next save
    pub staged: StagedSlots,
    /// Path of the most recent checkpoint, if any
    pub result_path: Option<PathBuf>,
}

impl EngineState {
    /// Assemble run state from pre-built collaborators
    pub fn new(parts: EngineParts, spec: HarnessSpec, run: RunTag) -> Result<Self> {
        nn::parallelize(&parts.models, run.parallel)?;

        let cadence = StepCadence::from_spec(&spec.train);
        let checkpoint_dir = spec.system.checkpoint_dir.clone();

        Ok(Self {
            models: parts.models,
            optimizers: parts.optimizers,
            schedulers: parts.schedulers,
            losses: parts.losses,
            loss_weights: parts.loss_weights,
            loaders: parts.loaders,
            spec,
            cadence,
            run,
            summary: parts.summary,
            meters: BTreeMap::new(),
            batch_time: AverageMeter::new("batch_time"),
            data_time: AverageMeter::new("data_time"),
            step: 0,
            best_accuracy: BEST_ACCURACY_SENTINEL,
            checkpoint_dir,
            staged: StagedSlots::default(),
            result_path: None,
        })
    }

    /// Look up a model role
    pub fn model(&self, role: &str) -> Result<&dyn Module> {
        self.models
            .get(role)
            .map(|m| m.as_ref())
            .ok_or_else(|| Error::MissingRole(role.to_string()))
    }

    /// Look up a model role mutably
    pub fn model_mut(&mut self, role: &str) -> Result<&mut Box<dyn Module>> {
        self.models
            .get_mut(role)
            .ok_or_else(|| Error::MissingRole(role.to_string()))
    }

    /// Look up an optimizer role mutably
    pub fn optimizer_mut(&mut self, role: &str) -> Result<&mut Box<dyn Optimizer>> {
        self.optimizers
            .get_mut(role)
            .ok_or_else(|| Error::MissingRole(role.to_string()))
    }

    /// Look up a loss function by name
    pub fn loss(&self, name: &str) -> Result<&dyn Loss> {
        self.losses
            .get(name)
            .map(|l| l.as_ref())
            .ok_or_else(|| Error::Config(format!("loss '{name}' is not configured")))
    }

    /// Look up a loss weight by name
    pub fn weight(&self, name: &str) -> Result<f32> {
        self.loss_weights
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingLossWeight(name.to_string()))
    }

    /// Get or create a meter
    pub fn meter_mut(&mut self, name: &str) -> &mut AverageMeter {
        self.meters
            .entry(name.to_string())
            .or_insert_with(|| AverageMeter::new(name))
    }

    /// Serialize the staged checkpoint record to durable storage
    ///
    /// Routine saves overwrite by step; best saves replace the single best
    /// slot. Repeated calls with the same step succeed.
    pub fn save(&mut self, step: u64, best: bool) -> Result<PathBuf> {
        let model_roles = if self.staged.models.is_empty() {
            self.models.keys().cloned().collect()
        } else {
            self.staged.models.clone()
        };
        let optimizer_roles = if self.staged.optimizers.is_empty() {
            self.optimizers.keys().cloned().collect()
        } else {
            self.staged.optimizers.clone()
        };

        let mut models = BTreeMap::new();
        for role in model_roles {
            let module = self.model(&role)?;
            models.insert(role, snapshot_module(module));
        }

        let mut optimizers = BTreeMap::new();
        for role in optimizer_roles {
            let optimizer = self
                .optimizers
                .get(&role)
                .ok_or_else(|| Error::MissingRole(role.clone()))?;
            optimizers.insert(role, OptimizerRecord { lr: optimizer.lr() });
        }

        let digest = payload_digest(&models);
        let record = CheckpointRecord {
            config_name: self.run.config_name.clone(),
            timestamp: self.run.timestamp.clone(),
            model_type: self.run.model_type.clone(),
            step,
            best_accuracy: self.best_accuracy,
            models,
            optimizers,
            losses: self.staged.losses.clone(),
            digest,
        };

        let path = checkpoint_path(
            &self.checkpoint_dir,
            &self.run.config_name,
            &self.run.timestamp,
            &self.run.model_type,
            step,
            best,
        );
        save_checkpoint(&record, &path)?;

        info!(
            step,
            best,
            path = %path.display(),
            "checkpoint saved"
        );
        self.result_path = Some(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::IntensityLoss;
    use crate::nn::Dense;
    use crate::optim::Sgd;
    use crate::summary::SummaryHub;

    fn minimal_spec(dir: &std::path::Path) -> HarnessSpec {
        let yaml = format!(
            r#"
model:
  name: ma
  frame_dim: 4
  flow_dim: 2
dataset:
  name: synthetic
  factory: synthetic
  eval_method: frame_psnr
  videos: 1
  frames_per_video: 4
train:
  max_steps: 10
  lamada:
    intensity: 1.0
  optimizer:
    name: sgd
    lr: 0.01
system:
  checkpoint_dir: {dir}/ckpt
  summary_dir: {dir}/summary
"#,
            dir = dir.display()
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn state_for(dir: &std::path::Path) -> EngineState {
        let spec = minimal_spec(dir);
        let mut models: ModelSet = BTreeMap::new();
        models.insert("G".to_string(), Box::new(Dense::new(4, 4, 1)));

        let mut optimizers: OptimizerSet = BTreeMap::new();
        optimizers.insert("G".to_string(), Box::new(Sgd::new(0.01, 0.0)));

        let mut losses: LossSet = BTreeMap::new();
        losses.insert("intensity".to_string(), Box::new(IntensityLoss));

        let parts = EngineParts {
            models,
            optimizers,
            schedulers: BTreeMap::new(),
            losses,
            loss_weights: spec.train.lamada.clone(),
            loaders: crate::data::synthetic_loaders(&spec).unwrap(),
            summary: SummaryHub::create(&spec.system.summary_dir, "ma").unwrap(),
        };
        let run = RunTag::new("unit", "ma", false, false);
        EngineState::new(parts, spec, run).unwrap()
    }

    #[test]
    fn test_state_initial_values() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        assert_eq!(state.step, 0);
        assert_eq!(state.best_accuracy, BEST_ACCURACY_SENTINEL);
        assert!(state.result_path.is_none());
        assert!(state.meters.is_empty());
    }

    #[test]
    fn test_role_lookup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_for(dir.path());

        assert!(state.model("G").is_ok());
        assert!(matches!(state.model("D"), Err(Error::MissingRole(_))));
        assert!(matches!(
            state.optimizer_mut("D"),
            Err(Error::MissingRole(_))
        ));
        assert!(matches!(state.weight("gan"), Err(Error::MissingLossWeight(_))));
        assert_eq!(state.weight("intensity").unwrap(), 1.0);
    }

    #[test]
    fn test_meter_mut_allocates_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_for(dir.path());

        state.meter_mut("loss_g").update(1.0, 1);
        state.meter_mut("loss_g").update(3.0, 1);
        assert_eq!(state.meters["loss_g"].avg, 2.0);
        assert_eq!(state.meters.len(), 1);
    }

    #[test]
    fn test_save_writes_and_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_for(dir.path());
        state.staged.losses.insert("loss_g".to_string(), 0.5);

        let path = state.save(3, false).unwrap();
        assert!(path.exists());
        assert_eq!(state.result_path.as_deref(), Some(path.as_path()));

        let record = crate::engine::checkpoint::load_checkpoint(&path).unwrap();
        assert_eq!(record.step, 3);
        assert_eq!(record.losses["loss_g"], 0.5);
        assert!(record.models.contains_key("G"));
        assert!(record.optimizers.contains_key("G"));

        // Repeated save of the same step overwrites
        assert!(state.save(3, false).is_ok());
    }

    #[test]
    fn test_staged_roles_limit_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_for(dir.path());
        state
            .models
            .insert("D".to_string(), Box::new(Dense::new(2, 2, 2)));
        state.staged.models = vec!["G".to_string()];

        let path = state.save(1, false).unwrap();
        let record = crate::engine::checkpoint::load_checkpoint(&path).unwrap();
        assert!(record.models.contains_key("G"));
        assert!(!record.models.contains_key("D"));
    }
}
