//! End-to-end tests over the public harness API: registry resolution,
//! training loop, evaluation hook, checkpointing, and the scoring service.

use centinela::api::{build_engine, build_models, Registries};
use centinela::config::{validate_spec, HarnessSpec};
use centinela::engine::checkpoint::{load_checkpoint, snapshot_module};
use centinela::engine::{Engine, EngineHook, EnginePhase, EngineState, HookList, MaService, TrainStep};
use centinela::error::Result;
use centinela::Tensor;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

fn spec_for(dir: &Path) -> HarnessSpec {
    let yaml = format!(
        r#"
model:
  name: ma
  frame_dim: 6
  flow_dim: 4
  logit_dim: 3
  seed: 3
dataset:
  name: synthetic
  factory: synthetic
  eval_method: frame_psnr
  clip_length: 2
  videos: 2
  frames_per_video: 5
train:
  start_step: 0
  max_steps: 6
  batch_size: 1
  log_interval: 2
  vis_interval: 3
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
service:
  threshold: 0.0
  stride: 2
system:
  checkpoint_dir: {dir}/checkpoints
  summary_dir: {dir}/summary
"#,
        dir = dir.display()
    );
    let spec: HarnessSpec = serde_yaml::from_str(&yaml).unwrap();
    validate_spec(&spec).unwrap();
    spec
}

#[test]
fn full_training_run_tracks_best_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());

    let registries = Registries::builtin().unwrap();
    let mut engine = build_engine(&registries, &spec, "integration", false).unwrap();

    engine.run(spec.train.start_step, spec.train.max_steps).unwrap();

    let state = engine.state();
    assert_eq!(engine.phase(), EnginePhase::Stopped);
    // Evaluation ran at steps 2 and 4; the first one always beats the
    // sentinel, so a best checkpoint exists
    assert!(state.best_accuracy > centinela::engine::BEST_ACCURACY_SENTINEL);
    let best = state
        .checkpoint_dir
        .read_dir()
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .find(|name| name.contains("best"));
    assert!(best.is_some(), "no best checkpoint written");

    // Evaluation wrote score result files
    assert!(spec.val.result_dir.exists());
    assert!(spec.val.result_dir.read_dir().unwrap().next().is_some());

    // Summary records were appended
    let summary_file = spec.system.summary_dir.join("ma_summary.jsonl");
    let lines = std::fs::read_to_string(summary_file).unwrap();
    assert!(lines.lines().count() >= spec.train.max_steps as usize * 2);
}

#[test]
fn train_invoked_for_each_step_and_global_counter_advances() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());

    let registries = Registries::builtin().unwrap();
    let mut engine = build_engine(&registries, &spec, "steps", false).unwrap();

    engine.run(0, 3).unwrap();
    assert_eq!(engine.state().summary.global_step, 3);

    // A second window with an offset start advances by its own length
    let mut engine = build_engine(&registries, &spec, "steps2", false).unwrap();
    engine.run(2, 5).unwrap();
    assert_eq!(engine.state().summary.global_step, 3);
    assert_eq!(engine.state().step, 4);
}

#[test]
fn hook_sequencing_around_training_steps() {
    #[derive(Debug, PartialEq, Clone, Copy)]
    enum Event {
        BeforeTrain,
        BeforeStep(u64),
        AfterStep(u64),
        AfterTrain,
    }

    struct Recorder {
        events: Rc<RefCell<Vec<Event>>>,
    }
    impl EngineHook for Recorder {
        fn before_train(&mut self, _state: &mut EngineState) -> Result<()> {
            self.events.borrow_mut().push(Event::BeforeTrain);
            Ok(())
        }
        fn before_step(&mut self, _state: &mut EngineState, step: u64) -> Result<()> {
            self.events.borrow_mut().push(Event::BeforeStep(step));
            Ok(())
        }
        fn after_step(&mut self, _state: &mut EngineState, step: u64) -> Result<()> {
            self.events.borrow_mut().push(Event::AfterStep(step));
            Ok(())
        }
        fn after_train(&mut self, _state: &mut EngineState) -> Result<()> {
            self.events.borrow_mut().push(Event::AfterTrain);
            Ok(())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());
    let registries = Registries::builtin().unwrap();
    let mut engine = build_engine(&registries, &spec, "hooks", false).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    engine.add_hook(Recorder {
        events: events.clone(),
    });

    engine.run(0, 2).unwrap();

    let events = events.borrow();
    assert_eq!(events[0], Event::BeforeTrain);
    assert_eq!(*events.last().unwrap(), Event::AfterTrain);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::BeforeTrain))
            .count(),
        1
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::AfterTrain))
            .count(),
        1
    );
    // Per-step ordering
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::BeforeStep(_) | Event::AfterStep(_)))
            .copied()
            .collect::<Vec<_>>(),
        vec![
            Event::BeforeStep(0),
            Event::AfterStep(0),
            Event::BeforeStep(1),
            Event::AfterStep(1),
        ]
    );
}

#[test]
fn checkpoint_roundtrip_restores_weights_and_step() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());
    let registries = Registries::builtin().unwrap();
    let mut engine = build_engine(&registries, &spec, "roundtrip", false).unwrap();

    engine.run(0, 2).unwrap();

    let path = engine.state_mut().save(10, false).unwrap();
    let record = load_checkpoint(&path).unwrap();

    assert_eq!(record.step, 10);
    for role in ["G", "D"] {
        let live = snapshot_module(engine.state().model(role).unwrap());
        let saved = &record.models[role];
        assert_eq!(live.len(), saved.len());
        for (a, b) in live.iter().zip(saved.iter()) {
            assert_eq!(a.data, b.data, "weights differ for role {role}");
        }
    }
}

#[test]
fn inference_runs_hooks_once_without_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());
    let registries = Registries::builtin().unwrap();
    let mut engine = build_engine(&registries, &spec, "infer", false).unwrap();

    engine.run_inference().unwrap();

    let state = engine.state();
    // Evaluation wrote score files but no checkpoint and no best update
    assert!(state.result_path.is_none());
    assert!(state.best_accuracy < 0.0);
    assert!(spec.val.result_dir.read_dir().unwrap().next().is_some());
    assert!(!spec.system.checkpoint_dir.exists());
}

#[test]
fn custom_strategy_through_public_traits() {
    use centinela::api::{build_losses, build_optimizers};
    use centinela::data::synthetic_loaders;
    use centinela::engine::{EngineParts, RunTag};
    use centinela::summary::SummaryHub;

    struct NoopStep {
        calls: Rc<RefCell<Vec<u64>>>,
    }
    impl TrainStep for NoopStep {
        fn name(&self) -> &str {
            "noop"
        }
        fn train(&mut self, state: &mut EngineState, step: u64) -> Result<()> {
            self.calls.borrow_mut().push(step);
            state.summary.advance();
            Ok(())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let spec = spec_for(dir.path());

    let (losses, loss_weights) = build_losses(&spec);
    let parts = EngineParts {
        models: build_models(&spec),
        optimizers: build_optimizers(&spec),
        schedulers: Default::default(),
        losses,
        loss_weights,
        loaders: synthetic_loaders(&spec).unwrap(),
        summary: SummaryHub::create(&spec.system.summary_dir, &spec.model.name).unwrap(),
    };
    let run = RunTag::new("custom", &spec.model.name, false, false);
    let state = EngineState::new(parts, spec, run).unwrap();

    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut engine = Engine::new(
        state,
        Box::new(NoopStep {
            calls: calls.clone(),
        }),
        HookList::new(),
    )
    .unwrap();

    engine.run(0, 3).unwrap();
    assert_eq!(calls.borrow().as_slice(), &[0, 1, 2]);
    assert_eq!(engine.state().summary.global_step, 3);
}

#[test]
fn service_masks_follow_strict_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = spec_for(dir.path());

    let models = build_models(&spec);
    let video: Vec<Tensor> = (0..6)
        .map(|i| Tensor::from_vec(vec![i as f32 * 0.1; 6], false))
        .collect();

    let service = MaService::from_spec(&spec);
    let scores = service.score_video(&models, &video).unwrap();
    // clip_length 2, stride 2 over 6 frames → 3 clips
    assert_eq!(scores.len(), 3);

    // Strict comparison: equal threshold does not flag
    spec.service.threshold = scores[0];
    let service = MaService::from_spec(&spec);
    let mask = service.execute(&models, &video).unwrap();
    assert!(!mask[0]);
}
