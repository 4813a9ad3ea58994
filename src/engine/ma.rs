//! The "ma" engine: adversarial frame-prediction training
//!
//! One step is a two-phase update. Phase one trains the generator "G": its
//! flow/frame outputs are scored against the frozen flow estimator "F" and
//! the frozen discriminator "D" with a weighted sum of adversarial, flow,
//! intensity, and gradient losses. Phase two unfreezes "D" and trains it on
//! the real pair versus the detached fake pair, averaging the two
//! adversarial terms equally.

use crate::autograd::{self, no_grad, Tensor};
use crate::data::{clips_by_stride, Sample};
use crate::engine::state::EngineState;
use crate::engine::trainer::TrainStep;
use crate::engine::meter::progress_message;
use crate::error::{Error, Result};
use crate::loss::{ensure_weights, GanLoss};
use crate::nn::{self, ModelSet};
use crate::summary::flow_to_image;
use crate::config::HarnessSpec;
use std::time::Instant;
use tracing::info;

/// Loss names the generator objective combines; each needs a weight
const GENERATOR_LOSSES: [&str; 4] = ["gan", "intensity", "gradient", "flow"];

/// Registry key of this engine
pub const MA_ENGINE: &str = "ma";

/// GAN-style trainer over roles "G" (generator), "D" (discriminator), and
/// "F" (frozen flow estimator)
#[derive(Default)]
pub struct MaTrainer;

impl MaTrainer {
    pub fn new() -> Self {
        Self
    }
}

fn single_output(outs: Vec<Tensor>, role: &str) -> Result<Tensor> {
    let mut outs = outs;
    match (outs.pop(), outs.is_empty()) {
        (Some(out), true) => Ok(out),
        _ => Err(Error::UnsupportedModel(format!(
            "role '{role}' must produce exactly one output"
        ))),
    }
}

fn flow_frame_outputs(outs: Vec<Tensor>, role: &str) -> Result<(Tensor, Tensor)> {
    let mut outs = outs;
    let frame = outs.pop();
    let flow = outs.pop();
    match (flow, frame, outs.is_empty()) {
        (Some(flow), Some(frame), true) => Ok((flow, frame)),
        _ => Err(Error::UnsupportedModel(format!(
            "role '{role}' must produce a (flow, frame) pair"
        ))),
    }
}

fn next_train_sample(state: &mut EngineState, step: u64) -> Result<Sample> {
    let keys: Vec<String> = state.loaders.train.keys().cloned().collect();
    if keys.is_empty() {
        return Err(Error::Config("train split has no loaders".to_string()));
    }
    let key = &keys[(step as usize) % keys.len()];
    match state.loaders.train.get_mut(key) {
        Some(loader) => Ok(loader.next_sample()),
        None => Err(Error::Config(format!("train loader '{key}' disappeared"))),
    }
}

impl TrainStep for MaTrainer {
    fn name(&self) -> &str {
        MA_ENGINE
    }

    fn setup(&mut self, state: &mut EngineState) -> Result<()> {
        for role in ["G", "D", "F"] {
            state.model(role)?;
        }
        for role in ["G", "D"] {
            if !state.optimizers.contains_key(role) {
                return Err(Error::MissingRole(role.to_string()));
            }
        }
        for name in GENERATOR_LOSSES {
            state.loss(name)?;
        }
        ensure_weights(&state.loss_weights, &GENERATOR_LOSSES)?;

        state.meter_mut("loss_g");
        state.meter_mut("loss_d");
        Ok(())
    }

    fn train(&mut self, state: &mut EngineState, step: u64) -> Result<()> {
        let start = Instant::now();

        // The flow estimator stays frozen for the whole run
        nn::set_requires_grad(state.model("F")?, false);
        nn::set_requires_grad(state.model("G")?, true);
        state.model_mut("G")?.set_training(true);
        state.model_mut("D")?.set_training(true);
        state.model_mut("F")?.set_training(false);

        let sample = next_train_sample(state, step)?;
        state.data_time.update(start.elapsed().as_secs_f32(), 1);

        if sample.frames.len() < 2 {
            return Err(Error::Config(format!(
                "clip from '{}' is too short: {} frame(s)",
                sample.meta.video_id,
                sample.frames.len()
            )));
        }
        let input = sample.frames[0].clone();
        let target = sample.frames[1].clone();

        // ---- phase 1: generator update, discriminator frozen ----
        nn::set_requires_grad(state.model("D")?, false);

        let (output_flow_g, output_frame_g) =
            flow_frame_outputs(state.model("G")?.forward(&[input.clone()]), "G")?;
        let flow_gt = single_output(
            state.model("F")?.forward(&[input.clone(), target.clone()]),
            "F",
        )?;
        let fake_g = single_output(
            state
                .model("D")?
                .forward(&[autograd::concat(&target, &output_flow_g)]),
            "D",
        )?;

        let loss_g_adv = state
            .loss("gan")?
            .forward(&fake_g, &GanLoss::labels(fake_g.len(), true));
        let loss_op = state.loss("flow")?.forward(&output_flow_g, &flow_gt);
        let loss_int = state.loss("intensity")?.forward(&output_frame_g, &target);
        let loss_gd = state.loss("gradient")?.forward(&output_frame_g, &target);

        let mut loss_g_all = crate::loss::weighted_sum(&[
            (state.weight("intensity")?, loss_int),
            (state.weight("gradient")?, loss_gd),
            (state.weight("flow")?, loss_op),
            (state.weight("gan")?, loss_g_adv),
        ]);

        for param in state.model("G")?.parameters() {
            param.zero_grad();
        }
        autograd::backward(&mut loss_g_all, None);
        {
            let model = state
                .models
                .get_mut("G")
                .ok_or_else(|| Error::MissingRole("G".to_string()))?;
            let optimizer = state
                .optimizers
                .get_mut("G")
                .ok_or_else(|| Error::MissingRole("G".to_string()))?;
            let mut params = model.parameters_mut();
            optimizer.step_refs(&mut params);
        }
        if let (Some(scheduler), Some(optimizer)) = (
            state.schedulers.get_mut("G"),
            state.optimizers.get_mut("G"),
        ) {
            scheduler.step();
            scheduler.apply(optimizer.as_mut());
        }
        let loss_g_val = loss_g_all.data()[0];
        state.meter_mut("loss_g").update(loss_g_val, 1);

        // ---- phase 2: discriminator update on real vs detached fake ----
        nn::set_requires_grad(state.model("D")?, true);
        for param in state.model("D")?.parameters() {
            param.zero_grad();
        }

        let real_d = single_output(
            state
                .model("D")?
                .forward(&[autograd::concat(&target, &flow_gt)]),
            "D",
        )?;
        let fake_d = single_output(
            state
                .model("D")?
                .forward(&[autograd::concat(&target, &output_flow_g.detach())]),
            "D",
        )?;

        let loss_d_real = state
            .loss("gan")?
            .forward(&real_d, &GanLoss::labels(real_d.len(), true));
        let loss_d_fake = state
            .loss("gan")?
            .forward(&fake_d, &GanLoss::labels(fake_d.len(), false));
        // Real/fake split is fixed at 0.5/0.5, never weight-mapped
        let mut loss_d = autograd::scale(&autograd::add(&loss_d_real, &loss_d_fake), 0.5);

        autograd::backward(&mut loss_d, None);
        {
            let model = state
                .models
                .get_mut("D")
                .ok_or_else(|| Error::MissingRole("D".to_string()))?;
            let optimizer = state
                .optimizers
                .get_mut("D")
                .ok_or_else(|| Error::MissingRole("D".to_string()))?;
            let mut params = model.parameters_mut();
            optimizer.step_refs(&mut params);
        }
        if let (Some(scheduler), Some(optimizer)) = (
            state.schedulers.get_mut("D"),
            state.optimizers.get_mut("D"),
        ) {
            scheduler.step();
            scheduler.apply(optimizer.as_mut());
        }
        let loss_d_val = loss_d.data()[0];
        state.meter_mut("loss_d").update(loss_d_val, 1);

        state.batch_time.update(start.elapsed().as_secs_f32(), 1);

        if step % state.cadence.log == 0 {
            let loss_meters: Vec<_> = ["loss_g", "loss_d"]
                .iter()
                .filter_map(|name| state.meters.get(*name))
                .collect();
            let message = progress_message(
                step,
                state.cadence.max,
                &state.run.model_type,
                &state.batch_time,
                state.spec.train.batch_size,
                &state.data_time,
                &loss_meters,
            );
            info!("{message}");
        }

        let global_step = state.summary.global_step;
        state
            .summary
            .writer
            .add_scalar("train_loss_g", loss_g_val, global_step)?;
        state
            .summary
            .writer
            .add_scalar("train_loss_d", loss_d_val, global_step)?;

        if step % state.cadence.vis == 0 {
            state.summary.writer.add_image(
                "train_output_flow_g",
                flow_to_image(&output_flow_g.detach()),
                3,
                global_step,
            )?;
            state.summary.writer.add_image(
                "train_target_flow",
                flow_to_image(&flow_gt),
                3,
                global_step,
            )?;
            state.summary.writer.add_image(
                "train_target_frame",
                target.data().to_vec(),
                1,
                global_step,
            )?;
            state.summary.writer.add_image(
                "train_output_frame_g",
                output_frame_g.detach().data().to_vec(),
                1,
                global_step,
            )?;
        }
        state.summary.advance();

        // Stage the freshest references so a subsequent save captures them
        state.staged.models = vec!["G".to_string(), "D".to_string()];
        state.staged.optimizers = vec!["G".to_string(), "D".to_string()];
        state.staged.losses.insert("loss_g".to_string(), loss_g_val);
        state.staged.losses.insert("loss_d".to_string(), loss_d_val);

        Ok(())
    }
}

/// Online scoring over a single video
///
/// Partitions the video into overlapping clips by stride, runs the same
/// forward computation as the evaluation path per clip, and returns the
/// boolean anomaly mask `score > threshold` (strict) aligned to clips.
pub struct MaService {
    clip_length: usize,
    stride: usize,
    threshold: f32,
    wf: f32,
    wi: f32,
}

impl MaService {
    /// Configure the service from the harness spec
    pub fn from_spec(spec: &HarnessSpec) -> Self {
        Self {
            clip_length: spec.dataset.clip_length,
            stride: spec.service.stride,
            threshold: spec.service.threshold,
            wf: spec.service.wf,
            wi: spec.service.wi,
        }
    }

    /// Per-clip anomaly scores for one video
    pub fn score_video(&self, models: &ModelSet, video: &[Tensor]) -> Result<Vec<f32>> {
        let generator = models
            .get("G")
            .ok_or_else(|| Error::MissingRole("G".to_string()))?;
        let flow_net = models
            .get("F")
            .ok_or_else(|| Error::MissingRole("F".to_string()))?;

        let clips = clips_by_stride(video, self.clip_length, self.stride);
        no_grad(|| {
            let mut scores = Vec::with_capacity(clips.len());
            for clip in &clips {
                let first = &clip[0];
                let second = &clip[1];

                let (generated_flow, generated_frame) =
                    flow_frame_outputs(generator.forward(&[first.clone()]), "G")?;
                let gt_flow = single_output(
                    flow_net.forward(&[first.clone(), second.clone()]),
                    "F",
                )?;

                scores.push(amc_score(
                    second,
                    &generated_frame,
                    &gt_flow,
                    &generated_flow,
                    self.wf,
                    self.wi,
                ));
            }
            Ok(scores)
        })
    }

    /// Boolean anomaly mask aligned to clips; comparison is strict
    pub fn execute(&self, models: &ModelSet, video: &[Tensor]) -> Result<Vec<bool>> {
        let scores = self.score_video(models, video)?;
        Ok(scores.iter().map(|s| *s > self.threshold).collect())
    }
}

/// Clip score combining flow and intensity reconstruction errors
fn amc_score(
    target_frame: &Tensor,
    generated_frame: &Tensor,
    gt_flow: &Tensor,
    generated_flow: &Tensor,
    wf: f32,
    wi: f32,
) -> f32 {
    let flow_err = gt_flow
        .data()
        .iter()
        .zip(generated_flow.data().iter())
        .map(|(a, b)| (a - b).abs())
        .sum::<f32>()
        / gt_flow.len().max(1) as f32;

    let frame_err = target_frame
        .data()
        .iter()
        .zip(generated_frame.data().iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        / target_frame.len().max(1) as f32;

    let total = wf + wi;
    if total == 0.0 {
        return 0.0;
    }
    (wf * flow_err + wi * frame_err) / total
}
