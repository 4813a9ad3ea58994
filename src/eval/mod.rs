//! Evaluation methods and score persistence
//!
//! The builtin evaluation method scores reconstruction quality with PSNR
//! over the test split, one score curve per video. Curves are min-max
//! normalized, optionally Gaussian-smoothed, and written as one structured
//! result record per configured sigma.

use crate::autograd::Tensor;
use crate::data::Prefetcher;
use crate::engine::hook::Evaluator;
use crate::engine::state::EngineState;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Peak signal-to-noise ratio between two frames, unit signal range
pub fn psnr_error(prediction: &Tensor, target: &Tensor) -> f32 {
    let n = prediction.len().max(1) as f32;
    let mse = prediction
        .data()
        .iter()
        .zip(target.data().iter())
        .map(|(p, t)| (p - t) * (p - t))
        .sum::<f32>()
        / n;

    // Identical frames cap the ratio instead of dividing by zero
    if mse <= 1e-10 {
        return 100.0;
    }
    -10.0 * mse.log10()
}

/// Min-max normalize a score curve into [0, 1]
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// One-dimensional Gaussian smoothing with reflect padding
pub fn gaussian_filter1d(values: &[f32], sigma: f32) -> Vec<f32> {
    if values.is_empty() || sigma <= 0.0 {
        return values.to_vec();
    }

    let radius = (4.0 * sigma).ceil() as i64;
    let denom = 2.0 * sigma * sigma;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|k| (-(k * k) as f32 / denom).exp())
        .collect();
    let kernel_sum: f32 = kernel.iter().sum();

    let n = values.len() as i64;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            for (j, w) in kernel.iter().enumerate() {
                let mut pos = i + (j as i64 - radius);
                if pos < 0 {
                    pos = -pos - 1;
                }
                if pos >= n {
                    pos = 2 * n - pos - 1;
                }
                let pos = pos.clamp(0, n - 1) as usize;
                acc += w * values[pos];
            }
            acc / kernel_sum
        })
        .collect()
}

/// Structured record of per-video anomaly scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Dataset name
    pub dataset: String,
    /// Number of scored videos
    pub num_videos: usize,
    /// One score curve per video
    pub score: Vec<Vec<f32>>,
}

/// Persist per-video score curves, one file per smoothing parameter
///
/// File names fold in the verbose tag, configuration name, step, and run
/// timestamp so result files from different runs never collide. Returns the
/// written paths keyed by sigma.
pub fn save_score_results(
    scores: &[Vec<f32>],
    state: &EngineState,
    verbose: &str,
    current_step: u64,
) -> Result<BTreeMap<String, PathBuf>> {
    let result_dir = &state.spec.val.result_dir;
    std::fs::create_dir_all(result_dir)?;

    let prefix = format!(
        "{verbose}_cfg#{config}#step{current_step}@{timestamp}",
        config = state.run.config_name,
        timestamp = state.run.timestamp,
    );

    let mut result_paths = BTreeMap::new();
    let write = |score: Vec<Vec<f32>>, name: &str| -> Result<PathBuf> {
        let report = ScoreReport {
            dataset: state.spec.dataset.name.clone(),
            num_videos: score.len(),
            score,
        };
        let path = result_dir.join(name);
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Serialization(format!("score report: {e}")))?;
        std::fs::write(&path, text)?;
        Ok(path)
    };

    if state.spec.dataset.smooth.gaussian {
        for &sigma in &state.spec.dataset.smooth.sigmas {
            let smoothed: Vec<Vec<f32>> = scores
                .iter()
                .map(|curve| gaussian_filter1d(curve, sigma))
                .collect();
            let path = write(smoothed, &format!("{prefix}_sigma{sigma}_results.json"))?;
            debug!(sigma, path = %path.display(), "smoothed scores written");
            result_paths.insert(format!("sigma_{sigma}"), path);
        }
    } else {
        let path = write(scores.to_vec(), &format!("{prefix}_sigmaNone_results.json"))?;
        result_paths.insert("sigma_none".to_string(), path);
    }

    Ok(result_paths)
}

/// Registry key of the builtin evaluation method
pub const FRAME_PSNR: &str = "frame_psnr";

/// PSNR-based evaluation over the test split
///
/// For every test clip the generator reconstructs the target frame from the
/// input frame; reconstruction PSNR forms one score curve per video. The
/// returned accuracy is the mean PSNR squashed into [0, 1], so better
/// reconstruction yields a strictly higher score.
pub struct PsnrEvaluator;

const PSNR_SCALE: f32 = 50.0;

impl Evaluator for PsnrEvaluator {
    fn evaluate(&mut self, state: &mut EngineState, step: u64) -> Result<f32> {
        let generator = state.model("G")?;

        let mut curves: Vec<Vec<f32>> = Vec::new();
        let mut psnr_sum = 0.0;
        let mut psnr_count = 0usize;

        for samples in state.loaders.test.values() {
            let mut curve = Vec::with_capacity(samples.len());
            // One-step-ahead staging; exhaustion surfaces as the end sentinel
            let mut clips = Prefetcher::new(samples.iter().cloned());
            while let Some(sample) = clips.next() {
                if sample.frames.len() < 2 {
                    continue;
                }
                let input = sample.frames[0].clone();
                let target = &sample.frames[1];

                let outputs = generator.forward(&[input]);
                let frame = outputs.into_iter().last().ok_or_else(|| {
                    Error::UnsupportedModel("role 'G' produced no outputs".to_string())
                })?;

                let psnr = psnr_error(&frame, target);
                psnr_sum += psnr;
                psnr_count += 1;
                curve.push(psnr);
            }
            curves.push(normalize_scores(&curve));
        }

        if psnr_count == 0 {
            return Err(Error::Config(
                "test split has no scorable clips".to_string(),
            ));
        }

        let paths = save_score_results(&curves, state, "val", step)?;
        info!(
            step,
            files = paths.len(),
            "evaluation scores written"
        );

        let mean_psnr = psnr_sum / psnr_count as f32;
        Ok((mean_psnr / PSNR_SCALE).clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        FRAME_PSNR
    }
}
