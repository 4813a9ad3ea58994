//! Configuration validation

use super::HarnessSpec;
use crate::error::{Error, Result};

/// Validate a parsed specification before any collaborator is built
///
/// Misconfigurations are fatal; nothing here is recoverable at run time.
pub fn validate_spec(spec: &HarnessSpec) -> Result<()> {
    if spec.model.name.is_empty() {
        return Err(Error::Config("model.name must not be empty".to_string()));
    }
    if spec.model.frame_dim == 0 || spec.model.flow_dim == 0 || spec.model.logit_dim == 0 {
        return Err(Error::Config(
            "model dimensions must be positive".to_string(),
        ));
    }

    if spec.train.max_steps <= spec.train.start_step {
        return Err(Error::Config(format!(
            "train.max_steps ({}) must exceed train.start_step ({})",
            spec.train.max_steps, spec.train.start_step
        )));
    }
    if spec.train.batch_size == 0 {
        return Err(Error::Config("train.batch_size must be positive".to_string()));
    }
    for (name, interval) in [
        ("log_interval", spec.train.log_interval),
        ("vis_interval", spec.train.vis_interval),
        ("eval_interval", spec.train.eval_interval),
        ("save_interval", spec.train.save_interval),
    ] {
        if interval == 0 {
            return Err(Error::Config(format!("train.{name} must be positive")));
        }
    }

    for (name, weight) in &spec.train.lamada {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::Config(format!(
                "train.lamada.{name} must be a non-negative finite number, got {weight}"
            )));
        }
    }

    match spec.train.optimizer.name.as_str() {
        "adam" | "sgd" => {}
        other => {
            return Err(Error::Config(format!(
                "train.optimizer.name must be 'adam' or 'sgd', got '{other}'"
            )))
        }
    }
    if !(spec.train.optimizer.lr.is_finite() && spec.train.optimizer.lr > 0.0) {
        return Err(Error::Config(
            "train.optimizer.lr must be a positive finite number".to_string(),
        ));
    }

    if spec.train.scheduler.enabled && spec.train.scheduler.t_max == 0 {
        return Err(Error::Config(
            "train.scheduler.t_max must be positive when the scheduler is enabled".to_string(),
        ));
    }

    if spec.dataset.clip_length < 2 {
        return Err(Error::Config(
            "dataset.clip_length must be at least 2 (input frame plus target frame)".to_string(),
        ));
    }
    if spec.dataset.videos == 0 || spec.dataset.frames_per_video < spec.dataset.clip_length {
        return Err(Error::Config(
            "dataset must describe at least one video long enough for a clip".to_string(),
        ));
    }
    if spec.dataset.smooth.gaussian && spec.dataset.smooth.sigmas.is_empty() {
        return Err(Error::Config(
            "dataset.smooth.sigmas must be non-empty when gaussian smoothing is enabled"
                .to_string(),
        ));
    }

    if !spec.service.threshold.is_finite() {
        return Err(Error::Config("service.threshold must be finite".to_string()));
    }
    if spec.service.stride == 0 {
        return Err(Error::Config("service.stride must be positive".to_string()));
    }

    Ok(())
}
