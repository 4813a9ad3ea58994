//! YAML schema definitions for the harness configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete harness specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSpec {
    /// Model configuration
    pub model: ModelSpec,

    /// Dataset configuration
    pub dataset: DatasetSpec,

    /// Training hyperparameters
    pub train: TrainSpec,

    /// Validation output configuration
    #[serde(default)]
    pub val: ValSpec,

    /// Online scoring service configuration
    #[serde(default)]
    pub service: ServiceSpec,

    /// System configuration
    #[serde(default)]
    pub system: SystemSpec,
}

/// Model selection; the name doubles as the engine registry key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model type tag, e.g. "ma"
    pub name: String,

    /// Flat pixels per frame
    #[serde(default = "default_frame_dim")]
    pub frame_dim: usize,

    /// Flat components per flow field
    #[serde(default = "default_flow_dim")]
    pub flow_dim: usize,

    /// Discriminator output width
    #[serde(default = "default_logit_dim")]
    pub logit_dim: usize,

    /// Weight initialization seed
    #[serde(default)]
    pub seed: u64,
}

/// Dataset selection and evaluation wiring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Dataset name recorded in result files
    pub name: String,

    /// Dataset factory registry key
    pub factory: String,

    /// Evaluation method registry key
    pub eval_method: String,

    /// Frames per training clip
    #[serde(default = "default_clip_length")]
    pub clip_length: usize,

    /// Number of synthetic videos per split
    #[serde(default = "default_videos")]
    pub videos: usize,

    /// Frames per synthetic video
    #[serde(default = "default_frames_per_video")]
    pub frames_per_video: usize,

    /// Score smoothing applied when writing results
    #[serde(default)]
    pub smooth: SmoothSpec,
}

/// Gaussian smoothing of per-video score curves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothSpec {
    /// Whether to smooth at all
    #[serde(default)]
    pub gaussian: bool,

    /// One result file is written per sigma
    #[serde(default)]
    pub sigmas: Vec<f32>,
}

impl Default for SmoothSpec {
    fn default() -> Self {
        Self {
            gaussian: false,
            sigmas: Vec::new(),
        }
    }
}

/// Training loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    /// First step of the loop (inclusive)
    #[serde(default)]
    pub start_step: u64,

    /// End of the loop (exclusive)
    pub max_steps: u64,

    /// Samples per step
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Emit a progress line every N steps
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,

    /// Render visualizations every N steps
    #[serde(default = "default_vis_interval")]
    pub vis_interval: u64,

    /// Run evaluation every N steps
    #[serde(default = "default_eval_interval")]
    pub eval_interval: u64,

    /// Write a routine checkpoint every N steps
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,

    /// Loss name → scalar weight for the generator objective
    pub lamada: BTreeMap<String, f32>,

    /// Optimizer settings shared by every role
    pub optimizer: OptimSpec,

    /// Optional learning-rate schedule
    #[serde(default)]
    pub scheduler: SchedulerSpec,
}

/// Optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimSpec {
    /// "adam" | "sgd"
    pub name: String,

    /// Learning rate
    pub lr: f32,

    /// Momentum (sgd only)
    #[serde(default)]
    pub momentum: f32,
}

/// Learning-rate schedule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSpec {
    /// Whether schedulers are attached at all
    #[serde(rename = "use", default)]
    pub enabled: bool,

    /// Cosine annealing horizon in steps
    #[serde(default = "default_t_max")]
    pub t_max: usize,

    /// Learning-rate floor
    #[serde(default)]
    pub lr_min: f32,
}

impl Default for SchedulerSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            t_max: default_t_max(),
            lr_min: 0.0,
        }
    }
}

/// Validation output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValSpec {
    /// Directory receiving score result files
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
}

impl Default for ValSpec {
    fn default() -> Self {
        Self {
            result_dir: default_result_dir(),
        }
    }
}

/// Online scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Anomaly decision threshold; comparison is strict greater-than
    #[serde(default)]
    pub threshold: f32,

    /// Clip stride over the input video
    #[serde(default = "default_stride")]
    pub stride: usize,

    /// Flow-error weight in the clip score
    #[serde(default = "default_unit_weight")]
    pub wf: f32,

    /// Intensity-error weight in the clip score
    #[serde(default = "default_unit_weight")]
    pub wi: f32,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            stride: default_stride(),
            wf: default_unit_weight(),
            wi: default_unit_weight(),
        }
    }
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSpec {
    /// Multi-device flag; sharding is the collaborators' concern
    #[serde(default)]
    pub parallel: bool,

    /// Checkpoint root
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Summary (scalar/image record) root
    #[serde(default = "default_summary_dir")]
    pub summary_dir: PathBuf,
}

impl Default for SystemSpec {
    fn default() -> Self {
        Self {
            parallel: false,
            checkpoint_dir: default_checkpoint_dir(),
            summary_dir: default_summary_dir(),
        }
    }
}

fn default_frame_dim() -> usize {
    16
}

fn default_flow_dim() -> usize {
    8
}

fn default_logit_dim() -> usize {
    4
}

fn default_clip_length() -> usize {
    2
}

fn default_videos() -> usize {
    2
}

fn default_frames_per_video() -> usize {
    8
}

fn default_batch_size() -> usize {
    1
}

fn default_log_interval() -> u64 {
    10
}

fn default_vis_interval() -> u64 {
    50
}

fn default_eval_interval() -> u64 {
    20
}

fn default_save_interval() -> u64 {
    40
}

fn default_t_max() -> usize {
    1000
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("output/results")
}

fn default_stride() -> usize {
    2
}

fn default_unit_weight() -> f32 {
    1.0
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("output/checkpoints")
}

fn default_summary_dir() -> PathBuf {
    PathBuf::from("output/summary")
}
