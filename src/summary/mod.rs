//! Scalar and image summaries
//!
//! Training emits scalar curves and occasional visualizations. Records are
//! appended as JSON lines under the configured summary directory so external
//! tooling can tail them; the x-axis is the hub's global step, an
//! engine-owned counter independent of the training-loop step.

use crate::autograd::Tensor;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One summary record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryRecord {
    Scalar {
        tag: String,
        step: u64,
        value: f32,
        timestamp_ms: i64,
    },
    Image {
        tag: String,
        step: u64,
        channels: usize,
        pixels: Vec<f32>,
        timestamp_ms: i64,
    },
}

/// Append-only JSONL summary sink
pub struct SummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl SummaryWriter {
    /// Open (or create) the summary file, appending to existing records
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a scalar curve point
    pub fn add_scalar(&mut self, tag: &str, value: f32, step: u64) -> Result<()> {
        self.append(&SummaryRecord::Scalar {
            tag: tag.to_string(),
            step,
            value,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }

    /// Append an image record
    pub fn add_image(&mut self, tag: &str, pixels: Vec<f32>, channels: usize, step: u64) -> Result<()> {
        self.append(&SummaryRecord::Image {
            tag: tag.to_string(),
            step,
            channels,
            pixels,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }

    fn append(&mut self, record: &SummaryRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::Serialization(format!("summary record: {e}")))?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Writer handle plus the engine-owned global summary step
///
/// The counter increases once per `train()` call regardless of the
/// training-loop step offset, keeping curves continuous across resumed runs.
pub struct SummaryHub {
    /// Summary sink
    pub writer: SummaryWriter,
    /// Model type tag the counter belongs to
    pub model_type: String,
    /// Monotonically increasing x-axis value
    pub global_step: u64,
}

impl SummaryHub {
    /// Create a hub writing to `<dir>/<model_type>_summary.jsonl`
    pub fn create(dir: impl AsRef<Path>, model_type: &str) -> Result<Self> {
        let path = dir.as_ref().join(format!("{model_type}_summary.jsonl"));
        Ok(Self {
            writer: SummaryWriter::open(path)?,
            model_type: model_type.to_string(),
            global_step: 0,
        })
    }

    /// Advance the global counter by one
    pub fn advance(&mut self) {
        self.global_step += 1;
    }
}

/// Render a flow field into a 3-channel image (u, v, magnitude)
///
/// The flow tensor is interpreted as the u components followed by the v
/// components; the magnitude channel is appended, matching the "xym" output
/// format of the flow visualizer.
pub fn flow_to_image(flow: &Tensor) -> Vec<f32> {
    let n = flow.len() / 2;
    let data = flow.data();
    let mut pixels = Vec::with_capacity(n * 3);
    pixels.extend(data.iter().take(n));
    pixels.extend(data.iter().skip(n).take(n));
    for i in 0..n {
        let u = data[i];
        let v = data[n + i];
        pixels.push((u * u + v * v).sqrt());
    }
    pixels
}
