//! Data containers and loaders
//!
//! The engine pulls `(data, annotation, metadata)` samples through direct
//! iterator advancement rather than a bounded per-epoch loop, so training
//! loaders are explicitly infinite: [`CycleLoader`] restarts from the first
//! sample on exhaustion. Test loaders are plain finite sample lists, one per
//! video.

use crate::autograd::Tensor;
use crate::config::HarnessSpec;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Where a sample came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMeta {
    /// Source video identifier
    pub video_id: String,
    /// Clip start index within the video
    pub index: usize,
}

/// One training/evaluation sample: a short clip of consecutive frames
#[derive(Clone)]
pub struct Sample {
    /// Clip frames, oldest first
    pub frames: Vec<Tensor>,
    /// Optional frame-level annotation
    pub anno: Option<Tensor>,
    /// Provenance
    pub meta: SampleMeta,
}

/// Split → dataset id → loader
pub struct LoaderSet {
    /// Training split: infinite loaders keyed by sub-dataset id
    pub train: BTreeMap<String, CycleLoader>,
    /// Test split: finite per-video sample lists
    pub test: BTreeMap<String, Vec<Sample>>,
}

/// Infinite-with-wraparound sample loader
///
/// A restartable lazy sequence: when the underlying samples are exhausted
/// the cursor wraps to the start and iteration continues. The training loop
/// relies on this and never observes exhaustion.
pub struct CycleLoader {
    samples: Vec<Sample>,
    cursor: usize,
    cycles: usize,
}

impl std::fmt::Debug for CycleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleLoader")
            .field("len", &self.samples.len())
            .field("cursor", &self.cursor)
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl CycleLoader {
    /// Wrap a non-empty sample list
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Config(
                "cannot build a cycle loader over zero samples".to_string(),
            ));
        }
        Ok(Self {
            samples,
            cursor: 0,
            cycles: 0,
        })
    }

    /// Pull the next sample, wrapping around at the end
    pub fn next_sample(&mut self) -> Sample {
        let sample = self.samples[self.cursor].clone();
        self.cursor += 1;
        if self.cursor == self.samples.len() {
            self.cursor = 0;
            self.cycles += 1;
        }
        sample
    }

    /// Samples per cycle
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Never empty by construction
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Completed wraparounds
    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

/// One-step-ahead prefetcher over a finite sample stream
///
/// Holds the next sample while the caller consumes the current one.
/// Exhaustion is reported as a `None` end sentinel, never as an error.
pub struct Prefetcher<I: Iterator<Item = Sample>> {
    source: I,
    staged: Option<Sample>,
}

impl<I: Iterator<Item = Sample>> Prefetcher<I> {
    /// Wrap a stream and stage its first sample
    pub fn new(mut source: I) -> Self {
        let staged = source.next();
        Self { source, staged }
    }

    /// Take the staged sample and stage the next one
    pub fn next(&mut self) -> Option<Sample> {
        let current = self.staged.take();
        if current.is_some() {
            self.staged = self.source.next();
        }
        current
    }
}

/// Partition a frame sequence into overlapping clips by stride
///
/// Only full-length clips are returned; a tail shorter than `clip_len` is
/// dropped.
pub fn clips_by_stride(frames: &[Tensor], clip_len: usize, stride: usize) -> Vec<Vec<Tensor>> {
    assert!(clip_len > 0 && stride > 0);
    let mut clips = Vec::new();
    let mut start = 0;
    while start + clip_len <= frames.len() {
        clips.push(frames[start..start + clip_len].to_vec());
        start += stride;
    }
    clips
}

/// Deterministic synthetic dataset factory
///
/// Builds the nested split → video → clip structure from the spec alone, so
/// the harness runs end to end without external data. Registered under the
/// key `"synthetic"`.
pub fn synthetic_loaders(spec: &HarnessSpec) -> Result<LoaderSet> {
    let frame_dim = spec.model.frame_dim;
    let clip_len = spec.dataset.clip_length;
    let mut rng = StdRng::seed_from_u64(spec.model.seed);

    let mut train = BTreeMap::new();
    let mut test = BTreeMap::new();

    for v in 0..spec.dataset.videos {
        let video_id = format!("video_{v:02}");
        let frames: Vec<Tensor> = (0..spec.dataset.frames_per_video)
            .map(|_| {
                let data: Vec<f32> = (0..frame_dim).map(|_| rng.gen_range(0.0..1.0)).collect();
                Tensor::from_vec(data, false)
            })
            .collect();

        let samples: Vec<Sample> = clips_by_stride(&frames, clip_len, 1)
            .into_iter()
            .enumerate()
            .map(|(index, clip)| Sample {
                frames: clip,
                anno: None,
                meta: SampleMeta {
                    video_id: video_id.clone(),
                    index,
                },
            })
            .collect();

        train.insert(video_id.clone(), CycleLoader::new(samples.clone())?);
        test.insert(video_id, samples);
    }

    Ok(LoaderSet { train, test })
}
