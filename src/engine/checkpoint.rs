//! Checkpoint records: persisted snapshots of run state
//!
//! A checkpoint captures model weights per role, optimizer state per role,
//! the current step, the best accuracy, and the staged loss values. Routine
//! saves overwrite by step; best saves go to one stable slot so only the
//! single best checkpoint is ever retained there.

use crate::error::{Error, Result};
use crate::nn::Module;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One serialized parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRecord {
    /// Flat parameter data
    pub data: Vec<f32>,
    /// Whether the parameter was accumulating gradients
    pub requires_grad: bool,
}

/// Serialized optimizer state for one role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerRecord {
    /// Learning rate at save time
    pub lr: f32,
}

/// Complete checkpoint record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Configuration name the run was started from
    pub config_name: String,
    /// Run timestamp
    pub timestamp: String,
    /// Model type tag
    pub model_type: String,
    /// Training-loop step at save time
    pub step: u64,
    /// Best accuracy at save time
    pub best_accuracy: f32,
    /// Role → parameter list
    pub models: BTreeMap<String, Vec<ParamRecord>>,
    /// Role → optimizer state
    pub optimizers: BTreeMap<String, OptimizerRecord>,
    /// Staged loss values at save time
    pub losses: BTreeMap<String, f32>,
    /// SHA-256 over the parameter payload
    pub digest: String,
}

/// Derive the checkpoint file path
///
/// Best checkpoints share one stable slot per run; routine checkpoints are
/// keyed by step and overwrite on repeated saves of the same step.
pub fn checkpoint_path(
    dir: &Path,
    config_name: &str,
    timestamp: &str,
    model_type: &str,
    step: u64,
    best: bool,
) -> PathBuf {
    let name = if best {
        format!("cfg#{config_name}@{timestamp}#{model_type}_best.json")
    } else {
        format!("cfg#{config_name}@{timestamp}#{model_type}_step{step}.json")
    };
    dir.join(name)
}

/// Snapshot a module's parameters
pub fn snapshot_module(module: &dyn Module) -> Vec<ParamRecord> {
    module
        .parameters()
        .iter()
        .map(|p| ParamRecord {
            data: p.data().to_vec(),
            requires_grad: p.requires_grad(),
        })
        .collect()
}

/// SHA-256 over every parameter byte, role order fixed by the map
pub fn payload_digest(models: &BTreeMap<String, Vec<ParamRecord>>) -> String {
    let mut hasher = Sha256::new();
    for (role, params) in models {
        hasher.update(role.as_bytes());
        for param in params {
            for value in &param.data {
                hasher.update(value.to_le_bytes());
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Write a checkpoint record, overwriting any file at the target path
pub fn save_checkpoint(record: &CheckpointRecord, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Serialization(format!("checkpoint serialization failed: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Read a checkpoint record and verify the parameter digest
pub fn load_checkpoint(path: &Path) -> Result<CheckpointRecord> {
    let text = std::fs::read_to_string(path)?;
    let record: CheckpointRecord = serde_json::from_str(&text)
        .map_err(|e| Error::Serialization(format!("checkpoint deserialization failed: {e}")))?;

    let expected = payload_digest(&record.models);
    if record.digest != expected {
        return Err(Error::Serialization(format!(
            "checkpoint digest mismatch in {}",
            path.display()
        )));
    }
    Ok(record)
}

/// Restore a module's parameters from a checkpoint entry
pub fn restore_module(module: &mut dyn Module, records: &[ParamRecord]) -> Result<()> {
    let mut params = module.parameters_mut();
    if params.len() != records.len() {
        return Err(Error::Serialization(format!(
            "parameter count mismatch: module has {}, checkpoint has {}",
            params.len(),
            records.len()
        )));
    }

    for (param, record) in params.iter_mut().zip(records) {
        if param.len() != record.data.len() {
            return Err(Error::Serialization(format!(
                "parameter length mismatch: module has {}, checkpoint has {}",
                param.len(),
                record.data.len()
            )));
        }
        *param.data_mut() = ndarray::Array1::from(record.data.clone());
        param.set_requires_grad(record.requires_grad);
    }
    Ok(())
}
