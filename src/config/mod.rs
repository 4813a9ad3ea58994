//! Harness configuration: YAML schema, loading, validation

mod schema;
mod validate;

pub use schema::{
    DatasetSpec, HarnessSpec, ModelSpec, OptimSpec, SchedulerSpec, ServiceSpec, SmoothSpec,
    SystemSpec, TrainSpec, ValSpec,
};
pub use validate::validate_spec;

use crate::error::{Error, Result};
use std::path::Path;

/// Load and validate a harness specification from a YAML file
pub fn load_spec(path: impl AsRef<Path>) -> Result<HarnessSpec> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;

    let spec: HarnessSpec = serde_yaml::from_str(&text)
        .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))?;

    validate_spec(&spec)?;
    Ok(spec)
}
