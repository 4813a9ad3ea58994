//! Error types for Centinela

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Duplicate key '{key}' in registry '{registry}'")]
    DuplicateKey { registry: String, key: String },

    #[error("Unknown key '{key}' in registry '{registry}'")]
    UnknownKey { registry: String, key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No weight configured for loss '{0}'")]
    MissingLossWeight(String),

    #[error("Missing model role '{0}'")]
    MissingRole(String),

    #[error("Unsupported model container: {0}")]
    UnsupportedModel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
