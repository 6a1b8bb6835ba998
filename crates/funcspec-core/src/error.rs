//! Error types for the fallible library surfaces.
//!
//! The specialization pass itself never fails: every rejected candidate is
//! simply skipped. These errors cover loading modules and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while looking up or (de)serializing IR.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown global '{0}'")]
    UnknownGlobal(String),

    #[error("malformed module JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading a [`SpecializerConfig`](crate::config::SpecializerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
