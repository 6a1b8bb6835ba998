//! Specializer configuration.
//!
//! Every field has a default, so a config file only needs to mention what it
//! changes:
//!
//! ```yaml
//! force_specialization: false
//! max_clones: 3
//! min_function_size: 100
//! specialize_on_address: false
//! specialize_literal_constants: true
//! max_iterations: 2
//! ```

use crate::analysis::{Cost, InlineParams};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecializerConfig {
    /// Specialize even when the score is not positive and regardless of the
    /// function size threshold.
    #[serde(default)]
    pub force_specialization: bool,

    /// Clone budget per candidate function.
    #[serde(default = "default_max_clones")]
    pub max_clones: u32,

    /// Functions with fewer instructions than this are left to the inliner.
    #[serde(default = "default_min_function_size")]
    pub min_function_size: Cost,

    /// Allow specializing on addresses of mutable globals.
    #[serde(default)]
    pub specialize_on_address: bool,

    /// Allow specializing on integer, float and struct arguments, not just
    /// pointers.
    #[serde(default)]
    pub specialize_literal_constants: bool,

    /// Upper bound on specializer runs per pipeline invocation.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: Cost,

    /// Added to the inline threshold when evaluating promoted indirect calls.
    #[serde(default = "default_indirect_call_threshold")]
    pub indirect_call_threshold: Cost,
}

const fn default_max_clones() -> u32 {
    3
}

const fn default_min_function_size() -> Cost {
    100
}

const fn default_max_iterations() -> u32 {
    1
}

const fn default_inline_threshold() -> Cost {
    225
}

const fn default_indirect_call_threshold() -> Cost {
    100
}

impl Default for SpecializerConfig {
    fn default() -> Self {
        Self {
            force_specialization: false,
            max_clones: default_max_clones(),
            min_function_size: default_min_function_size(),
            specialize_on_address: false,
            specialize_literal_constants: false,
            max_iterations: default_max_iterations(),
            inline_threshold: default_inline_threshold(),
            indirect_call_threshold: default_indirect_call_threshold(),
        }
    }
}

impl SpecializerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clones == 0 {
            return Err(ConfigError::Invalid("max_clones must be at least 1".into()));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.min_function_size < 0 {
            return Err(ConfigError::Invalid(
                "min_function_size must not be negative".into(),
            ));
        }
        if self.inline_threshold < 0 || self.indirect_call_threshold < 0 {
            return Err(ConfigError::Invalid(
                "inline thresholds must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn inline_params(&self) -> InlineParams {
        InlineParams {
            default_threshold: self.inline_threshold,
            indirect_call_threshold: self.indirect_call_threshold,
        }
    }
}
