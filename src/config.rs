//! Run configuration.
//!
//! A run is described by one JSON document: job parameters, logging and the
//! list of controllers. Loading only checks the document itself;
//! controller-level validation happens in [`crate::registry`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::registry::ControllerSpec;
use crate::telemetry::LogConfig;

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_steps() -> u64 {
    1_000_000
}

/// Job parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,

    /// Base directory of the job's input files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Hard stop, in ticks.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

/// A complete run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub job: JobConfig,

    #[serde(default)]
    pub logging: LogConfig,

    pub tls: Vec<ControllerSpec>,
}

impl RunConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidConfig` if the document does not
    /// parse or fails [`RunConfig::validate`].
    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ConfigurationError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigurationError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Checks document-level consistency.
    ///
    /// # Errors
    /// Rejects an empty controller list, empty or duplicate ids, empty
    /// policy names and a zero step limit.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.job.max_steps == 0 {
            return Err(ConfigurationError::config("job.max_steps must be positive"));
        }
        if self.tls.is_empty() {
            return Err(ConfigurationError::config("no traffic lights configured"));
        }

        let mut seen = BTreeSet::new();
        for spec in &self.tls {
            if spec.id.trim().is_empty() {
                return Err(ConfigurationError::config("traffic light id is empty"));
            }
            if spec.controller.trim().is_empty() {
                return Err(ConfigurationError::config(format!(
                    "traffic light '{}' has no controller",
                    spec.id
                )));
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigurationError::config(format!(
                    "traffic light '{}' is configured twice",
                    spec.id
                )));
            }
        }
        Ok(())
    }

    /// Resolves `path` against the job directory.
    #[must_use]
    pub fn job_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.job.dir.join(path)
        }
    }
}
