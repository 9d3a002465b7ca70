use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default per-query execution timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default wait for a cancelled execution to release its resources.
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 1_000;
/// Default F1 below which a dimension is reported as wrong.
pub const DEFAULT_THRESHOLD: f64 = 0.5;
/// Default parse cache capacity (entries).
pub const DEFAULT_CACHE_CAPACITY: usize = 1_024;

/// Errors loading or validating an [`EvaluationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration is not valid JSON for this schema.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Knobs of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Per-query execution timeout in milliseconds.
    pub timeout_ms: u64,
    /// How long a timed-out execution may take to release its resources.
    pub cancel_grace_ms: u64,
    /// F1 below which a dimension is reported as wrong, in `(0, 1]`.
    pub threshold: f64,
    /// Worker threads for batch evaluation.
    pub workers: usize,
    /// Parse cache capacity; 0 disables caching.
    pub cache_capacity: usize,
    /// Use a task's recorded graph result instead of running its reference query.
    pub use_recorded_reference_results: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            threshold: DEFAULT_THRESHOLD,
            workers: default_workers(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            use_recorded_reference_results: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl EvaluationConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn load_from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_json(&json)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "threshold",
                reason: format!("{} is not in (0, 1]", self.threshold),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least one".to_string(),
            });
        }
        Ok(())
    }

    /// Execution timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Grace period after cancelling a timed-out execution.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}
