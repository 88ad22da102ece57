//! Allocator configuration.
//!
//! Values come from built-in defaults, optionally overlaid by a JSON file,
//! and finally by command-line flags or `INFERENCE_*` environment variables
//! (handled in the binary).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for the queue, the GPU pool and the simulated executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Number of GPU slots in the pool
    pub gpu_count: usize,

    /// Maximum number of queued requests before admission is refused
    pub queue_max_size: usize,

    /// How long an HTTP caller waits for its result, in seconds
    pub request_timeout_secs: f64,

    /// Lower bound of the simulated execution time, in milliseconds
    pub inference_min_ms: u64,

    /// Upper bound of the simulated execution time, in milliseconds
    pub inference_max_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            gpu_count: 4,
            queue_max_size: 100,
            request_timeout_secs: 30.0,
            inference_min_ms: 100,
            inference_max_ms: 500,
        }
    }
}

impl AllocatorConfig {
    /// Load configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path_ref).map_err(|e| ConfigError::Io {
            path: path_str.clone(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
            path: path_str,
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gpu_count == 0 {
            return Err(ConfigError::Invalid(
                "gpu_count must be at least 1".to_string(),
            ));
        }
        if self.queue_max_size == 0 {
            return Err(ConfigError::Invalid(
                "queue_max_size must be at least 1".to_string(),
            ));
        }
        if !self.request_timeout_secs.is_finite() || self.request_timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "request_timeout_secs must be a positive number, got {}",
                self.request_timeout_secs
            )));
        }
        if self.inference_min_ms > self.inference_max_ms {
            return Err(ConfigError::Invalid(format!(
                "inference_min_ms ({}) must not exceed inference_max_ms ({})",
                self.inference_min_ms, self.inference_max_ms
            )));
        }
        Ok(())
    }

    /// Per-request timeout as a `Duration`. Call `validate` first.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON config {path}: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AllocatorConfig::default();
        assert_eq!(config.gpu_count, 4);
        assert_eq!(config.queue_max_size, 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.inference_min_ms, 100);
        assert_eq!(config.inference_max_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AllocatorConfig =
            serde_json::from_str(r#"{"gpu_count": 2, "request_timeout_secs": 1.5}"#).unwrap();
        assert_eq!(config.gpu_count, 2);
        assert_eq!(config.queue_max_size, 100);
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            AllocatorConfig {
                gpu_count: 0,
                ..Default::default()
            },
            AllocatorConfig {
                queue_max_size: 0,
                ..Default::default()
            },
            AllocatorConfig {
                request_timeout_secs: 0.0,
                ..Default::default()
            },
            AllocatorConfig {
                request_timeout_secs: f64::NAN,
                ..Default::default()
            },
            AllocatorConfig {
                inference_min_ms: 600,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!(
            "inference-allocator-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"gpu_count": 8, "queue_max_size": 16}"#).unwrap();

        let config = AllocatorConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.gpu_count, 8);
        assert_eq!(config.queue_max_size, 16);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = AllocatorConfig::from_file("/nonexistent/allocator.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let path = std::env::temp_dir().join(format!(
            "inference-allocator-bad-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "not json").unwrap();
        let bad = AllocatorConfig::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(bad, Err(ConfigError::ParseJson { .. })));
    }
}
