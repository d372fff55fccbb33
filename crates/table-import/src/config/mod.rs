//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, used to tag load runs.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
workers:
  pool_size: 6
target:
  max_batch_rows: 500
  max_blob_rows: 20
  max_inflight_batches: 3
  load_data: false
retry:
  max_retries: 2
  initial_delay_ms: 50
progress_interval_secs: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.workers.get_pool_size(), 6);
        assert_eq!(config.target.get_max_batch_rows(), 500);
        assert_eq!(config.target.get_max_blob_rows(), 20);
        assert_eq!(config.target.get_max_inflight_batches(), 3);
        assert!(!config.target.load_data);
        assert_eq!(config.retry.to_retry_config().max_retries, 2);
    }

    #[test]
    fn test_from_yaml_rejects_invalid_values() {
        assert!(Config::from_yaml("target:\n  max_batch_rows: 0\n").is_err());
        assert!(Config::from_yaml("workers: [").is_err());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = Config::from_yaml("workers:\n  pool_size: 2\n").unwrap();
        let b = Config::from_yaml("workers:\n  pool_size: 3\n").unwrap();
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
