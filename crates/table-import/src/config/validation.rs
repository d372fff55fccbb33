//! Configuration validation.

use super::Config;
use crate::error::{ImportError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Knobs are only checked if explicitly set
    if let Some(0) = config.workers.pool_size {
        return Err(ImportError::Config(
            "workers.pool_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.target.max_batch_rows {
        return Err(ImportError::Config(
            "target.max_batch_rows must be at least 1".into(),
        ));
    }
    if let Some(0) = config.target.max_blob_rows {
        return Err(ImportError::Config(
            "target.max_blob_rows must be at least 1".into(),
        ));
    }
    if let Some(0) = config.target.max_inflight_batches {
        return Err(ImportError::Config(
            "target.max_inflight_batches must be at least 1".into(),
        ));
    }
    if let Some(0) = config.progress_interval_secs {
        return Err(ImportError::Config(
            "progress_interval_secs must be at least 1".into(),
        ));
    }

    if let Some(m) = config.retry.backoff_multiplier {
        if !(m >= 1.0 && m.is_finite()) {
            return Err(ImportError::Config(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                m
            )));
        }
    }
    let retry = config.retry.to_retry_config();
    if retry.initial_delay > retry.max_delay {
        return Err(ImportError::Config(format!(
            "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
            retry.initial_delay.as_millis(),
            retry.max_delay.as_millis()
        )));
    }

    Ok(())
}
