//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;
use tracing::info;

use crate::target::RetryConfig;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_bytes = sys.total_memory();
        let total_memory_gb = total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_bytes,
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Load worker pool.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Batching and write behavior against the target store.
    #[serde(default)]
    pub target: TargetLoadConfig,

    /// Retry policy for batch writes.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Seconds between progress log lines (default: 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_interval_secs: Option<u64>,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.workers = self.workers.with_auto_tuning(&resources);
        self.target = self.target.with_auto_tuning(&resources);
        self
    }

    pub fn get_progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.unwrap_or(10))
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Number of tables loaded in parallel. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

impl WorkersConfig {
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // cores - 2, at least 2 and at most 32
        if self.pool_size.is_none() {
            self.pool_size = Some(resources.cpu_cores.saturating_sub(2).clamp(2, 32));
        }
        info!("Auto-tuned workers: pool_size={}", self.get_pool_size());
        self
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size.unwrap_or(4)
    }
}

/// Target-side load configuration.
/// Performance fields use Option<T> to distinguish between "not set"
/// (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetLoadConfig {
    /// Rows per main-table upsert batch. Auto-tuned based on RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_rows: Option<usize>,

    /// Rows per auxiliary blob-table batch. Auto-tuned based on RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blob_rows: Option<usize>,

    /// Outstanding writes per table before submission blocks.
    /// Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inflight_batches: Option<usize>,

    /// Copy table data at all (default: true). When false only the
    /// surrounding stages run.
    #[serde(default = "default_true")]
    pub load_data: bool,
}

impl Default for TargetLoadConfig {
    fn default() -> Self {
        Self {
            max_batch_rows: None,
            max_blob_rows: None,
            max_inflight_batches: None,
            load_data: true,
        }
    }
}

impl TargetLoadConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        let ram_gb = resources.total_memory_gb;
        let cores = resources.cpu_cores;

        // Main batches: 500 rows per 8GB of RAM, 500-5000
        if self.max_batch_rows.is_none() {
            let rows = ((ram_gb / 8.0) as usize * 500).clamp(500, 5_000);
            self.max_batch_rows = Some(rows);
        }

        // Blob rows carry whole LOB payloads, keep them small
        if self.max_blob_rows.is_none() {
            let rows = ((ram_gb / 8.0) as usize * 50).clamp(50, 500);
            self.max_blob_rows = Some(rows);
        }

        if self.max_inflight_batches.is_none() {
            self.max_inflight_batches = Some((cores / 2).clamp(2, 16));
        }

        info!(
            "Auto-tuned target: max_batch_rows={}, max_blob_rows={}, max_inflight_batches={}",
            self.get_max_batch_rows(),
            self.get_max_blob_rows(),
            self.get_max_inflight_batches(),
        );

        self
    }

    pub fn get_max_batch_rows(&self) -> usize {
        self.max_batch_rows.unwrap_or(1_000)
    }

    pub fn get_max_blob_rows(&self) -> usize {
        self.max_blob_rows.unwrap_or(200)
    }

    pub fn get_max_inflight_batches(&self) -> usize {
        self.max_inflight_batches.unwrap_or(4)
    }
}

/// Retry settings for batch writes, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts after the first failure (default: 5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Delay before the first retry (default: 100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,

    /// Upper bound for any single delay (default: 10000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    /// Delay growth per attempt (default: 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

impl RetrySettings {
    /// Whether any retry field was set in the config file.
    pub fn is_configured(&self) -> bool {
        self.max_retries.is_some()
            || self.initial_delay_ms.is_some()
            || self.max_delay_ms.is_some()
            || self.backoff_multiplier.is_some()
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            jitter_factor: defaults.jitter_factor,
        }
    }
}

fn default_true() -> bool {
    true
}
