//! Per-table load: scan the source table, convert rows and write batches.
//!
//! A [`LoadTask`] owns everything it touches for the duration of one table:
//! a source connection and cursor, an [`UpsertExecutor`] and a [`BlobSaver`]
//! drawing ids from its worker's [`BlobIdAllocator`]. Only the
//! [`ProgressCounter`] is shared with other tasks.

mod blob;
mod counter;

pub use blob::{BlobIdAllocator, BlobSaver};
pub use counter::{CounterKind, ProgressCounter, ProgressSnapshot, RowCounter};

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::TargetLoadConfig;
use crate::convert::{build_bindings, synth_key, ColumnBinding, ValueConverter};
use crate::core::{TableJob, TargetRow, TargetValue};
use crate::error::{ImportError, Result};
use crate::source::{ResultColumn, SourcePool, SourceRow};
use crate::target::{RetryPolicy, TargetStore, UpsertExecutor};

/// Batching knobs of a load task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSettings {
    pub max_batch_rows: usize,
    pub max_blob_rows: usize,
    pub max_inflight_batches: usize,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self::from_config(&TargetLoadConfig::default())
    }
}

impl LoadSettings {
    pub fn from_config(config: &TargetLoadConfig) -> Self {
        Self {
            max_batch_rows: config.get_max_batch_rows().max(1),
            max_blob_rows: config.get_max_blob_rows().max(1),
            max_inflight_batches: config.get_max_inflight_batches().max(1),
        }
    }
}

/// Collaborators shared by every task of a load phase.
#[derive(Clone)]
pub struct LoadContext {
    pub source: Arc<dyn SourcePool>,
    pub target: Arc<dyn TargetStore>,
    pub settings: LoadSettings,
    pub progress: Arc<ProgressCounter>,
    /// Write retry policy, the target's own unless overridden.
    pub retry: Arc<dyn RetryPolicy>,
}

impl LoadContext {
    pub fn new(
        source: Arc<dyn SourcePool>,
        target: Arc<dyn TargetStore>,
        settings: LoadSettings,
        progress: Arc<ProgressCounter>,
    ) -> Self {
        let retry = target.retry_policy();
        Self {
            source,
            target,
            settings,
            progress,
            retry,
        }
    }

    pub fn with_retry(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }
}

/// Lifecycle of a load task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// Not attempted: metadata unresolved or the table already failed.
    Skipped,
    Running,
    Completed,
    Failed,
}

/// Result of one table's load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    /// Qualified source table name.
    pub table: String,
    pub status: TaskStatus,
    pub success: bool,
    /// Rows written, partial for failed tables.
    pub rows_copied: u64,
    pub rows_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadOutcome {
    fn skipped(table: String, reason: &str) -> Self {
        Self {
            table,
            status: TaskStatus::Skipped,
            success: false,
            rows_copied: 0,
            rows_failed: 0,
            error: Some(reason.to_string()),
        }
    }

    fn completed(table: String, counter: &RowCounter) -> Self {
        Self {
            table,
            status: TaskStatus::Completed,
            success: true,
            rows_copied: counter.success(),
            rows_failed: counter.failed(),
            error: None,
        }
    }

    fn failed(table: String, counter: &RowCounter, error: &ImportError) -> Self {
        Self {
            table,
            status: TaskStatus::Failed,
            success: false,
            rows_copied: counter.success(),
            rows_failed: counter.failed(),
            error: Some(error.chain_message()),
        }
    }

    /// Outcome of a table whose task never reported back.
    pub fn lost(table: String, reason: impl Into<String>) -> Self {
        Self {
            table,
            status: TaskStatus::Failed,
            success: false,
            rows_copied: 0,
            rows_failed: 0,
            error: Some(reason.into()),
        }
    }
}

/// Copy of one table.
pub struct LoadTask<'a> {
    job: &'a TableJob,
    ctx: &'a LoadContext,
    ids: &'a mut BlobIdAllocator,
    converter: ValueConverter,
    status: TaskStatus,
}

impl<'a> LoadTask<'a> {
    pub fn new(job: &'a TableJob, ctx: &'a LoadContext, ids: &'a mut BlobIdAllocator) -> Self {
        Self {
            job,
            ctx,
            ids,
            converter: ValueConverter::new(),
            status: TaskStatus::Pending,
        }
    }

    pub fn with_converter(mut self, converter: ValueConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Load the table. Every failure is reported in the outcome; the task
    /// keeps the final status.
    pub async fn run(&mut self) -> LoadOutcome {
        let table_name = self.job.full_name();
        if self.status != TaskStatus::Pending {
            return LoadOutcome::lost(table_name, "load task already ran");
        }

        if !self.job.is_valid() {
            warn!("{}: skipping, source metadata is not resolved", table_name);
            self.status = TaskStatus::Skipped;
            return LoadOutcome::skipped(table_name, "source metadata is not resolved");
        }
        if self.job.failure {
            warn!("{}: skipping, table failed in an earlier stage", table_name);
            self.status = TaskStatus::Skipped;
            return LoadOutcome::skipped(table_name, "table failed in an earlier stage");
        }

        self.status = TaskStatus::Running;
        let start = Instant::now();
        info!(
            "{}: loading into {} (batch: {}, blob batch: {})",
            table_name,
            self.job.target.full_name,
            self.ctx.settings.max_batch_rows,
            self.ctx.settings.max_blob_rows,
        );

        let counter = Arc::new(RowCounter::new(
            format!("upsert to {}", self.job.target.full_name),
            CounterKind::Rows,
            self.ctx.progress.clone(),
        ));
        let blob_counter = Arc::new(RowCounter::new(
            format!("blob upsert for {}", self.job.target.full_name),
            CounterKind::Blobs,
            self.ctx.progress.clone(),
        ));
        let mut executor = UpsertExecutor::new(
            self.ctx.target.clone(),
            self.ctx.settings.max_inflight_batches,
        )
        .with_policy(self.ctx.retry.clone());

        match self.copy_data(&mut executor, &counter, &blob_counter).await {
            Ok(()) => {
                self.status = TaskStatus::Completed;
                info!(
                    "{}: copied {} rows ({} blobs) in {:.1}s",
                    table_name,
                    counter.success(),
                    blob_counter.success(),
                    start.elapsed().as_secs_f64()
                );
                LoadOutcome::completed(table_name, &counter)
            }
            Err(e) => {
                // let outstanding writes settle so the counters are final
                if let Err(write_err) = executor.finish().await {
                    debug!("{}: pending write also failed: {}", table_name, write_err);
                }
                self.status = TaskStatus::Failed;
                error!(
                    "{}: load failed after {} rows: {}",
                    table_name,
                    counter.success(),
                    e.chain_message()
                );
                LoadOutcome::failed(table_name, &counter, &e)
            }
        }
    }

    async fn copy_data(
        &mut self,
        executor: &mut UpsertExecutor,
        counter: &Arc<RowCounter>,
        blob_counter: &Arc<RowCounter>,
    ) -> Result<()> {
        let job = self.job;
        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| ImportError::Metadata(job.full_name()))?;
        let settings = self.ctx.settings;
        let target = &self.ctx.target;

        let mut conn = self.ctx.source.connection().await?;
        let mut cursor = conn.query(&metadata.select_sql).await?;
        let columns = cursor.columns().to_vec();

        let bindings = build_bindings(job, &columns, target.database())?;
        let main_path = target.table_path(&job.target.full_name);
        let field_names: Arc<[String]> = job.target.field_names().into();
        debug!("{}: {} bound columns", job.full_name(), bindings.len());

        let scan = RowScan {
            job,
            columns: &columns,
            bindings: &bindings,
            converter: &self.converter,
        };
        let mut blobs =
            BlobSaver::new(&mut *self.ids, settings.max_blob_rows, blob_counter.clone());

        let mut batch: Vec<TargetRow> = Vec::with_capacity(settings.max_batch_rows);
        while let Some(row) = cursor.next_row().await? {
            batch.push(scan.convert_row(&row, &mut blobs, executor).await?);
            if batch.len() >= settings.max_batch_rows {
                let full =
                    std::mem::replace(&mut batch, Vec::with_capacity(settings.max_batch_rows));
                executor
                    .start(&main_path, field_names.clone(), full, counter.clone())
                    .await?;
            }
        }

        // blob rows must land before the rows referencing them
        blobs.flush(executor).await?;
        if !batch.is_empty() {
            executor
                .start(&main_path, field_names.clone(), batch, counter.clone())
                .await?;
        }

        drop(cursor);
        drop(conn);
        executor.finish().await
    }
}

/// Immutable per-scan state: result columns and bindings.
struct RowScan<'s> {
    job: &'s TableJob,
    columns: &'s [ResultColumn],
    bindings: &'s [ColumnBinding],
    converter: &'s ValueConverter,
}

impl RowScan<'_> {
    async fn convert_row(
        &self,
        row: &SourceRow,
        blobs: &mut BlobSaver<'_>,
        executor: &mut UpsertExecutor,
    ) -> Result<TargetRow> {
        let fields = &self.job.target.fields;
        let mut values: TargetRow = vec![TargetValue::Null; fields.len()];

        for binding in self.bindings {
            let column = &fields[binding.target_pos].name;
            let raw = row.get(binding.source_pos - 1).ok_or_else(|| {
                ImportError::Source(format!(
                    "row has no field at position {}",
                    binding.source_pos
                ))
            })?;

            let converted = if binding.mode.is_blob() && !raw.is_null() {
                let path = binding.blob_path.as_deref().unwrap_or_default();
                blobs
                    .save(executor, raw, binding.mode, path)
                    .await
                    .map(TargetValue::Int64)
            } else {
                self.converter.convert(raw, binding.mode)
            };

            values[binding.target_pos] = converted.map_err(|e| match e {
                ImportError::Write { .. } | ImportError::Cancelled => e,
                other => ImportError::conversion(column.as_str(), other),
            })?;
        }

        if let Some(pos) = self.job.target.synth_key_pos() {
            values[pos] = TargetValue::Bytes(synth_key(self.columns, row));
        }
        Ok(values)
    }
}
