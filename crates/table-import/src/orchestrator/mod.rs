//! Load phase: runs one [`LoadTask`] per table on a fixed worker pool.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::TableJob;
use crate::error::Result;
use crate::source::SourcePool;
use crate::target::{RetryPolicy, TargetStore};
use crate::transfer::{
    BlobIdAllocator, LoadContext, LoadOutcome, LoadSettings, LoadTask, ProgressCounter,
};

/// Result of a load phase.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Tables submitted to the pool.
    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,
    /// Tables never started because the phase was cancelled.
    pub tables_abandoned: usize,
    pub rows_copied: u64,
    pub rows_failed: u64,
    pub blobs_copied: u64,
    pub rows_per_second: f64,
    pub failed_tables: Vec<String>,
    pub outcomes: Vec<LoadOutcome>,
}

impl LoadSummary {
    fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            tables_total: 0,
            tables_success: 0,
            tables_failed: 0,
            tables_abandoned: 0,
            rows_copied: 0,
            rows_failed: 0,
            blobs_copied: 0,
            rows_per_second: 0.0,
            failed_tables: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Fixed-size pool running the data load of every table.
pub struct LoadPhase {
    source: Arc<dyn SourcePool>,
    target: Arc<dyn TargetStore>,
    settings: LoadSettings,
    retry: Option<Arc<dyn RetryPolicy>>,
    pool_size: usize,
    progress_interval: Duration,
    load_data: bool,
}

impl LoadPhase {
    pub fn new(config: &Config, source: Arc<dyn SourcePool>, target: Arc<dyn TargetStore>) -> Self {
        Self {
            source,
            target,
            settings: LoadSettings::from_config(&config.target),
            retry: config
                .retry
                .is_configured()
                .then(|| Arc::new(config.retry.to_retry_config()) as Arc<dyn RetryPolicy>),
            pool_size: config.workers.get_pool_size().max(1),
            progress_interval: config.get_progress_interval(),
            load_data: config.target.load_data,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Load every table not already marked failed.
    ///
    /// Tables whose load fails, or that were never started because `cancel`
    /// fired, get their `failure` flag set.
    pub async fn run(&self, tables: &mut [TableJob], cancel: CancellationToken) -> LoadSummary {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut summary = LoadSummary::new(run_id, started_at);

        if !self.load_data {
            info!("Data load disabled, skipping load phase");
            return summary;
        }

        let pending: Vec<usize> = (0..tables.len()).filter(|&i| !tables[i].failure).collect();
        if pending.is_empty() {
            info!("No valid tables to be loaded, nothing to do.");
            return summary;
        }

        info!(
            "{}: loading {} tables with {} workers",
            summary.run_id,
            pending.len(),
            self.pool_size
        );

        let progress = Arc::new(ProgressCounter::new());
        let stop_reporter = CancellationToken::new();
        let reporter = progress.spawn_reporter(self.progress_interval, stop_reporter.clone());

        let mut ctx = LoadContext::new(
            self.source.clone(),
            self.target.clone(),
            self.settings,
            progress.clone(),
        );
        if let Some(retry) = &self.retry {
            ctx = ctx.with_retry(retry.clone());
        }

        let (queue_tx, queue_rx) = async_channel::unbounded::<(usize, Arc<TableJob>)>();
        for &idx in &pending {
            // the queue is unbounded and the receiver is alive
            let _ = queue_tx.try_send((idx, Arc::new(tables[idx].clone())));
        }
        queue_tx.close();

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        for ids in BlobIdAllocator::for_pool(self.pool_size) {
            workers.spawn(worker(
                ids,
                queue_rx.clone(),
                done_tx.clone(),
                ctx.clone(),
                cancel.clone(),
            ));
        }
        drop(done_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("load worker panicked: {}", e);
            }
        }

        let mut outcomes: Vec<Option<LoadOutcome>> = vec![None; tables.len()];
        while let Ok((idx, outcome)) = done_rx.try_recv() {
            outcomes[idx] = Some(outcome);
        }

        let mut abandoned = Vec::new();
        while let Ok((idx, _)) = queue_rx.try_recv() {
            abandoned.push(idx);
        }
        if !abandoned.is_empty() {
            warn!(
                "Load phase cancelled, {} table tasks abandoned",
                abandoned.len()
            );
        }

        for &idx in &pending {
            let table = &mut tables[idx];
            let outcome = if abandoned.contains(&idx) {
                summary.tables_abandoned += 1;
                LoadOutcome::lost(table.full_name(), "cancelled before start")
            } else {
                outcomes[idx]
                    .take()
                    .unwrap_or_else(|| LoadOutcome::lost(table.full_name(), "load worker failed"))
            };

            if outcome.success {
                summary.tables_success += 1;
            } else {
                table.failure = true;
                summary.failed_tables.push(outcome.table.clone());
            }
            summary.rows_copied += outcome.rows_copied;
            summary.rows_failed += outcome.rows_failed;
            summary.outcomes.push(outcome);
        }
        summary.tables_total = pending.len();
        summary.tables_failed = summary.tables_total - summary.tables_success;

        info!(
            "Table data load completed {} of {} tasks.",
            summary.tables_success, summary.tables_total
        );

        stop_reporter.cancel();
        if let Err(e) = reporter.await {
            warn!("progress reporter ended abnormally: {}", e);
        }
        progress.log_totals();

        summary.blobs_copied = progress.snapshot().blobs_ok;
        summary.rows_per_second = progress.rows_per_second();
        summary.completed_at = Utc::now();
        summary.duration_seconds = start.elapsed().as_secs_f64();
        summary
    }
}

/// Pull tables off the queue until it is empty or `cancel` fires.
///
/// Each outcome is reported as soon as its table is done. A panicking task
/// fails its own table only.
async fn worker(
    mut ids: BlobIdAllocator,
    queue: async_channel::Receiver<(usize, Arc<TableJob>)>,
    done: mpsc::UnboundedSender<(usize, LoadOutcome)>,
    ctx: LoadContext,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Ok((idx, job)) = queue.recv().await else {
            break;
        };
        let mut task = LoadTask::new(&job, &ctx, &mut ids);
        let outcome = match AssertUnwindSafe(task.run()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("{}: load task panicked", job.full_name());
                LoadOutcome::lost(job.full_name(), "load task panicked")
            }
        };
        // the receiver outlives every worker
        let _ = done.send((idx, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        BlobKind, SourceColumn, SourceMetadata, TargetField, TargetKind, TargetSchema, TargetType,
        TargetValue, WireType,
    };
    use crate::memory::{InjectedFailure, MemoryLob, MemorySource, MemoryTarget};
    use crate::source::{ResultColumn, SourceValue};
    use std::collections::HashSet;

    fn config(pool_size: usize) -> Config {
        Config::from_yaml(&format!(
            "workers:\n  pool_size: {}\ntarget:\n  max_batch_rows: 2\n  max_blob_rows: 2\n  max_inflight_batches: 2\n",
            pool_size
        ))
        .unwrap()
    }

    fn numbers_job(name: &str) -> TableJob {
        TableJob::new(
            "dbo",
            name,
            TargetSchema::new(
                format!("dbo/{}", name),
                vec![TargetField::new("n", TargetType::required(TargetKind::Int64))],
            ),
        )
        .with_metadata(SourceMetadata::new(
            vec![SourceColumn::new("n", WireType::Integer)],
            format!("SELECT * FROM dbo.{}", name),
        ))
    }

    fn with_numbers(source: MemorySource, name: &str, values: Vec<SourceValue>) -> MemorySource {
        source.with_table(
            format!("SELECT * FROM dbo.{}", name),
            vec![ResultColumn::new("n", WireType::Integer)],
            values.into_iter().map(|v| vec![v]).collect(),
        )
    }

    #[tokio::test]
    async fn test_failure_isolated_to_one_table() {
        let source = MemorySource::new();
        let source = with_numbers(source, "a", (0..5).map(SourceValue::Int).collect());
        let source = with_numbers(
            source,
            "b",
            vec![SourceValue::Int(1), SourceValue::Text("not a number".into())],
        );
        let source = with_numbers(source, "c", (0..3).map(SourceValue::Int).collect());
        let target = Arc::new(MemoryTarget::new("/db"));
        let phase = LoadPhase::new(&config(2), Arc::new(source), target.clone());

        let mut tables = vec![numbers_job("a"), numbers_job("b"), numbers_job("c")];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_total, 3);
        assert_eq!(summary.tables_success, 2);
        assert_eq!(summary.tables_failed, 1);
        assert_eq!(summary.failed_tables, vec!["dbo.b".to_string()]);
        assert!(!tables[0].failure);
        assert!(tables[1].failure);
        assert!(!tables[2].failure);
        assert_eq!(target.rows("/db/dbo/a").await.len(), 5);
        assert_eq!(target.rows("/db/dbo/c").await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_tables_not_resubmitted() {
        let source = with_numbers(MemorySource::new(), "a", vec![SourceValue::Int(1)]);
        let target = Arc::new(MemoryTarget::new("/db"));
        let phase = LoadPhase::new(&config(2), Arc::new(source), target.clone());

        let mut failed = numbers_job("a");
        failed.failure = true;
        let mut tables = vec![failed];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_total, 0);
        assert!(summary.outcomes.is_empty());
        assert!(target.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_data_disabled() {
        let source = with_numbers(MemorySource::new(), "a", vec![SourceValue::Int(1)]);
        let target = Arc::new(MemoryTarget::new("/db"));
        let mut config = config(1);
        config.target.load_data = false;
        let phase = LoadPhase::new(&config, Arc::new(source), target.clone());

        let mut tables = vec![numbers_job("a")];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_total, 0);
        assert!(!tables[0].failure);
        assert!(target.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_abandons_all() {
        let source = with_numbers(MemorySource::new(), "a", vec![SourceValue::Int(1)]);
        let source = with_numbers(source, "b", vec![SourceValue::Int(2)]);
        let target = Arc::new(MemoryTarget::new("/db"));
        let phase = LoadPhase::new(&config(2), Arc::new(source), target.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut tables = vec![numbers_job("a"), numbers_job("b")];
        let summary = phase.run(&mut tables, cancel).await;

        assert_eq!(summary.tables_abandoned, 2);
        assert_eq!(summary.tables_success, 0);
        assert!(tables.iter().all(|t| t.failure));
        assert!(target.submissions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_run_finishes_running_table() {
        let source = with_numbers(MemorySource::new(), "a", (0..3).map(SourceValue::Int).collect());
        let source = with_numbers(source, "b", vec![SourceValue::Int(1)]);
        let source = with_numbers(source, "c", vec![SourceValue::Int(2)]);
        let target =
            Arc::new(MemoryTarget::new("/db").with_write_delay(Duration::from_millis(100)));
        let phase = LoadPhase::new(&config(1), Arc::new(source), target.clone());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut tables = vec![numbers_job("a"), numbers_job("b"), numbers_job("c")];
        let summary = phase.run(&mut tables, cancel).await;

        assert_eq!(summary.tables_success, 1);
        assert_eq!(summary.tables_abandoned, 2);
        assert_eq!(summary.rows_copied, 3);
        assert!(!tables[0].failure);
        assert!(tables[1].failure);
        assert!(tables[2].failure);
        assert_eq!(target.rows("/db/dbo/a").await.len(), 3);
        assert!(target.rows("/db/dbo/b").await.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_table_keeps_sibling_outcomes() {
        let source = with_numbers(MemorySource::new(), "a", (0..4).map(SourceValue::Int).collect());
        let source = with_numbers(source, "b", vec![SourceValue::Int(1)])
            .with_read_panic("SELECT * FROM dbo.b");
        let source = with_numbers(source, "c", (0..2).map(SourceValue::Int).collect());
        let source = Arc::new(source);
        let target = Arc::new(MemoryTarget::new("/db"));
        let phase = LoadPhase::new(&config(1), source.clone(), target.clone());

        let mut tables = vec![numbers_job("a"), numbers_job("b"), numbers_job("c")];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_success, 2);
        assert_eq!(summary.failed_tables, vec!["dbo.b".to_string()]);
        assert_eq!(summary.rows_copied, 6);
        assert_eq!(summary.tables_abandoned, 0);
        let b = &summary.outcomes[1];
        assert!(b.error.as_deref().unwrap_or_default().contains("panicked"));
        assert!(!tables[0].failure);
        assert!(tables[1].failure);
        assert!(!tables[2].failure);
        assert_eq!(source.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_write_retries_then_succeeds() {
        let source = with_numbers(MemorySource::new(), "a", (0..4).map(SourceValue::Int).collect());
        let target = Arc::new(
            MemoryTarget::new("/db").with_failure("/db/dbo/a", InjectedFailure::Transient(2)),
        );
        let phase = LoadPhase::new(&config(1), Arc::new(source), target.clone());

        let mut tables = vec![numbers_job("a")];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_success, 1);
        assert_eq!(summary.rows_copied, 4);
        assert_eq!(target.rows("/db/dbo/a").await.len(), 4);
        assert!(target.attempts() >= 4);
    }

    #[tokio::test]
    async fn test_configured_retry_overrides_store_policy() {
        let source = with_numbers(MemorySource::new(), "a", vec![SourceValue::Int(1)]);
        let target = Arc::new(
            MemoryTarget::new("/db").with_failure("/db/dbo/a", InjectedFailure::Transient(1)),
        );
        let config = Config::from_yaml("workers:\n  pool_size: 1\nretry:\n  max_retries: 0\n")
            .unwrap();
        let phase = LoadPhase::new(&config, Arc::new(source), target.clone());

        let mut tables = vec![numbers_job("a")];
        let summary = phase.run(&mut tables, CancellationToken::new()).await;

        assert_eq!(summary.tables_failed, 1);
        assert_eq!(target.attempts(), 1);
        assert!(tables[0].failure);
    }

    #[tokio::test]
    async fn test_blob_ids_unique_across_workers() {
        let mut source = MemorySource::new();
        let mut tables = Vec::new();
        for name in ["d0", "d1", "d2", "d3"] {
            let sql = format!("SELECT * FROM dbo.{}", name);
            source = source.with_table(
                sql.clone(),
                vec![ResultColumn::new("doc", WireType::Blob)],
                (0..5)
                    .map(|i| {
                        let lob = MemoryLob::new(format!("{}:{}", name, i), vec![i as u8]);
                        vec![SourceValue::Lob(Arc::new(lob))]
                    })
                    .collect(),
            );
            tables.push(
                TableJob::new(
                    "dbo",
                    name,
                    TargetSchema::new(
                        format!("dbo/{}", name),
                        vec![TargetField::new("doc", TargetType::optional(TargetKind::Int64))],
                    ),
                )
                .with_metadata(SourceMetadata::new(
                    vec![SourceColumn::new("doc", WireType::Blob).with_blob_kind(BlobKind::Object)],
                    sql,
                ))
                .with_blob_target("doc", TargetSchema::blob_table(format!("dbo/{}_doc", name))),
            );
        }
        let target = Arc::new(MemoryTarget::new("/db"));
        let phase = LoadPhase::new(&config(3), Arc::new(source), target.clone());

        let summary = phase.run(&mut tables, CancellationToken::new()).await;
        assert_eq!(summary.tables_success, 4, "{:?}", summary.failed_tables);
        assert_eq!(summary.blobs_copied, 20);

        let mut ids = HashSet::new();
        for name in ["d0", "d1", "d2", "d3"] {
            for row in target.rows(&format!("/db/dbo/{}_doc", name)).await {
                match &row[0] {
                    TargetValue::Int64(id) => assert!(ids.insert(*id), "duplicate id {}", id),
                    other => panic!("unexpected id {:?}", other),
                }
            }
        }
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_summary_json() {
        let mut summary = LoadSummary::new("run-1".into(), Utc::now());
        summary.failed_tables.push("dbo.b".into());
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"run-1\""));
        assert!(json.contains("dbo.b"));
    }
}
