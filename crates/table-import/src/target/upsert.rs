//! Asynchronous batch writer with bounded in-flight writes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use super::retry::{with_retry, RetryPolicy};
use super::TargetStore;
use crate::core::{TargetBatch, TargetRow};
use crate::error::{ImportError, Result};
use crate::transfer::RowCounter;

/// Writes batches of one table in the background.
///
/// `start` hands a batch to a spawned write and returns; it only waits while
/// `max_inflight` writes are outstanding. `finish` waits for every write and
/// reports the first failure. Each write is retried under the store's policy.
pub struct UpsertExecutor {
    store: Arc<dyn TargetStore>,
    policy: Arc<dyn RetryPolicy>,
    permits: Arc<Semaphore>,
    inflight: JoinSet<Result<()>>,
    first_error: Option<ImportError>,
    submitted: usize,
}

impl UpsertExecutor {
    pub fn new(store: Arc<dyn TargetStore>, max_inflight: usize) -> Self {
        let policy = store.retry_policy();
        Self {
            store,
            policy,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
            inflight: JoinSet::new(),
            first_error: None,
            submitted: 0,
        }
    }

    /// Retry writes under `policy` instead of the store's own.
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Number of batches handed to the store so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Submit a batch of rows for `path`. Empty batches are ignored.
    ///
    /// Fails without submitting if an earlier write of this executor failed.
    pub async fn start(
        &mut self,
        path: &str,
        columns: Arc<[String]>,
        rows: Vec<TargetRow>,
        counter: Arc<RowCounter>,
    ) -> Result<()> {
        self.reap();
        if let Some(e) = self.first_error.take() {
            return Err(e);
        }
        if rows.is_empty() {
            return Ok(());
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ImportError::Cancelled)?;

        let batch = TargetBatch::new(path, columns, rows);
        let store = self.store.clone();
        let policy = self.policy.clone();
        self.submitted += 1;

        self.inflight.spawn(async move {
            let _permit = permit;
            let rows = batch.len() as u64;
            let store_ref = &store;
            let batch_ref = &batch;
            let write = with_retry(policy.as_ref(), &batch.path, move || {
                store_ref.upsert(batch_ref)
            });
            let result = match AssertUnwindSafe(write).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(ImportError::write(
                    &batch.path,
                    format!("write task panicked: {}", panic_message(panic.as_ref())),
                    false,
                )),
            };

            match &result {
                Ok(()) => {
                    counter.add_success(rows);
                    debug!("{}: wrote {} rows", batch.path, rows);
                }
                Err(e) => {
                    counter.add_failed(rows);
                    error!("{}: {} failed for {} rows: {}", batch.path, counter.name(), rows, e);
                }
            }
            result
        });

        Ok(())
    }

    /// Wait for all outstanding writes. Returns the first write failure.
    pub async fn finish(&mut self) -> Result<()> {
        while let Some(joined) = self.inflight.join_next().await {
            self.record(joined);
        }
        match self.first_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Collect writes that already completed.
    fn reap(&mut self) {
        while let Some(joined) = self.inflight.try_join_next() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: std::result::Result<Result<()>, JoinError>) {
        let err = match joined {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            // panics are caught inside the task, only aborts land here
            Err(_) => ImportError::Cancelled,
        };
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
