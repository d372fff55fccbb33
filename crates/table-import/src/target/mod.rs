//! Target store access and batch writing.

mod retry;
mod upsert;

pub use retry::{with_retry, RetryConfig, RetryPolicy};
pub use upsert::UpsertExecutor;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::TargetBatch;
use crate::error::Result;

/// Remote tabular store receiving the converted rows.
///
/// Tables are addressed by path: the store's database root followed by the
/// table's relative name. Tables must exist before the load phase runs.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Database root of the store, e.g. `/local/import`.
    fn database(&self) -> &str;

    /// Policy applied to failed writes.
    fn retry_policy(&self) -> Arc<dyn RetryPolicy>;

    /// Upsert a batch of rows by key. Safe to repeat.
    async fn upsert(&self, batch: &TargetBatch) -> Result<()>;

    /// Absolute path of a table given its relative name.
    fn table_path(&self, full_name: &str) -> String {
        format!("{}/{}", self.database(), full_name)
    }
}
