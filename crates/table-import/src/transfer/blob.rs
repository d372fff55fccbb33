//! Externalization of large objects into auxiliary tables.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing::debug;

use super::counter::RowCounter;
use crate::convert::ConversionMode;
use crate::core::schema::{BLOB_ID_FIELD, BLOB_VALUE_FIELD};
use crate::core::{TargetRow, TargetValue};
use crate::error::{ImportError, Result};
use crate::source::{BlobReader, SourceValue};
use crate::target::UpsertExecutor;

/// Blob id sequence owned by one worker.
///
/// Worker `i` of a pool of `P` hands out `i, i + P, i + 2P, ...`, so ids are
/// unique across the pool without any coordination.
#[derive(Debug)]
pub struct BlobIdAllocator {
    next: i64,
    stride: i64,
}

impl BlobIdAllocator {
    pub fn new(offset: usize, stride: usize) -> Self {
        Self {
            next: offset as i64,
            stride: stride.max(1) as i64,
        }
    }

    /// One allocator per worker of a pool of `pool_size`.
    pub fn for_pool(pool_size: usize) -> Vec<Self> {
        (0..pool_size).map(|i| Self::new(i, pool_size)).collect()
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += self.stride;
        id
    }
}

/// Buffers blob rows per auxiliary table and submits them in batches.
pub struct BlobSaver<'a> {
    ids: &'a mut BlobIdAllocator,
    max_rows: usize,
    columns: Arc<[String]>,
    pending: BTreeMap<String, Vec<TargetRow>>,
    counter: Arc<RowCounter>,
}

impl<'a> BlobSaver<'a> {
    pub fn new(ids: &'a mut BlobIdAllocator, max_rows: usize, counter: Arc<RowCounter>) -> Self {
        Self {
            ids,
            max_rows: max_rows.max(1),
            columns: vec![BLOB_ID_FIELD.to_string(), BLOB_VALUE_FIELD.to_string()].into(),
            pending: BTreeMap::new(),
            counter,
        }
    }

    /// Read the whole object, queue it for `path` and return its id.
    pub async fn save(
        &mut self,
        executor: &mut UpsertExecutor,
        value: &SourceValue,
        mode: ConversionMode,
        path: &str,
    ) -> Result<i64> {
        let data = {
            let mut reader = open_stream(value, mode).await?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data).await?;
            data
        };

        let id = self.ids.next_id();
        let rows = self.pending.entry(path.to_string()).or_default();
        rows.push(vec![TargetValue::Int64(id), TargetValue::Bytes(data)]);

        if rows.len() >= self.max_rows {
            let rows = std::mem::take(rows);
            debug!("{}: flushing {} blob rows", path, rows.len());
            executor
                .start(path, self.columns.clone(), rows, self.counter.clone())
                .await?;
        }
        Ok(id)
    }

    /// Submit every pending blob row.
    pub async fn flush(&mut self, executor: &mut UpsertExecutor) -> Result<()> {
        for (path, rows) in std::mem::take(&mut self.pending) {
            if rows.is_empty() {
                continue;
            }
            executor
                .start(&path, self.columns.clone(), rows, self.counter.clone())
                .await?;
        }
        Ok(())
    }

    /// Rows queued and not yet submitted.
    pub fn pending_rows(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

async fn open_stream(value: &SourceValue, mode: ConversionMode) -> Result<BlobReader> {
    match (mode, value) {
        (ConversionMode::BlobObject | ConversionMode::BlobStream, SourceValue::Lob(lob)) => {
            lob.open().await
        }
        (ConversionMode::BlobStream, SourceValue::Bytes(bytes)) => {
            Ok(Box::new(Cursor::new(bytes.clone())))
        }
        (ConversionMode::BlobStream, SourceValue::Text(text)) => {
            Ok(Box::new(Cursor::new(text.clone().into_bytes())))
        }
        (mode, other) => Err(ImportError::value(format!(
            "{} cannot read {} as a large object",
            mode,
            other.to_text().unwrap_or_default()
        ))),
    }
}
