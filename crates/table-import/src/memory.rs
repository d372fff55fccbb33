//! In-memory source and target implementations.
//!
//! Used to drive load tasks without a database: tables are row vectors keyed
//! by their select statement, the target keeps every written row per path.
//! Failures can be injected on both sides.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Mutex;

use crate::core::{TargetBatch, TargetRow};
use crate::error::{ImportError, Result};
use crate::source::{
    BlobReader, LobSource, ResultColumn, RowCursor, SourceConnection, SourcePool, SourceRow,
};
use crate::target::{RetryConfig, RetryPolicy, TargetStore};

/// Increments a shared gauge while alive.
#[derive(Debug)]
struct Gauge(Arc<AtomicUsize>);

impl Gauge {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for Gauge {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ResultColumn>,
    rows: Vec<SourceRow>,
    fail_after: Option<usize>,
    panic_on_read: bool,
}

/// Source serving fixed tables.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Arc<HashMap<String, MemoryTable>>,
    open_connections: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rows returned for `sql`.
    pub fn with_table(
        mut self,
        sql: impl Into<String>,
        columns: Vec<ResultColumn>,
        rows: Vec<SourceRow>,
    ) -> Self {
        Arc::make_mut(&mut self.tables).insert(
            sql.into(),
            MemoryTable {
                columns,
                rows,
                fail_after: None,
                panic_on_read: false,
            },
        );
        self
    }

    /// Make the cursor of `sql` fail after yielding `rows` rows.
    pub fn with_read_failure(mut self, sql: &str, rows: usize) -> Self {
        if let Some(table) = Arc::make_mut(&mut self.tables).get_mut(sql) {
            table.fail_after = Some(rows);
        }
        self
    }

    /// Make the cursor of `sql` panic on its first fetch.
    pub fn with_read_panic(mut self, sql: &str) -> Self {
        if let Some(table) = Arc::make_mut(&mut self.tables).get_mut(sql) {
            table.panic_on_read = true;
        }
        self
    }

    /// Connections handed out and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourcePool for MemorySource {
    async fn connection(&self) -> Result<Box<dyn SourceConnection>> {
        Ok(Box::new(MemoryConnection {
            tables: self.tables.clone(),
            _open: Gauge::enter(&self.open_connections),
        }))
    }
}

struct MemoryConnection {
    tables: Arc<HashMap<String, MemoryTable>>,
    _open: Gauge,
}

#[async_trait]
impl SourceConnection for MemoryConnection {
    async fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor>> {
        let table = self
            .tables
            .get(sql)
            .ok_or_else(|| ImportError::Source(format!("no such table: {}", sql)))?;
        Ok(Box::new(MemoryCursor {
            columns: table.columns.clone(),
            rows: table.rows.clone().into_iter(),
            fail_after: table.fail_after,
            panic_on_read: table.panic_on_read,
            fetched: 0,
        }))
    }
}

struct MemoryCursor {
    columns: Vec<ResultColumn>,
    rows: std::vec::IntoIter<SourceRow>,
    fail_after: Option<usize>,
    panic_on_read: bool,
    fetched: usize,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<SourceRow>> {
        if self.panic_on_read {
            panic!("driver crashed reading row {}", self.fetched);
        }
        if self.fail_after == Some(self.fetched) {
            return Err(ImportError::Source(format!(
                "connection lost after {} rows",
                self.fetched
            )));
        }
        let row = self.rows.next();
        if row.is_some() {
            self.fetched += 1;
        }
        Ok(row)
    }
}

/// Large object held in memory.
#[derive(Debug)]
pub struct MemoryLob {
    locator: String,
    data: Vec<u8>,
    fail_read: bool,
    open_streams: Arc<AtomicUsize>,
}

impl MemoryLob {
    pub fn new(locator: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            locator: locator.into(),
            data,
            fail_read: false,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Streams of this object fail on first read.
    pub fn failing(mut self) -> Self {
        self.fail_read = true;
        self
    }

    /// Gauge of streams opened and not yet dropped.
    pub fn open_streams(&self) -> Arc<AtomicUsize> {
        self.open_streams.clone()
    }
}

#[async_trait]
impl LobSource for MemoryLob {
    fn locator(&self) -> String {
        self.locator.clone()
    }

    async fn open(&self) -> Result<BlobReader> {
        Ok(Box::new(MemoryLobReader {
            inner: io::Cursor::new(self.data.clone()),
            fail: self.fail_read,
            _open: Gauge::enter(&self.open_streams),
        }))
    }
}

struct MemoryLobReader {
    inner: io::Cursor<Vec<u8>>,
    fail: bool,
    _open: Gauge,
}

impl AsyncRead for MemoryLobReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.fail {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "lob stream closed",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Failure injected for writes to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Fail the next `n` writes with a retryable error.
    Transient(u32),
    /// Fail every write with a non-retryable error.
    Permanent,
    /// Panic inside the write.
    Panic,
}

/// Target store keeping rows in memory.
///
/// Rows are appended in write order. Each successful write is recorded as a
/// `(path, rows)` submission.
#[derive(Debug)]
pub struct MemoryTarget {
    database: String,
    retry: Arc<RetryConfig>,
    write_delay: Option<Duration>,
    tables: Mutex<BTreeMap<String, Vec<TargetRow>>>,
    submissions: Mutex<Vec<(String, usize)>>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
    attempts: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryTarget {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retry: Arc::new(RetryConfig::fixed_delay(3, Duration::from_millis(1))),
            write_delay: None,
            tables: Mutex::new(BTreeMap::new()),
            submissions: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    /// Hold every write for `delay`.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_failure(mut self, path: impl Into<String>, failure: InjectedFailure) -> Self {
        self.failures.get_mut().insert(path.into(), failure);
        self
    }

    /// Rows written to `path`.
    pub async fn rows(&self, path: &str) -> Vec<TargetRow> {
        self.tables.lock().await.get(path).cloned().unwrap_or_default()
    }

    /// Successful writes in order.
    pub async fn submissions(&self) -> Vec<(String, usize)> {
        self.submissions.lock().await.clone()
    }

    /// Write attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent writes seen.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn write(&self, batch: &TargetBatch) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.failures.lock().await.get_mut(&batch.path) {
            match failure {
                InjectedFailure::Transient(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    return Err(ImportError::write(&batch.path, "store overloaded", true));
                }
                InjectedFailure::Transient(_) => {}
                InjectedFailure::Permanent => {
                    return Err(ImportError::write(&batch.path, "schema mismatch", false));
                }
                InjectedFailure::Panic => panic!("store crashed writing {}", batch.path),
            }
        }

        self.tables
            .lock()
            .await
            .entry(batch.path.clone())
            .or_default()
            .extend(batch.rows.iter().cloned());
        self.submissions
            .lock()
            .await
            .push((batch.path.clone(), batch.len()));
        Ok(())
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    fn database(&self) -> &str {
        &self.database
    }

    fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        self.retry.clone()
    }

    async fn upsert(&self, batch: &TargetBatch) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        let result = self.write(batch).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
