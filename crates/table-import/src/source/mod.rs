//! Source database access: connection pool, cursors and raw values.
//!
//! Drivers implement these traits; the load pipeline only ever sees a
//! [`SourcePool`] handing out connections that open forward-only cursors.

mod value;

pub use value::{parse_decimal, BlobReader, LobSource, SourceValue};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::WireType;
use crate::error::Result;

/// A column of an open result set, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub wire_type: WireType,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
        }
    }
}

/// One fetched row, fields in result-set order.
pub type SourceRow = Vec<SourceValue>;

/// Pool of source connections.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// Borrow a connection. It is returned to the pool (or closed) on drop.
    async fn connection(&self) -> Result<Box<dyn SourceConnection>>;
}

/// An open source connection.
#[async_trait]
pub trait SourceConnection: Send {
    /// Execute a query and return a forward-only cursor over its rows.
    async fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor>>;
}

/// Forward-only cursor over a result set. Closed on drop.
#[async_trait]
pub trait RowCursor: Send {
    /// Columns of the result set, in position order.
    fn columns(&self) -> &[ResultColumn];

    /// Fetch the next row, `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<SourceRow>>;
}
