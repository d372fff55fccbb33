//! Target value types written to the store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::schema::TargetKind;

/// A converted field value, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetValue {
    /// No value (the target column is optional).
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    /// Second precision.
    Datetime(DateTime<Utc>),
    /// Microsecond precision.
    Timestamp(DateTime<Utc>),
    Text(String),
    Bytes(Vec<u8>),
}

impl TargetValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TargetValue::Null)
    }

    /// Kind of the value, `None` for nulls.
    pub fn kind(&self) -> Option<TargetKind> {
        Some(match self {
            TargetValue::Null => return None,
            TargetValue::Bool(_) => TargetKind::Bool,
            TargetValue::Int32(_) => TargetKind::Int32,
            TargetValue::Uint32(_) => TargetKind::Uint32,
            TargetValue::Int64(_) => TargetKind::Int64,
            TargetValue::Uint64(_) => TargetKind::Uint64,
            TargetValue::Float(_) => TargetKind::Float,
            TargetValue::Double(_) => TargetKind::Double,
            TargetValue::Decimal(_) => TargetKind::Decimal,
            TargetValue::Date(_) => TargetKind::Date,
            TargetValue::Datetime(_) => TargetKind::Datetime,
            TargetValue::Timestamp(_) => TargetKind::Timestamp,
            TargetValue::Text(_) => TargetKind::Text,
            TargetValue::Bytes(_) => TargetKind::Bytes,
        })
    }
}

impl From<i64> for TargetValue {
    fn from(v: i64) -> Self {
        TargetValue::Int64(v)
    }
}

impl From<String> for TargetValue {
    fn from(v: String) -> Self {
        TargetValue::Text(v)
    }
}

impl From<bool> for TargetValue {
    fn from(v: bool) -> Self {
        TargetValue::Bool(v)
    }
}

/// One converted row in target field order.
pub type TargetRow = Vec<TargetValue>;

/// A batch of rows for one target table.
#[derive(Debug, Clone)]
pub struct TargetBatch {
    /// Absolute table path in the store.
    pub path: String,

    /// Field names, shared by every batch of the table.
    pub columns: Arc<[String]>,

    pub rows: Vec<TargetRow>,
}

impl TargetBatch {
    pub fn new(path: impl Into<String>, columns: Arc<[String]>, rows: Vec<TargetRow>) -> Self {
        Self {
            path: path.into(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
