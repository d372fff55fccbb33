//! Conversion mode resolution.
//!
//! A mode is picked once per column per table from the target column type
//! and the source wire type, then applied to every row of the scan.

use std::fmt;

use crate::core::{TargetKind, TargetType, WireType};
use crate::error::{ImportError, Result};

/// How one source field becomes one target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionMode {
    Int32,
    Uint32,
    Int64,
    Uint64,
    Decimal,
    Float,
    Double,
    Bool,
    /// Numeric source read as a boolean (non-zero is true).
    IntToBool,
    /// Text source read as a boolean by its first character.
    StrToBool,
    Date,
    Datetime,
    Timestamp,
    TimestampToDate,
    /// Epoch milliseconds.
    TimestampToInt64,
    /// Epoch milliseconds.
    TimestampToUint64,
    /// `YYYYMMDD`.
    DateToInt32,
    DateToUint32,
    DateToInt64,
    DateToUint64,
    /// `YYYY/MM/DD`.
    DateToText,
    Text,
    Binary,
    /// Large object read as a binary stream, stored in an auxiliary table.
    BlobStream,
    /// Large object read through a LOB locator, stored in an auxiliary table.
    BlobObject,
}

impl ConversionMode {
    /// Mode for a scalar column, `None` when the pair has no conversion.
    ///
    /// Blob modes are never returned; they come from source metadata.
    pub fn resolve(target: TargetType, source: WireType) -> Option<Self> {
        use ConversionMode as M;

        let mode = match target.kind {
            TargetKind::Decimal => M::Decimal,
            TargetKind::Bool => match source {
                WireType::SmallInt
                | WireType::Integer
                | WireType::BigInt
                | WireType::Decimal
                | WireType::Numeric
                | WireType::Float
                | WireType::Double => M::IntToBool,
                WireType::Char | WireType::NChar | WireType::VarChar | WireType::NVarChar => {
                    M::StrToBool
                }
                _ => M::Bool,
            },
            TargetKind::Date => match source {
                WireType::Timestamp => M::TimestampToDate,
                _ => M::Date,
            },
            TargetKind::Datetime => M::Datetime,
            TargetKind::Timestamp => M::Timestamp,
            TargetKind::Float => M::Float,
            TargetKind::Double => M::Double,
            TargetKind::Int32 => match source {
                WireType::Date => M::DateToInt32,
                _ => M::Int32,
            },
            TargetKind::Uint32 => match source {
                WireType::Date => M::DateToUint32,
                _ => M::Uint32,
            },
            TargetKind::Int64 => match source {
                WireType::Date => M::DateToInt64,
                WireType::Timestamp => M::TimestampToInt64,
                _ => M::Int64,
            },
            TargetKind::Uint64 => match source {
                WireType::Date => M::DateToUint64,
                WireType::Timestamp => M::TimestampToUint64,
                _ => M::Uint64,
            },
            TargetKind::Text => match source {
                WireType::Date => M::DateToText,
                _ => M::Text,
            },
            TargetKind::Bytes => M::Binary,
            TargetKind::Int8
            | TargetKind::Uint8
            | TargetKind::Int16
            | TargetKind::Uint16
            | TargetKind::Interval
            | TargetKind::Json
            | TargetKind::Uuid => return None,
        };
        Some(mode)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, ConversionMode::BlobStream | ConversionMode::BlobObject)
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resolve the mode of a target column or fail the table.
pub fn resolve_mode(column: &str, target: TargetType, source: WireType) -> Result<ConversionMode> {
    ConversionMode::resolve(target, source)
        .ok_or_else(|| ImportError::resolution(column, target, source))
}
