//! Raw field values as fetched from a source cursor.
//!
//! Drivers hand over the value in its natural representation; the accessors
//! below perform the lenient coercions a JDBC-style `getXxx()` call would
//! (e.g. reading a numeric column as text or a text column as an integer).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::io::AsyncRead;

use crate::error::{ImportError, Result};

/// Readable byte stream of a large object. Released on drop.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Locator of a large object held by the source.
#[async_trait]
pub trait LobSource: Send + Sync + fmt::Debug {
    /// Textual form of the locator, as a driver's `getString()` would return it.
    fn locator(&self) -> String;

    /// Open the object's content stream.
    async fn open(&self) -> Result<BlobReader>;
}

/// A single field of a source row.
#[derive(Debug, Clone)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Naive timestamp, no zone attached.
    Timestamp(NaiveDateTime),
    Lob(Arc<dyn LobSource>),
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl SourceValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }

    fn kind_name(&self) -> &'static str {
        match self {
            SourceValue::Null => "null",
            SourceValue::Bool(_) => "bool",
            SourceValue::Int(_) => "integer",
            SourceValue::Float(_) => "float",
            SourceValue::Decimal(_) => "decimal",
            SourceValue::Text(_) => "text",
            SourceValue::Bytes(_) => "bytes",
            SourceValue::Date(_) => "date",
            SourceValue::Time(_) => "time",
            SourceValue::Timestamp(_) => "timestamp",
            SourceValue::Lob(_) => "lob",
        }
    }

    fn mismatch(&self, wanted: &str) -> ImportError {
        ImportError::value(format!("cannot read {} value as {}", self.kind_name(), wanted))
    }

    /// Text representation, `None` for nulls. Binary values render as hex.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            SourceValue::Null => return None,
            SourceValue::Bool(b) => b.to_string(),
            SourceValue::Int(n) => n.to_string(),
            SourceValue::Float(f) => f.to_string(),
            SourceValue::Decimal(d) => d.to_string(),
            SourceValue::Text(s) => s.clone(),
            SourceValue::Bytes(b) => b.iter().map(|byte| format!("{:02x}", byte)).collect(),
            SourceValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SourceValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            SourceValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SourceValue::Lob(lob) => lob.locator(),
        })
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            SourceValue::Bool(b) => Ok(*b),
            SourceValue::Int(n) => Ok(*n != 0),
            SourceValue::Float(f) => Ok(*f != 0.0),
            SourceValue::Decimal(d) => Ok(!d.is_zero()),
            SourceValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "y" | "yes" => Ok(true),
                "0" | "false" | "f" | "n" | "no" => Ok(false),
                other => Err(ImportError::value(format!("not a boolean: {}", other))),
            },
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            SourceValue::Bool(b) => Ok(i64::from(*b)),
            SourceValue::Int(n) => Ok(*n),
            SourceValue::Float(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(ImportError::value(format!("float out of integer range: {}", f)))
                }
            }
            SourceValue::Decimal(d) => d
                .trunc()
                .to_i64()
                .ok_or_else(|| ImportError::value(format!("decimal out of integer range: {}", d))),
            SourceValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().or_else(|_| {
                    Decimal::from_str(s)
                        .ok()
                        .and_then(|d| d.trunc().to_i64())
                        .ok_or_else(|| ImportError::value(format!("not an integer: {}", s)))
                })
            }
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            SourceValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            SourceValue::Int(n) => Ok(*n as f64),
            SourceValue::Float(f) => Ok(*f),
            SourceValue::Decimal(d) => d
                .to_f64()
                .ok_or_else(|| ImportError::value(format!("decimal not representable: {}", d))),
            SourceValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ImportError::value(format!("not a number: {}", s))),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal> {
        match self {
            SourceValue::Int(n) => Ok(Decimal::from(*n)),
            SourceValue::Float(f) => Decimal::try_from(*f)
                .map_err(|e| ImportError::value(format!("float {} as decimal: {}", f, e))),
            SourceValue::Decimal(d) => Ok(*d),
            SourceValue::Text(s) => parse_decimal(s),
            other => Err(other.mismatch("decimal")),
        }
    }

    pub fn as_date(&self) -> Result<NaiveDate> {
        match self {
            SourceValue::Date(d) => Ok(*d),
            SourceValue::Timestamp(ts) => Ok(ts.date()),
            SourceValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| ImportError::value(format!("not a date: {}", s))),
            other => Err(other.mismatch("date")),
        }
    }

    pub fn as_timestamp(&self) -> Result<NaiveDateTime> {
        match self {
            SourceValue::Timestamp(ts) => Ok(*ts),
            SourceValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SourceValue::Text(s) => {
                let s = s.trim();
                TIMESTAMP_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .ok_or_else(|| ImportError::value(format!("not a timestamp: {}", s)))
            }
            other => Err(other.mismatch("timestamp")),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        match self {
            SourceValue::Bytes(b) => Ok(b.clone()),
            SourceValue::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(other.mismatch("bytes")),
        }
    }
}

/// Parse the exact decimal text a driver reports, plain or scientific.
pub fn parse_decimal(text: &str) -> Result<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ImportError::value(format!("not a decimal: {}", text)))
}

impl From<i64> for SourceValue {
    fn from(v: i64) -> Self {
        SourceValue::Int(v)
    }
}

impl From<&str> for SourceValue {
    fn from(v: &str) -> Self {
        SourceValue::Text(v.to_string())
    }
}

impl From<NaiveDate> for SourceValue {
    fn from(v: NaiveDate) -> Self {
        SourceValue::Date(v)
    }
}

impl From<NaiveDateTime> for SourceValue {
    fn from(v: NaiveDateTime) -> Self {
        SourceValue::Timestamp(v)
    }
}

impl<T: Into<SourceValue>> From<Option<T>> for SourceValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SourceValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text() {
        assert_eq!(SourceValue::Null.to_text(), None);
        assert_eq!(SourceValue::Int(42).to_text().as_deref(), Some("42"));
        assert_eq!(
            SourceValue::Bytes(vec![0x0a, 0xff]).to_text().as_deref(),
            Some("0aff")
        );
        let date = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        assert_eq!(SourceValue::Date(date).to_text().as_deref(), Some("2021-03-05"));
        let ts = date.and_hms_opt(10, 20, 30).unwrap();
        assert_eq!(
            SourceValue::Timestamp(ts).to_text().as_deref(),
            Some("2021-03-05 10:20:30")
        );
    }

    #[test]
    fn test_integer_coercions() {
        assert_eq!(SourceValue::Text(" 17 ".into()).as_i64().unwrap(), 17);
        assert_eq!(SourceValue::Text("17.9".into()).as_i64().unwrap(), 17);
        assert_eq!(SourceValue::Float(-2.7).as_i64().unwrap(), -2);
        assert_eq!(SourceValue::Bool(true).as_i64().unwrap(), 1);
        assert!(SourceValue::Text("abc".into()).as_i64().is_err());
        assert!(SourceValue::Float(f64::NAN).as_i64().is_err());
    }

    #[test]
    fn test_bool_coercions() {
        assert!(SourceValue::Int(5).as_bool().unwrap());
        assert!(!SourceValue::Int(0).as_bool().unwrap());
        assert!(SourceValue::Text("TRUE".into()).as_bool().unwrap());
        assert!(SourceValue::Text("maybe".into()).as_bool().is_err());
    }

    #[test]
    fn test_temporal_coercions() {
        let ts = SourceValue::Text("2021-03-05 10:20:30.5".into())
            .as_timestamp()
            .unwrap();
        assert_eq!(ts.to_string(), "2021-03-05 10:20:30.500");

        let date = SourceValue::Timestamp(ts).as_date().unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 5).unwrap());
        assert!(SourceValue::Int(1).as_date().is_err());
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("12.50").unwrap().to_string(), "12.50");
        assert_eq!(parse_decimal("1e3").unwrap(), Decimal::from(1000));
        assert!(parse_decimal("x").is_err());
    }

    #[test]
    fn test_option_conversion() {
        let v: SourceValue = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: SourceValue = Some(3i64).into();
        assert_eq!(v.as_i64().unwrap(), 3);
    }
}
