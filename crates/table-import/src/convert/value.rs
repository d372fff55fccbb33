//! Per-field value conversion.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SubsecRound, Utc};

use super::decimal::{decimal_text_path, DecimalType};
use super::mode::ConversionMode;
use crate::core::TargetValue;
use crate::error::{ImportError, Result};
use crate::source::{parse_decimal, SourceValue};

/// Applies a resolved [`ConversionMode`] to a source field.
#[derive(Debug, Clone)]
pub struct ValueConverter {
    decimal: DecimalType,
    text_decimals: bool,
}

impl Default for ValueConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueConverter {
    pub fn new() -> Self {
        Self {
            decimal: DecimalType::DEFAULT,
            text_decimals: decimal_text_path(),
        }
    }

    /// Force decimals to be parsed from the source's text representation.
    pub fn with_text_decimals(mut self, text_decimals: bool) -> Self {
        self.text_decimals = text_decimals;
        self
    }

    /// Convert one field. Nulls become [`TargetValue::Null`] in every mode.
    pub fn convert(&self, value: &SourceValue, mode: ConversionMode) -> Result<TargetValue> {
        use ConversionMode as M;

        if value.is_null() {
            return Ok(TargetValue::Null);
        }

        Ok(match mode {
            M::Int32 => TargetValue::Int32(narrow(value.as_i64()?, "Int32")?),
            M::Uint32 => TargetValue::Uint32(narrow(value.as_i64()?, "Uint32")?),
            M::Int64 => TargetValue::Int64(value.as_i64()?),
            M::Uint64 => TargetValue::Uint64(narrow(value.as_i64()?, "Uint64")?),
            M::Decimal => TargetValue::Decimal(self.decimal(value)?),
            M::Float => TargetValue::Float(value.as_f64()? as f32),
            M::Double => TargetValue::Double(value.as_f64()?),
            M::Bool => TargetValue::Bool(value.as_bool()?),
            M::IntToBool => TargetValue::Bool(value.as_i64()? != 0),
            M::StrToBool => TargetValue::Bool(str_to_bool(value.to_text().as_deref())),
            M::Date => TargetValue::Date(value.as_date()?),
            M::Datetime => TargetValue::Datetime(as_utc(value.as_timestamp()?).trunc_subsecs(0)),
            M::Timestamp => TargetValue::Timestamp(as_utc(value.as_timestamp()?).trunc_subsecs(6)),
            M::TimestampToDate => TargetValue::Date(value.as_timestamp()?.date()),
            M::TimestampToInt64 => {
                TargetValue::Int64(as_utc(value.as_timestamp()?).timestamp_millis())
            }
            M::TimestampToUint64 => TargetValue::Uint64(narrow(
                as_utc(value.as_timestamp()?).timestamp_millis(),
                "Uint64",
            )?),
            M::DateToInt32 => TargetValue::Int32(narrow(date_to_int(value.as_date()?), "Int32")?),
            M::DateToUint32 => {
                TargetValue::Uint32(narrow(date_to_int(value.as_date()?), "Uint32")?)
            }
            M::DateToInt64 => TargetValue::Int64(date_to_int(value.as_date()?)),
            M::DateToUint64 => {
                TargetValue::Uint64(narrow(date_to_int(value.as_date()?), "Uint64")?)
            }
            M::DateToText => TargetValue::Text(date_to_text(value.as_date()?)),
            M::Text => TargetValue::Text(value.to_text().unwrap_or_default()),
            M::Binary => TargetValue::Bytes(value.as_bytes()?),
            M::BlobStream | M::BlobObject => {
                return Err(ImportError::value(format!(
                    "{} values are written through the blob saver",
                    mode
                )))
            }
        })
    }

    fn decimal(&self, value: &SourceValue) -> Result<rust_decimal::Decimal> {
        let raw = if self.text_decimals {
            parse_decimal(&value.to_text().unwrap_or_default())?
        } else {
            value.as_decimal()?
        };
        self.decimal.fit(raw)
    }
}

fn narrow<T: TryFrom<i64>>(v: i64, target: &str) -> Result<T> {
    T::try_from(v).map_err(|_| ImportError::value(format!("{} out of {} range", v, target)))
}

/// Naive source timestamps are taken as UTC.
fn as_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}

/// Text as boolean: empty or null is false, so is a leading `N`, `0`, `F`,
/// `Н` or `Л` (any case). Everything else is true.
pub fn str_to_bool(text: Option<&str>) -> bool {
    let Some(first) = text.and_then(|t| t.trim().chars().next()) else {
        return false;
    };
    !first
        .to_uppercase()
        .any(|c| matches!(c, 'N' | '0' | 'F' | 'Н' | 'Л'))
}

/// `YYYYMMDD` as a number. Years past 9999 give more than eight digits.
pub fn date_to_int(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// `YYYY/MM/DD`.
pub fn date_to_text(date: NaiveDate) -> String {
    format!("{}/{:02}/{:02}", date.year(), date.month(), date.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use ConversionMode as M;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 5).unwrap()
    }

    fn convert(value: SourceValue, mode: ConversionMode) -> Result<TargetValue> {
        ValueConverter::new().convert(&value, mode)
    }

    #[test]
    fn test_str_to_bool() {
        assert!(!str_to_bool(None));
        assert!(!str_to_bool(Some("")));
        assert!(!str_to_bool(Some("   ")));
        assert!(!str_to_bool(Some("no")));
        assert!(!str_to_bool(Some(" N")));
        assert!(!str_to_bool(Some("false")));
        assert!(!str_to_bool(Some("F")));
        assert!(!str_to_bool(Some("0")));
        assert!(!str_to_bool(Some("нет")));
        assert!(!str_to_bool(Some("Ложь")));
        assert!(str_to_bool(Some("yes")));
        assert!(str_to_bool(Some("1")));
        assert!(str_to_bool(Some("true")));
        assert!(str_to_bool(Some("Да")));
    }

    #[test]
    fn test_date_absorption() {
        assert_eq!(date_to_int(date()), 20210305);
        assert_eq!(date_to_text(date()), "2021/03/05");

        assert_eq!(convert(date().into(), M::DateToInt32).unwrap(), TargetValue::Int32(20210305));
        assert_eq!(convert(date().into(), M::DateToUint32).unwrap(), TargetValue::Uint32(20210305));
        assert_eq!(convert(date().into(), M::DateToInt64).unwrap(), TargetValue::Int64(20210305));
        assert_eq!(convert(date().into(), M::DateToUint64).unwrap(), TargetValue::Uint64(20210305));
        assert_eq!(
            convert(date().into(), M::DateToText).unwrap(),
            TargetValue::Text("2021/03/05".into())
        );
    }

    #[test]
    fn test_far_future_date_absorption() {
        let far = NaiveDate::from_ymd_opt(250_000, 1, 1).unwrap();
        assert_eq!(date_to_int(far), 2_500_000_101);

        assert_eq!(convert(far.into(), M::DateToInt64).unwrap(), TargetValue::Int64(2_500_000_101));
        assert_eq!(
            convert(far.into(), M::DateToUint64).unwrap(),
            TargetValue::Uint64(2_500_000_101)
        );
        assert!(matches!(convert(far.into(), M::DateToInt32), Err(ImportError::Value(_))));
        assert_eq!(
            convert(far.into(), M::DateToUint32).unwrap(),
            TargetValue::Uint32(2_500_000_101)
        );

        let bce = NaiveDate::from_ymd_opt(-1, 1, 1).unwrap();
        assert_eq!(convert(bce.into(), M::DateToInt32).unwrap(), TargetValue::Int32(-9_899));
        assert!(matches!(convert(bce.into(), M::DateToUint32), Err(ImportError::Value(_))));
    }

    #[test]
    fn test_null_in_every_mode() {
        for mode in [
            M::Int32, M::Uint32, M::Int64, M::Uint64, M::Decimal, M::Float, M::Double, M::Bool,
            M::IntToBool, M::StrToBool, M::Date, M::Datetime, M::Timestamp, M::TimestampToDate,
            M::TimestampToInt64, M::TimestampToUint64, M::DateToInt32, M::DateToUint32,
            M::DateToInt64, M::DateToUint64, M::DateToText, M::Text, M::Binary, M::BlobStream,
            M::BlobObject,
        ] {
            assert_eq!(convert(SourceValue::Null, mode).unwrap(), TargetValue::Null, "{}", mode);
        }
    }

    #[test]
    fn test_timestamp_modes() {
        let ts = date().and_hms_micro_opt(10, 20, 30, 123_456).unwrap();
        let ts_nanos = date().and_hms_nano_opt(10, 20, 30, 123_456_789).unwrap();

        let TargetValue::Datetime(dt) = convert(ts.into(), M::Datetime).unwrap() else {
            panic!("expected datetime");
        };
        assert_eq!(dt.to_rfc3339(), "2021-03-05T10:20:30+00:00");

        let TargetValue::Timestamp(t) = convert(ts_nanos.into(), M::Timestamp).unwrap() else {
            panic!("expected timestamp");
        };
        assert_eq!(t.timestamp_subsec_micros(), 123_456);
        assert_eq!(t.timestamp_subsec_nanos(), 123_456_000);

        assert_eq!(convert(ts.into(), M::TimestampToDate).unwrap(), TargetValue::Date(date()));
        assert_eq!(
            convert(ts.into(), M::TimestampToInt64).unwrap(),
            TargetValue::Int64(1_614_939_630_123)
        );
        assert_eq!(
            convert(ts.into(), M::TimestampToUint64).unwrap(),
            TargetValue::Uint64(1_614_939_630_123)
        );
    }

    #[test]
    fn test_pre_epoch_timestamp_to_unsigned_fails() {
        let ts = NaiveDate::from_ymd_opt(1960, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(convert(ts.into(), M::TimestampToInt64).is_ok());
        assert!(convert(ts.into(), M::TimestampToUint64).is_err());
    }

    #[test]
    fn test_integer_modes() {
        assert_eq!(convert(SourceValue::Int(7), M::Int32).unwrap(), TargetValue::Int32(7));
        assert_eq!(
            convert(SourceValue::Text("42".into()), M::Int64).unwrap(),
            TargetValue::Int64(42)
        );
        assert!(convert(SourceValue::Int(-1), M::Uint32).is_err());
        assert!(convert(SourceValue::Int(-1), M::Uint64).is_err());
        assert!(convert(SourceValue::Int(i64::MAX), M::Int32).is_err());
        assert!(convert(SourceValue::Text("abc".into()), M::Int32).is_err());
    }

    #[test]
    fn test_bool_modes() {
        assert_eq!(convert(SourceValue::Int(2), M::IntToBool).unwrap(), TargetValue::Bool(true));
        assert_eq!(convert(SourceValue::Int(0), M::IntToBool).unwrap(), TargetValue::Bool(false));
        assert_eq!(
            convert(SourceValue::Text("Нет".into()), M::StrToBool).unwrap(),
            TargetValue::Bool(false)
        );
        assert_eq!(
            convert(SourceValue::Text("".into()), M::StrToBool).unwrap(),
            TargetValue::Bool(false)
        );
        assert_eq!(convert(SourceValue::Bool(true), M::Bool).unwrap(), TargetValue::Bool(true));
    }

    #[test]
    fn test_decimal_native_and_text_paths() {
        let value = SourceValue::Decimal(Decimal::from_str("123.45").unwrap());
        let expected = TargetValue::Decimal(Decimal::from_str("123.450000000").unwrap());

        assert_eq!(ValueConverter::new().convert(&value, M::Decimal).unwrap(), expected);
        assert_eq!(
            ValueConverter::new()
                .with_text_decimals(true)
                .convert(&value, M::Decimal)
                .unwrap(),
            expected
        );
        assert_eq!(
            ValueConverter::new()
                .with_text_decimals(true)
                .convert(&SourceValue::Text(" 123.45 ".into()), M::Decimal)
                .unwrap(),
            expected
        );
        assert!(convert(SourceValue::Text("12x".into()), M::Decimal).is_err());
    }

    #[test]
    fn test_text_and_binary_modes() {
        assert_eq!(
            convert(SourceValue::Int(5), M::Text).unwrap(),
            TargetValue::Text("5".into())
        );
        assert_eq!(
            convert(SourceValue::Bytes(vec![1, 2]), M::Binary).unwrap(),
            TargetValue::Bytes(vec![1, 2])
        );
        assert_eq!(
            convert(SourceValue::Float(1.5), M::Float).unwrap(),
            TargetValue::Float(1.5)
        );
    }

    #[test]
    fn test_blob_modes_rejected_for_present_values() {
        assert!(convert(SourceValue::Bytes(vec![1]), M::BlobStream).is_err());
    }
}
