//! Target decimal type and construction checks.

use std::sync::OnceLock;

use rust_decimal::Decimal;
use tracing::warn;

use crate::error::{ImportError, Result};

/// Fixed-point target decimal, `Decimal(precision, scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalType {
    pub precision: u32,
    pub scale: u32,
}

impl DecimalType {
    /// Decimal(22, 9), the type every decimal target column uses.
    pub const DEFAULT: DecimalType = DecimalType {
        precision: 22,
        scale: 9,
    };

    /// Bring `value` to this type's scale, failing when its integer part
    /// does not fit. Checked after rounding, which may carry into the
    /// integer digits.
    pub fn fit(&self, value: Decimal) -> Result<Decimal> {
        let int_digits = self.precision.saturating_sub(self.scale);
        let limit = Decimal::from_i128_with_scale(10i128.pow(int_digits), 0);
        let mut scaled = value;
        scaled.rescale(self.scale);
        if scaled.trunc().abs() >= limit {
            return Err(ImportError::value(format!(
                "decimal {} exceeds Decimal({},{})",
                value, self.precision, self.scale
            )));
        }
        Ok(scaled)
    }
}

static TEXT_PATH: OnceLock<bool> = OnceLock::new();

/// Whether decimals must be built from the source's exact text.
///
/// Decided once per process by round-tripping `1` through [`DecimalType::fit`].
pub fn decimal_text_path() -> bool {
    *TEXT_PATH.get_or_init(|| {
        let lossy = match DecimalType::DEFAULT.fit(Decimal::ONE) {
            Ok(v) => v != Decimal::ONE,
            Err(_) => true,
        };
        if lossy {
            warn!("Native decimal construction is lossy, decimals will be parsed from text");
        }
        lossy
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_fit_rescales() {
        let v = DecimalType::DEFAULT.fit(Decimal::from_str("12.5").unwrap()).unwrap();
        assert_eq!(v.scale(), 9);
        assert_eq!(v.to_string(), "12.500000000");
    }

    #[test]
    fn test_fit_rounds_extra_fraction() {
        let v = DecimalType::DEFAULT
            .fit(Decimal::from_str("0.1234567891").unwrap())
            .unwrap();
        assert_eq!(v.scale(), 9);
    }

    #[test]
    fn test_fit_rejects_overflow() {
        let max = Decimal::from_str("9999999999999.999999999").unwrap();
        assert!(DecimalType::DEFAULT.fit(max).is_ok());
        let too_big = Decimal::from_str("10000000000000").unwrap();
        assert!(DecimalType::DEFAULT.fit(too_big).is_err());
        assert!(DecimalType::DEFAULT.fit(-too_big).is_err());
    }

    #[test]
    fn test_fit_rejects_rounding_into_integer_part() {
        let carry = Decimal::from_str("9999999999999.9999999996").unwrap();
        assert!(DecimalType::DEFAULT.fit(carry).is_err());
        assert!(DecimalType::DEFAULT.fit(-carry).is_err());

        let below = Decimal::from_str("9999999999999.9999999994").unwrap();
        let v = DecimalType::DEFAULT.fit(below).unwrap();
        assert_eq!(v.to_string(), "9999999999999.999999999");
    }

    #[test]
    fn test_native_path_is_exact() {
        assert!(!decimal_text_path());
    }
}
