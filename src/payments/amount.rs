//! Major → minor currency unit conversion.
//!
//! Amounts arrive in major units (`19.99`) and the gateway expects integer minor
//! units (`1999`). Conversion goes through `Decimal` so two-decimal values are exact,
//! and anything that is not a whole number of minor units is rejected.

use crate::error::{BridgeError, BridgeResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// `Decimal` holds at most this many significant digits; the parser rounds beyond it.
const MAX_SIGNIFICANT_DIGITS: usize = 28;

/// Parses a JSON number or numeric string as an exact decimal.
///
/// Numbers keep their literal digits, so `19.99` stays `19.99` instead of its
/// nearest binary float. Input the parser would have to round is rejected up front.
pub fn parse_major_amount(value: &Value) -> BridgeResult<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid("amount must be a number")),
    };

    check_precision(&text)?;

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid(format!("amount '{}' is not a valid decimal", text)))
}

fn check_precision(text: &str) -> BridgeResult<()> {
    let (mantissa, scientific) = match text.find(['e', 'E']) {
        Some(at) => (&text[..at], true),
        None => (text, false),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let fraction = fraction.trim_end_matches('0');

    if !scientific && fraction.len() > 2 {
        return Err(invalid(format!(
            "amount {} has more than two decimal places",
            text
        )));
    }

    let whole = whole.trim_start_matches(['+', '-']).trim_start_matches('0');
    let significant = if whole.is_empty() {
        fraction.trim_start_matches('0').len()
    } else {
        whole.len() + fraction.len()
    };
    if significant > MAX_SIGNIFICANT_DIGITS {
        return Err(invalid("amount has too many digits"));
    }
    Ok(())
}

/// Converts a major-unit amount into integer minor units (×100).
///
/// Fails on zero or negative amounts, on more than two decimal places, and on values
/// that do not fit an `i64`.
pub fn to_minor_units(amount: Decimal) -> BridgeResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(invalid("amount must be greater than zero"));
    }

    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| invalid("amount is too large"))?;

    if !scaled.fract().is_zero() {
        return Err(invalid(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }

    scaled
        .trunc()
        .to_i64()
        .ok_or_else(|| invalid("amount is too large"))
}

fn invalid(message: impl Into<String>) -> BridgeError {
    BridgeError::validation(message, vec!["amount".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minor(value: Value) -> BridgeResult<i64> {
        to_minor_units(parse_major_amount(&value)?)
    }

    #[test]
    fn test_two_decimal_amounts_are_exact() {
        assert_eq!(minor(json!(19.99)).unwrap(), 1999);
        assert_eq!(minor(json!(0.1)).unwrap(), 10);
        assert_eq!(minor(json!(1.15)).unwrap(), 115);
        assert_eq!(minor(json!(100)).unwrap(), 10000);
        assert_eq!(minor(json!("250.50")).unwrap(), 25050);
    }

    #[test]
    fn test_extra_precision_rejected() {
        let err = minor(json!(19.999)).unwrap_err();
        match err {
            BridgeError::Validation { fields, message } => {
                assert_eq!(fields, vec!["amount".to_string()]);
                assert!(message.contains("two decimal places"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(minor(json!("0.001")).is_err());
    }

    #[test]
    fn test_non_positive_rejected() {
        assert!(minor(json!(0)).is_err());
        assert!(minor(json!(-5)).is_err());
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert!(minor(json!("ten")).is_err());
        assert!(minor(json!(null)).is_err());
        assert!(minor(json!(true)).is_err());
    }

    #[test]
    fn test_digits_beyond_decimal_precision_rejected() {
        let err = minor(json!("19.99000000000000000000000000001")).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(minor(json!("1.999000000000000000000000000001e1")).is_err());
        assert_eq!(minor(json!("19.9900")).unwrap(), 1999);
        assert_eq!(minor(json!("1.999e1")).unwrap(), 1999);
    }

    #[test]
    fn test_number_literal_keeps_its_digits() {
        let value: Value = serde_json::from_str("19.990000000000000001").unwrap();
        assert!(minor(value).is_err());

        let value: Value = serde_json::from_str("19.99").unwrap();
        assert_eq!(minor(value).unwrap(), 1999);
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(minor(json!("79228162514264337593543950335")).is_err());
    }
}
