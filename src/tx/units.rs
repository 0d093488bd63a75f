//! Human-readable amount parsing
//!
//! CLI amounts are validated before they are scaled to integer base units.

use crate::error::{BundlerError, BundlerResult};

use ethers::types::U256;
use ethers::utils::parse_units;

/// Decimals of the native currency (wei per ether)
pub const ETHER_DECIMALS: u32 = 18;

/// Parse a non-negative decimal string into base units with `decimals` precision
pub fn parse_amount(input: &str, decimals: u32) -> BundlerResult<U256> {
    let trimmed = input.trim();
    let invalid = |reason: &str| BundlerError::InvalidAmount {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("amount is empty"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("amount has no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("expected a non-negative decimal number"));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid(&format!(
            "more than {} fractional digits",
            decimals
        )));
    }

    let normalized = match (whole.is_empty(), fraction.is_empty()) {
        (true, _) => format!("0.{}", fraction),
        (false, true) => whole.to_string(),
        (false, false) => format!("{}.{}", whole, fraction),
    };

    parse_units(normalized, decimals)
        .map(Into::into)
        .map_err(|e| invalid(&e.to_string()))
}

/// Parse an amount and reject it if it exceeds `max` (same unit)
pub fn parse_bounded_amount(input: &str, max: &str, decimals: u32) -> BundlerResult<U256> {
    let value = parse_amount(input, decimals)?;
    let limit = parse_amount(max, decimals)?;

    if value > limit {
        return Err(BundlerError::InvalidAmount {
            input: input.to_string(),
            reason: format!("exceeds configured maximum of {}", max),
        });
    }
    Ok(value)
}

/// Parse a native-currency amount into wei
pub fn parse_ether(input: &str) -> BundlerResult<U256> {
    parse_amount(input, ETHER_DECIMALS)
}

/// Convert whole gwei into wei
pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_amount_uses_decimals() {
        let value = parse_amount("1000", 18).unwrap();
        assert_eq!(value, U256::from(1000) * U256::exp10(18));

        let value = parse_amount("1000", 9).unwrap();
        assert_eq!(value, U256::from(1000) * U256::exp10(9));
    }

    #[test]
    fn test_fractional_ether() {
        assert_eq!(parse_ether("0.005").unwrap(), U256::from(5) * U256::exp10(15));
        assert_eq!(parse_ether(".5").unwrap(), U256::from(5) * U256::exp10(17));
        assert_eq!(parse_ether("2.").unwrap(), U256::from(2) * U256::exp10(18));
    }

    #[test]
    fn test_zero_is_allowed() {
        assert_eq!(parse_ether("0").unwrap(), U256::zero());
    }

    #[test]
    fn test_rejects_malformed_amounts() {
        for input in ["", " ", ".", "-1", "1e18", "1,5", "abc", "0x10", "1.2.3"] {
            let err = parse_ether(input).unwrap_err();
            assert!(
                matches!(err, BundlerError::InvalidAmount { .. }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_excess_precision() {
        let err = parse_amount("1.0001", 3).unwrap_err();
        assert!(err.to_string().contains("fractional digits"));
    }

    #[test]
    fn test_bounded_amount() {
        assert!(parse_bounded_amount("10", "100", 18).is_ok());
        assert!(parse_bounded_amount("100", "100", 18).is_ok());
        assert!(parse_bounded_amount("100.1", "100", 18).is_err());
    }

    #[test]
    fn test_gwei() {
        assert_eq!(gwei(24), U256::from(24_000_000_000u64));
    }
}
