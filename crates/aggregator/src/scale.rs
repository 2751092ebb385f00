//! Conversion of smallest-unit token amounts to whole-token decimals.

use crate::AggregateError;
use alloy::primitives::U256;
use rust_decimal::Decimal;

/// Fixed-precision scaling for a token with `decimals` fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenScale {
    decimals: u32,
}

impl TokenScale {
    /// Largest scale `Decimal` can represent.
    pub const MAX_DECIMALS: u32 = 28;

    pub fn new(decimals: u32) -> Result<Self, AggregateError> {
        if decimals > Self::MAX_DECIMALS {
            return Err(AggregateError::UnsupportedDecimals(decimals));
        }
        Ok(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Scale a raw amount to whole tokens.
    ///
    /// The result is exact while all digits fit the 96-bit decimal mantissa.
    /// Beyond that the fractional part is rounded to the scale that still
    /// fits. Only a whole-token part above `Decimal::MAX` is rejected.
    pub fn scale(&self, raw: U256) -> Result<Decimal, AggregateError> {
        let unit = U256::from(10u64).pow(U256::from(self.decimals));
        let (whole, fraction) = (raw / unit, raw % unit);

        let whole = to_decimal(whole, 0).ok_or(AggregateError::AmountOutOfRange(raw))?;
        // fraction < 10^28, which always fits the mantissa
        let fraction =
            to_decimal(fraction, self.decimals).ok_or(AggregateError::AmountOutOfRange(raw))?;

        whole
            .checked_add(fraction)
            .map(|value| value.normalize())
            .ok_or(AggregateError::AmountOutOfRange(raw))
    }
}

fn to_decimal(value: U256, scale: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(u128::try_from(value).ok()?).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}
