use std::{cmp::Ordering, fmt, str::FromStr};

use rust_decimal::Decimal;

use crate::EngineError;

/// Exact monetary value.
///
/// Use this type for **all** monetary values in the engine (balances, opening
/// balances, transfer amounts). It wraps a [`Decimal`], so parsing, storage
/// and arithmetic never go through binary floating point.
///
/// The scale given by the caller is kept (`"30.00"` stays `30.00`), while
/// comparisons are numeric (`30.00 == 30`).
///
/// # Examples
///
/// ```rust
/// use engine::Money;
///
/// let amount: Money = "12.34".parse().unwrap();
/// assert_eq!(amount.to_string(), "12.34");
/// assert!(amount.is_positive());
/// ```
///
/// Parsing accepts only plain decimal notation:
///
/// ```rust
/// use engine::Money;
///
/// assert!("10".parse::<Money>().is_ok());
/// assert!("-0.5".parse::<Money>().is_ok());
/// assert!("1e3".parse::<Money>().is_err());
/// assert!("NaN".parse::<Money>().is_err());
/// assert!("1,5".parse::<Money>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default)]
#[repr(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if the value is strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns `true` if the value is strictly lower than zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Exact addition.
    ///
    /// Returns `None` on overflow and when the sum needs more significant
    /// digits than a [`Decimal`] holds, where [`Decimal::checked_add`] would
    /// round instead.
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0
            .checked_add(rhs.0)
            .and_then(|sum| self.exact(rhs, sum))
    }

    /// Exact subtraction, see [`Money::checked_add`].
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0
            .checked_sub(rhs.0)
            .and_then(|diff| self.exact(rhs, diff))
    }

    /// `result` is exact only if it kept the finer scale of both operands;
    /// a rounded result comes back with fewer decimal places.
    fn exact(self, rhs: Money, result: Decimal) -> Option<Money> {
        (result.scale() >= self.0.scale().max(rhs.0.scale())).then_some(Money(result))
    }

    /// Parses a value read back from the store.
    ///
    /// Stored values are written by the engine itself, so a parse failure
    /// means the row was altered outside the engine.
    pub(crate) fn from_stored(raw: &str, label: &str) -> Result<Self, EngineError> {
        raw.parse::<Money>()
            .map_err(|_| EngineError::Corrupted(format!("{label} is not a decimal: {raw:?}")))
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = EngineError;

    /// Parses a decimal string.
    ///
    /// Accepts an optional leading `+`/`-`, ASCII digits and at most one `.`
    /// with digits on both sides of it. Surrounding whitespace is ignored.
    ///
    /// Rejects exponents, thousands separators, `NaN`/`Inf` and values that
    /// do not fit a [`Decimal`] exactly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount(format!("invalid amount: {s:?}"));

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let digits = trimmed
            .strip_prefix('-')
            .or_else(|| trimmed.strip_prefix('+'))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(empty());
        }

        let mut parts = digits.split('.');
        let int_part = parts.next().ok_or_else(invalid)?;
        let frac_part = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || frac_part.is_some_and(|frac| !all_digits(frac)) {
            return Err(invalid());
        }

        let value = Decimal::from_str_exact(trimmed.trim_start_matches('+'))
            .map_err(|_| EngineError::InvalidAmount(format!("amount out of range: {s:?}")))?;
        Ok(Money(value))
    }
}
