use std::{
    fmt,
    ops::{Add, AddAssign, Sub},
};

/// Signed money amount represented as **integer minor units** (cents).
///
/// Ledger rows store plain `i64` minor units; this type is used where amounts
/// are combined or rendered for humans (reports, exports) so that formatting
/// and overflow handling stay in one place.
///
/// # Examples
///
/// ```rust
/// use engine::Money;
///
/// let amount = Money::new(12_34);
/// assert_eq!(amount.minor(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked multiplication by a quantity (returns `None` on overflow).
    #[must_use]
    pub fn checked_mul(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    /// `self` as a percentage of `total`, `0.0` when `total` is not positive.
    #[must_use]
    pub fn percentage_of(self, total: Money) -> f64 {
        if total.0 <= 0 {
            return 0.0;
        }
        self.0 as f64 / total.0 as f64 * 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

// Operators saturate at the `i64` bounds; use the `checked_*` methods where
// an overflow must be reported.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}
