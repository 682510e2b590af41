//! Fixed-point decimals backed by 256-bit mantissas
//!
//! `Dec` carries 18 fractional digits and is used for scaling factors and
//! capitalization values. `BigDec` carries 36 fractional digits and is used
//! for prices, where small quote-per-base ratios must not collapse to zero.

use ruint::aliases::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{DecimalError, DecimalResult};

pub const DEC_PRECISION: usize = 18;
pub const BIG_DEC_PRECISION: usize = 36;

pub(crate) const DEC_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
pub(crate) const BIG_DEC_SCALE: U256 = from_u128(1_000_000_000_000_000_000_000_000_000_000_000_000);

/// Largest token precision whose scaling factor still fits a `Dec`
pub const MAX_SCALING_PRECISION: u32 = 58;

const fn from_u128(value: u128) -> U256 {
    U256::from_limbs([value as u64, (value >> 64) as u64, 0, 0])
}

/// 10^exp, or `None` if it does not fit 256 bits
pub fn checked_pow10(exp: u32) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

macro_rules! fixed_point {
    ($(#[$meta:meta])* $name:ident, $precision:expr, $scale:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(U256);

        impl $name {
            pub const PRECISION: usize = $precision;

            pub const fn zero() -> Self {
                Self(U256::ZERO)
            }

            pub fn one() -> Self {
                Self($scale)
            }

            /// Whole-number value
            pub fn from_int(value: u64) -> Self {
                Self(U256::from(value) * $scale)
            }

            /// Mantissa scaled by 10^PRECISION
            pub const fn from_raw(raw: U256) -> Self {
                Self(raw)
            }

            pub const fn raw(&self) -> U256 {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            /// Drops the fractional part
            pub fn truncate_int(&self) -> U256 {
                self.0 / $scale
            }
        }

        impl FromStr for $name {
            type Err = DecimalError;

            fn from_str(s: &str) -> DecimalResult<Self> {
                let trimmed = s.trim();
                let (int_part, frac_part) = match trimmed.split_once('.') {
                    Some((int_part, frac_part)) => (int_part, frac_part),
                    None => (trimmed, ""),
                };

                let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
                if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
                    return Err(DecimalError::InvalidFormat(s.to_string()));
                }
                if frac_part.len() > Self::PRECISION {
                    return Err(DecimalError::PrecisionExceeded {
                        input: s.to_string(),
                        max: Self::PRECISION,
                    });
                }

                let digits = format!("{int_part}{frac_part:0<width$}", width = Self::PRECISION);
                U256::from_str_radix(&digits, 10)
                    .map(Self)
                    .map_err(|_| DecimalError::Overflow)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let digits = format!("{:0>width$}", self.0.to_string(), width = Self::PRECISION + 1);
                let (int_part, frac_part) = digits.split_at(digits.len() - Self::PRECISION);
                write!(f, "{int_part}.{frac_part}")
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

fixed_point!(
    /// Decimal with 18 fractional digits
    Dec,
    DEC_PRECISION,
    DEC_SCALE
);

fixed_point!(
    /// Extended-precision decimal with 36 fractional digits
    BigDec,
    BIG_DEC_PRECISION,
    BIG_DEC_SCALE
);

impl Dec {
    /// Scaling factor 10^exponent for a token with `exponent` decimals
    pub fn from_precision(exponent: u32) -> DecimalResult<Self> {
        checked_pow10(exponent)
            .and_then(|factor| factor.checked_mul(DEC_SCALE))
            .map(Self)
            .ok_or(DecimalError::PrecisionOutOfRange(exponent))
    }
}

impl BigDec {
    /// Smallest representable positive value, 10^-36
    pub fn smallest() -> Self {
        Self(U256::from(1u64))
    }

    /// Widens a `Dec` without loss
    pub fn from_dec(value: Dec) -> Option<Self> {
        value.raw().checked_mul(DEC_SCALE).map(Self)
    }

    /// Narrows to 18 fractional digits, truncating the rest
    pub fn to_dec(&self) -> Dec {
        Dec::from_raw(self.0 / DEC_SCALE)
    }
}
