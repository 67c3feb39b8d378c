//! Lenient decoding for numeric fields.
//!
//! The exchange encodes most numbers as JSON strings ("9500.12", "1601234567")
//! but occasionally sends bare numbers for the same field. Every helper here
//! accepts either form. Use with `#[serde(deserialize_with = "...")]`.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Raw JSON scalar before interpretation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Scalar {
    fn into_u64<E: de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| E::custom(format!("invalid unsigned integer {s:?}: {e}"))),
            Self::Unsigned(n) => Ok(n),
            Self::Signed(n) => {
                u64::try_from(n).map_err(|_| E::custom(format!("negative value {n}")))
            }
            Self::Float(f) => Err(E::custom(format!("expected integer, got {f}"))),
        }
    }

    fn into_i64<E: de::Error>(self) -> Result<i64, E> {
        match self {
            Self::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| E::custom(format!("invalid integer {s:?}: {e}"))),
            Self::Unsigned(n) => {
                i64::try_from(n).map_err(|_| E::custom(format!("integer out of range {n}")))
            }
            Self::Signed(n) => Ok(n),
            Self::Float(f) => Err(E::custom(format!("expected integer, got {f}"))),
        }
    }

    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        let value = match self {
            Self::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| E::custom(format!("invalid number {s:?}: {e}")))?,
            Self::Unsigned(n) => n as f64,
            Self::Signed(n) => n as f64,
            Self::Float(f) => f,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(E::custom("non-finite number"))
        }
    }
}

/// `u64` from a string or a number.
pub fn u64_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer)?.into_u64()
}

/// `f64` from a string or a number.
pub fn f64_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer)?.into_f64()
}

/// `u8` from a string or a number (used for the trade side byte).
pub fn u8_from_any<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let n = Scalar::deserialize(deserializer)?.into_u64()?;
    u8::try_from(n).map_err(|_| de::Error::custom(format!("value {n} does not fit in a byte")))
}

/// Timestamp from unix seconds, string or number.
pub fn unix_seconds<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = Scalar::deserialize(deserializer)?.into_i64()?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {secs}")))
}

/// Timestamp from unix microseconds, string or number.
pub fn unix_micros<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let micros = Scalar::deserialize(deserializer)?.into_i64()?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {micros}")))
}

/// Optional variant of [`unix_micros`]. Pair with `#[serde(default)]`.
pub fn option_unix_micros<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    unix_micros(deserializer).map(Some)
}
