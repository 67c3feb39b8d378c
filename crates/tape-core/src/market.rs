//! Currency and currency pair identifiers.
//!
//! The feed spells pairs as the lowercase concatenation of base and counter
//! currency with no separator (e.g. "btcusd"). That spelling is used for REST
//! paths and for websocket channel names.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fiat currencies quoted with two decimals.
const FIAT: &[&str] = &["usd", "eur", "gbp"];

/// A single currency code, always stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display precision for amounts denominated in this currency.
    pub fn precision(&self) -> usize {
        if FIAT.contains(&self.0.as_str()) {
            2
        } else {
            8
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// Base/counter currency pair.
///
/// Format: `{base}{counter}` (e.g., "btcusd").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub base: Currency,
    pub counter: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, counter: Currency) -> Self {
        Self { base, counter }
    }

    /// Pair used when nothing else is configured.
    pub fn btc_usd() -> Self {
        Self {
            base: Currency("btc".to_string()),
            counter: Currency("usd".to_string()),
        }
    }

    /// Human-readable form, e.g. "BTC/USD".
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.base.as_str().to_ascii_uppercase(),
            self.counter.as_str().to_ascii_uppercase()
        )
    }
}

impl Default for CurrencyPair {
    fn default() -> Self {
        Self::btc_usd()
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.counter)
    }
}

impl FromStr for CurrencyPair {
    type Err = CoreError;

    /// Accepts "btc/usd", "btc-usd", "btc_usd" or a six letter "btcusd".
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((base, counter)) = s.split_once(['/', '-', '_']) {
            let base = Currency::new(base).map_err(|_| CoreError::InvalidPair(s.to_string()))?;
            let counter =
                Currency::new(counter).map_err(|_| CoreError::InvalidPair(s.to_string()))?;
            return Ok(Self::new(base, counter));
        }

        // Without a separator only the common 3+3 spelling is unambiguous.
        if s.len() == 6 && s.is_ascii() {
            let (base, counter) = s.split_at(3);
            let base = Currency::new(base).map_err(|_| CoreError::InvalidPair(s.to_string()))?;
            let counter =
                Currency::new(counter).map_err(|_| CoreError::InvalidPair(s.to_string()))?;
            return Ok(Self::new(base, counter));
        }

        Err(CoreError::InvalidPair(s.to_string()))
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(value: CurrencyPair) -> Self {
        value.to_string()
    }
}
