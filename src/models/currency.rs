use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const FIAT: &[&str] = &[
    "AED", "ARS", "AUD", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CUP", "CZK", "DKK", "DOP",
    "EUR", "GBP", "HKD", "INR", "JPY", "KRW", "MLC", "MXN", "NOK", "NZD", "PEN", "PLN", "RUB",
    "SEK", "SGD", "TRY", "USD", "UYU", "ZAR",
];

const CRYPTO: &[&str] = &[
    "BTC", "BTG", "BCC", "USDT", "USDC", "EURC", "EURT", "DASH", "LSK", "LTC", "XRP", "ZEC",
    "DOGE", "TRX",
];

/// Placeholder code meaning "no currency given".
const UNSPECIFIED: &str = "XXX";

/// A validated, upper-cased currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Parses `raw`, falling back to `default` when nothing was specified.
    pub fn parse_or(raw: &str, default: &Currency) -> Result<Currency, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNSPECIFIED) {
            return Ok(default.clone());
        }
        trimmed.parse()
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim().to_ascii_uppercase();
        if FIAT.contains(&code.as_str()) || CRYPTO.contains(&code.as_str()) {
            Ok(Currency(code))
        } else {
            Err(AppError::InvalidCurrency(raw.to_string()))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
