use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Interval, Period, Symbol, UtcDateTime, ValidationError};

/// Which side of the router answered a request. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceHandle {
    Primary,
    Fallback,
}

impl DataSourceHandle {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for DataSourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading session state reported alongside a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketState {
    Regular,
    Pre,
    Post,
    Closed,
}

impl MarketState {
    /// Maps an upstream session string onto the four canonical states.
    /// Unrecognized values are treated as a regular session.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PRE" | "PREPRE" => Self::Pre,
            "POST" | "POSTPOST" => Self::Post,
            "CLOSED" => Self::Closed,
            _ => Self::Regular,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::Pre => "PRE",
            Self::Post => "POST",
            Self::Closed => "CLOSED",
        }
    }
}

impl Default for MarketState {
    fn default() -> Self {
        Self::Regular
    }
}

/// Canonical instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Etf,
    Index,
    Crypto,
    Forex,
    Fund,
    Other,
}

impl AssetClass {
    /// Classifies an upstream `quoteType`/`type` string.
    pub fn from_quote_type(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "EQUITY" | "STOCK" => Self::Equity,
            "ETF" => Self::Etf,
            "INDEX" => Self::Index,
            "CRYPTOCURRENCY" | "CRYPTO" => Self::Crypto,
            "CURRENCY" | "FOREX" => Self::Forex,
            "MUTUALFUND" | "FUND" => Self::Fund,
            _ => Self::Other,
        }
    }
}

/// Search result entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub name: String,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub asset_class: AssetClass,
}

/// Point-in-time snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub current_price: f64,
    pub previous_close: f64,
    pub daily_change: f64,
    pub daily_change_percent: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub fifty_two_week_high: f64,
    pub fifty_two_week_low: f64,
    pub currency: String,
    pub exchange_name: String,
    pub market_state: MarketState,
    pub timestamp: UtcDateTime,
    pub is_synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Quote {
    /// Builds a live quote; the change fields are derived from the two prices.
    /// Optional fields start at their defaults (`0`, `INR`, `NSE`, `REGULAR`).
    pub fn new(
        symbol: Symbol,
        current_price: f64,
        previous_close: f64,
        volume: u64,
        timestamp: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("current_price", current_price)?;
        validate_non_negative("previous_close", previous_close)?;

        let (daily_change, daily_change_percent) = change_between(current_price, previous_close);

        Ok(Self {
            symbol,
            current_price,
            previous_close,
            daily_change,
            daily_change_percent,
            volume,
            market_cap: 0.0,
            fifty_two_week_high: 0.0,
            fifty_two_week_low: 0.0,
            currency: String::from("INR"),
            exchange_name: String::from("NSE"),
            market_state: MarketState::Regular,
            timestamp,
            is_synthetic: false,
            error_message: None,
        })
    }

    pub fn with_currency(mut self, currency: &str) -> Result<Self, ValidationError> {
        self.currency = validate_currency_code(currency)?;
        Ok(self)
    }

    /// Flags the quote as synthetic with the given reason.
    pub fn into_synthetic(mut self, message: impl Into<String>) -> Self {
        self.is_synthetic = true;
        self.error_message = Some(message.into());
        self
    }
}

/// Returns `(current - previous, percent of previous)`; the percentage is `0`
/// when there is no previous close to compare against.
pub fn change_between(current: f64, previous: f64) -> (f64, f64) {
    let change = current - previous;
    let percent = if previous != 0.0 {
        change / previous * 100.0
    } else {
        0.0
    };
    (change, percent)
}

/// One OHLCV sample plus per-bar indicator columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub is_synthetic: bool,
}

impl Bar {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            vwap: None,
            rsi: None,
            macd: None,
            macd_signal: None,
            is_synthetic: false,
        })
    }

    pub fn with_vwap(mut self, vwap: Option<f64>) -> Self {
        self.vwap = vwap.filter(|value| value.is_finite() && *value >= 0.0);
        self
    }
}

/// Ordered bars for one `(symbol, period, interval)` request.
///
/// Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    pub bars: Vec<Bar>,
    pub is_synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BarSeries {
    pub fn new(symbol: Symbol, period: Period, interval: Interval, bars: Vec<Bar>) -> Self {
        Self {
            symbol,
            period,
            interval,
            bars,
            is_synthetic: false,
            error_message: None,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// Bollinger band triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Latest indicator values for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: Symbol,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub atr: f64,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger: Option<BollingerBands>,
    pub timestamp: UtcDateTime,
    pub is_synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> UtcDateTime {
        UtcDateTime::parse("2024-01-01T00:00:00Z").expect("timestamp")
    }

    #[test]
    fn quote_derives_change_fields() {
        let symbol = Symbol::parse("NIFTY").expect("symbol");
        let quote = Quote::new(symbol, 22_110.0, 22_000.0, 1_000, ts()).expect("quote");

        assert!((quote.daily_change - 110.0).abs() < 1e-9);
        assert!((quote.daily_change_percent - 0.5).abs() < 1e-9);
        assert_eq!(quote.currency, "INR");
        assert_eq!(quote.market_state, MarketState::Regular);
        assert!(!quote.is_synthetic);
    }

    #[test]
    fn zero_previous_close_yields_zero_percent() {
        assert_eq!(change_between(10.0, 0.0), (10.0, 0.0));
    }

    #[test]
    fn normalizes_market_state_variants() {
        assert_eq!(MarketState::normalize("prepre"), MarketState::Pre);
        assert_eq!(MarketState::normalize("POSTPOST"), MarketState::Post);
        assert_eq!(MarketState::normalize("CLOSED"), MarketState::Closed);
        assert_eq!(MarketState::normalize("halted"), MarketState::Regular);
    }

    #[test]
    fn validates_currency() {
        assert_eq!(
            validate_currency_code("inr").expect("must normalize"),
            "INR"
        );
        assert!(matches!(
            validate_currency_code("USDT"),
            Err(ValidationError::InvalidCurrency { .. })
        ));
    }

    #[test]
    fn rejects_invalid_bar_bounds() {
        let err = Bar::new(ts(), 10.0, 12.0, 9.0, 12.5, 10).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidBarBounds));
    }

    #[test]
    fn market_state_serializes_upper_case() {
        let encoded = serde_json::to_string(&MarketState::Post).expect("serialize");
        assert_eq!(encoded, "\"POST\"");
    }

    #[test]
    fn classifies_quote_types() {
        assert_eq!(AssetClass::from_quote_type("INDEX"), AssetClass::Index);
        assert_eq!(AssetClass::from_quote_type("equity"), AssetClass::Equity);
        assert_eq!(AssetClass::from_quote_type("FUTURE"), AssetClass::Other);
    }
}
