//! # Domain Models
//!
//! Value objects shared by every provider and the router. All of them are
//! created per request and never persisted.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Quote`] | Point-in-time price snapshot with daily change |
//! | [`Bar`] | OHLCV sample with per-bar RSI/MACD columns |
//! | [`BarSeries`] | Ordered bars for a symbol/period/interval |
//! | [`IndicatorSnapshot`] | Latest RSI, MACD, ATR and Bollinger values |
//! | [`Instrument`] | Search result entry |
//! | [`Symbol`] | Validated, uppercased ticker |
//! | [`Interval`] / [`Period`] | Bar spacing and lookback window |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Constructors validate their invariants and return [`ValidationError`]:
//!
//! ```rust,ignore
//! use tickdesk_core::{Bar, UtcDateTime, ValidationError};
//!
//! let ts = UtcDateTime::parse("2024-01-01T00:00:00Z")?;
//! let invalid = Bar::new(ts, 100.0, 95.0, 105.0, 102.0, 1000);
//! assert!(matches!(invalid, Err(ValidationError::InvalidBarRange)));
//! ```
//!
//! [`ValidationError`]: crate::ValidationError

mod interval;
mod models;
mod symbol;
mod timestamp;

pub use interval::{Interval, Period};
pub use models::{
    change_between, validate_currency_code, AssetClass, Bar, BarSeries, BollingerBands,
    DataSourceHandle, IndicatorSnapshot, Instrument, MarketState, Quote,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
