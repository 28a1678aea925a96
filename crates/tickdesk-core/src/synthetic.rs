//! Synthetic fallback data.
//!
//! When every upstream attempt for a request has failed the providers still
//! answer, with values generated here and flagged `is_synthetic`.

use std::sync::{Mutex, PoisonError};

use time::Duration;

use crate::data_source::SourceError;
use crate::indicators::annotate_bars;
use crate::random::{FastRandSource, RandomSource};
use crate::{Bar, BarSeries, Interval, MarketState, Period, Quote, Symbol, UtcDateTime};

pub const FALLBACK_MESSAGE: &str = "Using fallback data - Yahoo Finance API unavailable";

/// `FALLBACK_MESSAGE` followed by the upstream failure that caused it.
pub fn fallback_message(error: &SourceError) -> String {
    format!("{FALLBACK_MESSAGE}: {}", error.message())
}

/// Tunables for synthetic data.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    /// Base price for symbols without an entry in `base_overrides`.
    pub base_price: f64,
    /// `(fragment, base)` pairs; the first fragment contained in the symbol wins.
    pub base_overrides: Vec<(String, f64)>,
    /// Synthetic quotes land within `base ± spread`.
    pub spread: f64,
    pub quote_volume: (u64, u64),
    pub bar_volume: (u64, u64),
    pub series_len: usize,
    pub step: Duration,
    /// Bar-to-bar moves are drawn from `±max_step_change / 2`.
    pub max_step_change: f64,
    /// Distance of the synthetic 52-week high/low from the base price.
    pub fifty_two_week_band: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            base_price: 45_250.0,
            base_overrides: vec![
                (String::from("BANKNIFTY"), 45_250.0),
                (String::from("NSEBANK"), 45_250.0),
                (String::from("NIFTY"), 22_000.0),
                (String::from("NSEI"), 22_000.0),
            ],
            spread: 500.0,
            quote_volume: (1_000_000, 3_000_000),
            bar_volume: (500_000, 1_500_000),
            series_len: 50,
            step: Duration::minutes(5),
            max_step_change: 100.0,
            fifty_two_week_band: 2_000.0,
        }
    }
}

impl FallbackConfig {
    pub fn base_price_for(&self, symbol: &Symbol) -> f64 {
        self.base_overrides
            .iter()
            .find(|(fragment, _)| symbol.as_str().contains(fragment.as_str()))
            .map(|(_, base)| *base)
            .unwrap_or(self.base_price)
    }
}

/// Generates flagged synthetic quotes and series from an injectable
/// [`RandomSource`].
pub struct FallbackGenerator {
    config: FallbackConfig,
    rng: Mutex<Box<dyn RandomSource>>,
}

impl FallbackGenerator {
    pub fn new(config: FallbackConfig, rng: Box<dyn RandomSource>) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(FallbackConfig::default(), Box::new(FastRandSource::seeded(seed)))
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
        let mut guard = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    }

    /// Quote around the symbol's base price; `previous_close` is the base.
    pub fn quote(&self, symbol: &Symbol, message: impl Into<String>) -> Quote {
        let base = self.config.base_price_for(symbol);
        let (offset, volume) = self.with_rng(|rng| {
            let offset = (rng.next_f64() - 0.5) * 2.0 * self.config.spread;
            let (low, high) = self.config.quote_volume;
            (offset, rng.range_u64(low, high))
        });

        let current = (base + offset).max(0.0);
        let (daily_change, daily_change_percent) = crate::change_between(current, base);

        Quote {
            symbol: symbol.clone(),
            current_price: current,
            previous_close: base,
            daily_change,
            daily_change_percent,
            volume,
            market_cap: 0.0,
            fifty_two_week_high: base + self.config.fifty_two_week_band,
            fifty_two_week_low: (base - self.config.fifty_two_week_band).max(0.0),
            currency: String::from("INR"),
            exchange_name: String::from("NSE"),
            market_state: MarketState::Regular,
            timestamp: UtcDateTime::now(),
            is_synthetic: true,
            error_message: Some(message.into()),
        }
    }

    /// Random-walk series of `series_len` bars spaced by `step`, ending now.
    ///
    /// The requested period and interval are recorded on the series but do
    /// not change its shape.
    pub fn series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
        message: impl Into<String>,
    ) -> BarSeries {
        let len = self.config.series_len;
        let end = UtcDateTime::now();
        let mut price = self.config.base_price_for(symbol);

        let mut bars = self.with_rng(|rng| {
            let mut bars = Vec::with_capacity(len);
            for i in 0..len {
                let steps_back = (len - 1 - i) as i32;
                let ts = end.checked_sub(self.config.step * steps_back).unwrap_or(end);
                let change = (rng.next_f64() - 0.5) * self.config.max_step_change;
                let open = price;
                let close = (price + change).max(0.01);
                let wick = change.abs() * 0.5;
                let (low_volume, high_volume) = self.config.bar_volume;
                bars.push(Bar {
                    ts,
                    open,
                    high: open.max(close) + wick,
                    low: (open.min(close) - wick).max(0.0),
                    close,
                    volume: rng.range_u64(low_volume, high_volume),
                    vwap: Some(close),
                    rsi: None,
                    macd: None,
                    macd_signal: None,
                    is_synthetic: true,
                });
                price = close;
            }
            bars
        });

        annotate_bars(&mut bars);

        BarSeries {
            symbol: symbol.clone(),
            period,
            interval,
            bars,
            is_synthetic: true,
            error_message: Some(message.into()),
        }
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(FallbackConfig::default(), Box::new(FastRandSource::new()))
    }
}
