//! Technical indicator math.
//!
//! Pure functions over closing prices or bars. Insufficient history never
//! fails: RSI falls back to [`NEUTRAL_RSI`], MACD to `0` and ATR to
//! [`DEFAULT_ATR`], so a short series still renders with neutral readings.

use crate::{Bar, BollingerBands, ValidationError};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const ATR_PERIOD: usize = 14;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_K: f64 = 2.0;

pub const NEUTRAL_RSI: f64 = 50.0;
pub const DEFAULT_ATR: f64 = 50.0;

/// The signal line is approximated as a fixed fraction of MACD rather than a
/// 9-period EMA of the MACD line.
pub const MACD_SIGNAL_FACTOR: f64 = 0.9;

/// Exponential moving average seeded with the first value.
///
/// Returns the EMA after consuming every value, using the multiplier
/// `2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Result<f64, ValidationError> {
    if period == 0 {
        return Err(ValidationError::ZeroPeriod);
    }
    let (first, rest) = values.split_first().ok_or(ValidationError::EmptyValues)?;

    let multiplier = 2.0 / (period as f64 + 1.0);
    let value = rest
        .iter()
        .fold(*first, |acc, price| price * multiplier + acc * (1.0 - multiplier));
    Ok(value)
}

/// Relative strength index for the window of `period` closes ending at `index`.
pub fn rsi(closes: &[f64], index: usize, period: usize) -> f64 {
    if period == 0 || index >= closes.len() || index < period {
        return NEUTRAL_RSI;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in (index + 1 - period)..=index {
        if i == 0 {
            continue;
        }
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line at `index`: EMA of the last `fast` closes minus EMA of the last
/// `slow` closes.
pub fn macd(closes: &[f64], index: usize, fast: usize, slow: usize) -> f64 {
    if index >= closes.len() || index < slow || fast > index + 1 {
        return 0.0;
    }

    let fast_window = &closes[index + 1 - fast..=index];
    let slow_window = &closes[index + 1 - slow..=index];
    match (ema(fast_window, fast), ema(slow_window, slow)) {
        (Ok(fast_ema), Ok(slow_ema)) => fast_ema - slow_ema,
        _ => 0.0,
    }
}

/// Average true range across the trailing `period` bars.
pub fn atr(bars: &[Bar], period: usize) -> f64 {
    let window = &bars[bars.len().saturating_sub(period)..];
    if window.len() < 2 {
        return DEFAULT_ATR;
    }

    let total: f64 = window
        .windows(2)
        .map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            let high_low = bar.high - bar.low;
            let high_close = (bar.high - prev.close).abs();
            let low_close = (bar.low - prev.close).abs();
            high_low.max(high_close).max(low_close)
        })
        .sum();

    total / (window.len() - 1) as f64
}

/// Bollinger bands over the trailing `period` closes.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    // sample standard deviation
    let std_dev = if period > 1 {
        let variance = window
            .iter()
            .map(|close| (close - middle).powi(2))
            .sum::<f64>()
            / (period - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Some(BollingerBands {
        upper: middle + k * std_dev,
        middle,
        lower: middle - k * std_dev,
    })
}

/// Volume-weighted average close. `None` for an empty slice.
pub fn vwap(bars: &[Bar]) -> Option<f64> {
    let last = bars.last()?;
    let total_volume: f64 = bars.iter().map(|bar| bar.volume as f64).sum();
    if total_volume == 0.0 {
        return Some(last.close);
    }

    let weighted: f64 = bars.iter().map(|bar| bar.close * bar.volume as f64).sum();
    Some(weighted / total_volume)
}

/// Fills `rsi`, `macd` and `macd_signal` on every bar using only the closes
/// up to and including that bar.
pub fn annotate_bars(bars: &mut [Bar]) {
    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    for (index, bar) in bars.iter_mut().enumerate() {
        let macd_value = macd(&closes, index, MACD_FAST, MACD_SLOW);
        bar.rsi = Some(rsi(&closes, index, RSI_PERIOD));
        bar.macd = Some(macd_value);
        bar.macd_signal = Some(macd_value * MACD_SIGNAL_FACTOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UtcDateTime;

    fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let ts = UtcDateTime::from_unix_seconds(1_704_067_200 + minute * 60).expect("ts");
        Bar::new(ts, open, high, low, close, 100).expect("bar")
    }

    #[test]
    fn ema_of_single_value_is_that_value() {
        assert_eq!(ema(&[42.0], 12), Ok(42.0));
    }

    #[test]
    fn ema_rejects_empty_input_and_zero_period() {
        assert_eq!(ema(&[], 12), Err(ValidationError::EmptyValues));
        assert_eq!(ema(&[1.0], 0), Err(ValidationError::ZeroPeriod));
    }

    #[test]
    fn ema_weights_recent_values() {
        // multiplier 2/3 for period 2: 10 -> 20*2/3 + 10/3
        let value = ema(&[10.0, 20.0], 2).expect("ema");
        assert!((value - 50.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_neutral_without_enough_history() {
        let closes: Vec<f64> = (0..30).map(f64::from).collect();
        assert_eq!(rsi(&closes, 13, 14), NEUTRAL_RSI);
        assert_eq!(rsi(&closes, 99, 14), NEUTRAL_RSI);
    }

    #[test]
    fn rsi_of_rising_closes_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        assert_eq!(rsi(&closes, 29, 14), 100.0);
    }

    #[test]
    fn rsi_balances_equal_gains_and_losses() {
        let closes: Vec<f64> = (0..15)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        // 7 gains and 7 losses of 1.0 each
        assert!((rsi(&closes, 14, 14) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn macd_is_zero_before_slow_period() {
        let closes: Vec<f64> = (0..40).map(f64::from).collect();
        assert_eq!(macd(&closes, 25, 12, 26), 0.0);
        assert_ne!(macd(&closes, 26, 12, 26), 0.0);
    }

    #[test]
    fn macd_of_flat_series_is_zero() {
        let closes = vec![250.0; 40];
        assert_eq!(macd(&closes, 39, 12, 26), 0.0);
    }

    #[test]
    fn atr_defaults_with_fewer_than_two_bars() {
        assert_eq!(atr(&[], 14), DEFAULT_ATR);
        assert_eq!(atr(&[bar(0, 10.0, 11.0, 9.0, 10.0)], 14), DEFAULT_ATR);
    }

    #[test]
    fn atr_uses_gap_against_previous_close() {
        let bars = vec![bar(0, 10.0, 10.0, 10.0, 10.0), bar(1, 14.0, 15.0, 14.0, 14.0)];
        // high-low is 1 but the gap from the previous close is 5
        assert_eq!(atr(&bars, 14), 5.0);
    }

    #[test]
    fn bollinger_requires_full_window() {
        let closes = vec![1.0; 19];
        assert!(bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_of_flat_series_collapses() {
        let closes = vec![100.0; 25];
        let bands = bollinger(&closes, 20, 2.0).expect("bands");
        assert_eq!(bands.upper, 100.0);
        assert_eq!(bands.middle, 100.0);
        assert_eq!(bands.lower, 100.0);
    }

    #[test]
    fn vwap_weights_by_volume() {
        let mut first = bar(0, 10.0, 10.0, 10.0, 10.0);
        first.volume = 300;
        let mut second = bar(1, 20.0, 20.0, 20.0, 20.0);
        second.volume = 100;
        assert_eq!(vwap(&[first, second]), Some(12.5));
        assert_eq!(vwap(&[]), None);
    }

    #[test]
    fn annotate_bars_sets_signal_from_macd() {
        let mut bars: Vec<Bar> = (0..30)
            .map(|i| {
                let price = 100.0 + f64::from(i as i32);
                bar(i, price, price, price, price)
            })
            .collect();
        annotate_bars(&mut bars);

        assert_eq!(bars[0].rsi, Some(NEUTRAL_RSI));
        assert_eq!(bars[0].macd, Some(0.0));
        let last = &bars[29];
        let macd_value = last.macd.expect("macd");
        assert_eq!(last.macd_signal, Some(macd_value * MACD_SIGNAL_FACTOR));
        assert_eq!(last.rsi, Some(100.0));
    }
}
