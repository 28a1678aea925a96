use std::sync::Arc;

use tracing::warn;

use crate::data_source::{ChartRequest, DataSource, SourceError, SourceId};
use crate::indicators::{
    annotate_bars, atr, bollinger, ATR_PERIOD, BOLLINGER_K, BOLLINGER_PERIOD, MACD_SIGNAL_FACTOR,
    NEUTRAL_RSI,
};
use crate::synthetic::{fallback_message, FallbackGenerator};
use crate::{BarSeries, IndicatorSnapshot, Interval, Period, Symbol, UtcDateTime};

/// Historical series access over one upstream source, with per-bar RSI/MACD
/// columns and a synthetic series on failure.
#[derive(Clone)]
pub struct SeriesProvider {
    source: Arc<dyn DataSource>,
    fallback: Arc<FallbackGenerator>,
}

impl SeriesProvider {
    pub fn new(source: Arc<dyn DataSource>, fallback: Arc<FallbackGenerator>) -> Self {
        Self { source, fallback }
    }

    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    /// Single upstream attempt. Bars come back sorted with duplicate
    /// timestamps removed and indicator columns filled.
    pub async fn try_series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<BarSeries, SourceError> {
        let request = ChartRequest::new(symbol.clone(), period, interval);
        let mut bars = self.source.chart(&request).await?;

        bars.sort_by_key(|bar| bar.ts);
        bars.dedup_by_key(|bar| bar.ts);
        if bars.is_empty() {
            return Err(SourceError::empty_result(format!("no bars for {symbol}")));
        }
        annotate_bars(&mut bars);

        let mut series = BarSeries::new(symbol.clone(), period, interval, bars);
        if series.bars.iter().any(|bar| bar.is_synthetic) {
            series.is_synthetic = true;
            series.error_message = Some(String::from("upstream served fallback bars"));
        }
        Ok(series)
    }

    pub async fn get_series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> BarSeries {
        match self.try_series(symbol, period, interval).await {
            Ok(series) => series,
            Err(error) => self.synthetic_series(symbol, period, interval, &error),
        }
    }

    /// Indicators over the one-month daily series.
    pub async fn try_indicator_snapshot(
        &self,
        symbol: &Symbol,
    ) -> Result<IndicatorSnapshot, SourceError> {
        let series = self
            .try_series(symbol, Period::OneMonth, Interval::OneDay)
            .await?;
        Ok(snapshot_from_series(&series))
    }

    pub async fn get_indicator_snapshot(&self, symbol: &Symbol) -> IndicatorSnapshot {
        let series = self
            .get_series(symbol, Period::OneMonth, Interval::OneDay)
            .await;
        snapshot_from_series(&series)
    }

    pub(crate) fn synthetic_series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
        error: &SourceError,
    ) -> BarSeries {
        warn!(
            symbol = %symbol,
            source = %self.source.id(),
            code = error.code(),
            error = error.message(),
            "series fetch failed, serving synthetic series"
        );
        self.fallback
            .series(symbol, period, interval, fallback_message(error))
    }
}

/// Latest indicator readings derived from an annotated series.
pub fn snapshot_from_series(series: &BarSeries) -> IndicatorSnapshot {
    let last = series.last();
    let macd = last.and_then(|bar| bar.macd).unwrap_or(0.0);
    let closes = series.closes();

    IndicatorSnapshot {
        symbol: series.symbol.clone(),
        rsi: last.and_then(|bar| bar.rsi).unwrap_or(NEUTRAL_RSI),
        macd,
        macd_signal: macd * MACD_SIGNAL_FACTOR,
        atr: atr(&series.bars, ATR_PERIOD),
        volume: last.map(|bar| bar.volume).unwrap_or(0),
        bollinger: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_K),
        timestamp: last.map(|bar| bar.ts).unwrap_or_else(UtcDateTime::now),
        is_synthetic: series.is_synthetic,
        error_message: series.error_message.clone(),
    }
}
