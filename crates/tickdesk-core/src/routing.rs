use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn, Instrument as _, Span};
use uuid::Uuid;

use crate::adapters::yahoo::DEFAULT_AUTH_TTL;
use crate::adapters::{BackendClient, YahooAdapter, YahooAuthManager};
use crate::config::MarketDataConfig;
use crate::data_source::{DataSource, SearchRequest, SourceError, MAX_SEARCH_RESULTS};
use crate::http_client::{HttpAuth, HttpClient, OfflineHttpClient, ReqwestHttpClient};
use crate::quote_provider::QuoteProvider;
use crate::random::FastRandSource;
use crate::series_provider::SeriesProvider;
use crate::streaming::{self, StreamMessage, SubscriptionHandle};
use crate::synthetic::FallbackGenerator;
use crate::{
    BarSeries, DataSourceHandle, IndicatorSnapshot, Instrument, Interval, Period, Quote, Symbol,
    UtcDateTime, ValidationError,
};

/// Index symbols shown by [`BackendRouter::market_overview`].
pub const MARKET_OVERVIEW_SYMBOLS: [&str; 4] = ["NIFTY", "BANKNIFTY", "NIFTYIT", "NIFTYPHARMA"];

/// Last known state of the primary backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Unknown,
    Available,
    Unavailable,
}

impl Availability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Available => 1,
            Self::Unavailable => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Available,
            2 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }
}

impl Display for Availability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routed call result: the data plus which side answered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Routed<T> {
    pub data: T,
    pub handle: DataSourceHandle,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

impl<T> Routed<T> {
    fn new(data: T, handle: DataSourceHandle, warnings: Vec<String>, started: Instant) -> Self {
        Self {
            data,
            handle,
            warnings,
            latency_ms: elapsed_ms(started),
        }
    }

    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> Routed<U> {
        Routed {
            data: f(self.data),
            handle: self.handle,
            warnings: self.warnings,
            latency_ms: self.latency_ms,
        }
    }
}

/// Kind of data requested per symbol in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Quote,
    Chart,
    Indicators,
}

impl DataKind {
    pub const ALL: [Self; 3] = [Self::Quote, Self::Chart, Self::Indicators];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Chart => "chart",
            Self::Indicators => "indicators",
        }
    }
}

impl Display for DataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote" => Ok(Self::Quote),
            "chart" => Ok(Self::Chart),
            "indicators" => Ok(Self::Indicators),
            _ => Err(ValidationError::InvalidDataKind {
                value: value.to_owned(),
            }),
        }
    }
}

/// Failed batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResult {
    pub error: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Quote(Quote),
    Series(BarSeries),
    Indicators(IndicatorSnapshot),
    Error(ErrorResult),
}

impl BatchEntry {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorResult {
            error: message.into(),
            is_error: true,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_quote(&self) -> Option<&Quote> {
        match self {
            Self::Quote(quote) => Some(quote),
            _ => None,
        }
    }
}

pub type BatchResult = BTreeMap<Symbol, BTreeMap<DataKind, BatchEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Up/down/flat counts by the sign of `daily_change_percent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketSentiment {
    pub sentiment: Sentiment,
    pub up: usize,
    pub down: usize,
    pub flat: usize,
    pub total: usize,
}

impl MarketSentiment {
    pub fn from_quotes(quotes: &[Quote]) -> Self {
        let up = quotes
            .iter()
            .filter(|quote| quote.daily_change_percent > 0.0)
            .count();
        let down = quotes
            .iter()
            .filter(|quote| quote.daily_change_percent < 0.0)
            .count();
        let sentiment = match up.cmp(&down) {
            std::cmp::Ordering::Greater => Sentiment::Bullish,
            std::cmp::Ordering::Less => Sentiment::Bearish,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };

        Self {
            sentiment,
            up,
            down,
            flat: quotes.len() - up - down,
            total: quotes.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub indices: Vec<Quote>,
    pub sentiment: MarketSentiment,
    pub timestamp: UtcDateTime,
}

/// Quote, indicators and intraday chart for one symbol. Parts that failed
/// are `None` and described in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedQuote {
    pub symbol: Symbol,
    pub quote: Option<Quote>,
    pub indicators: Option<IndicatorSnapshot>,
    pub chart: Option<BarSeries>,
    pub errors: Vec<String>,
    pub timestamp: UtcDateTime,
}

/// Routes requests between the primary backend and a fallback source.
///
/// Every routed call probes `/health` first and records the outcome. When
/// the backend is available the call goes there once; a failure falls back
/// for that call only. When it is unavailable the fallback providers answer,
/// which never fail because they degrade to synthetic data.
pub struct BackendRouter {
    backend: Arc<BackendClient>,
    fallback_source: Arc<dyn DataSource>,
    primary_quotes: QuoteProvider,
    primary_series: SeriesProvider,
    fallback_quotes: QuoteProvider,
    fallback_series: SeriesProvider,
    availability: AtomicU8,
}

impl BackendRouter {
    pub fn new(
        backend: Arc<BackendClient>,
        fallback_source: Arc<dyn DataSource>,
        generator: Arc<FallbackGenerator>,
    ) -> Self {
        let primary: Arc<dyn DataSource> = backend.clone();
        Self {
            primary_quotes: QuoteProvider::new(Arc::clone(&primary), Arc::clone(&generator)),
            primary_series: SeriesProvider::new(primary, Arc::clone(&generator)),
            fallback_quotes: QuoteProvider::new(
                Arc::clone(&fallback_source),
                Arc::clone(&generator),
            ),
            fallback_series: SeriesProvider::new(Arc::clone(&fallback_source), generator),
            backend,
            fallback_source,
            availability: AtomicU8::new(Availability::Unknown.to_u8()),
        }
    }

    /// Availability recorded by the most recent probe.
    pub fn availability(&self) -> Availability {
        Availability::from_u8(self.availability.load(Ordering::SeqCst))
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Explicit health probe; returns and records the new availability.
    pub async fn health(&self) -> Availability {
        self.probe().instrument(route_span("health")).await
    }

    async fn probe(&self) -> Availability {
        let availability = match self.backend.health().await {
            Ok(()) => Availability::Available,
            Err(error) => {
                debug!(
                    base_url = self.backend.base_url(),
                    code = error.code(),
                    error = error.message(),
                    "backend health probe failed"
                );
                Availability::Unavailable
            }
        };
        let previous = self.availability.swap(availability.to_u8(), Ordering::SeqCst);
        if Availability::from_u8(previous) != availability {
            debug!(status = %availability, "backend availability changed");
        }
        availability
    }

    /// Probes and reports whether the primary should be tried. Pushes a
    /// warning when it should not.
    async fn use_primary(&self, warnings: &mut Vec<String>) -> bool {
        let available = self.probe().await == Availability::Available;
        if !available {
            warnings.push(format!(
                "primary backend at {} unavailable, using fallback",
                self.backend.base_url()
            ));
        }
        available
    }

    pub async fn quote(&self, symbol: &Symbol) -> Routed<Quote> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            if self.use_primary(&mut warnings).await {
                match self.primary_quotes.try_quote(symbol).await {
                    Ok(quote) => {
                        return Routed::new(quote, DataSourceHandle::Primary, warnings, started)
                    }
                    Err(error) => warnings.push(primary_failed("quote", symbol, &error)),
                }
            }
            let quote = self.fallback_quotes.get_quote(symbol).await;
            Routed::new(quote, DataSourceHandle::Fallback, warnings, started)
        }
        .instrument(route_span("quote"))
        .await
    }

    /// One quote per symbol in input order, via `POST /api/quotes` when the
    /// backend is up.
    pub async fn quotes(&self, symbols: &[Symbol]) -> Routed<Vec<Quote>> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            if self.use_primary(&mut warnings).await {
                match self.backend.quotes(symbols).await {
                    Ok(quotes) => {
                        return Routed::new(quotes, DataSourceHandle::Primary, warnings, started)
                    }
                    Err(error) => {
                        warn!(
                            count = symbols.len(),
                            code = error.code(),
                            error = error.message(),
                            "primary batch quote failed, using fallback"
                        );
                        warnings.push(format!("primary quotes failed: {}", error.message()));
                    }
                }
            }
            let quotes = self.fallback_quotes.get_multiple_quotes(symbols).await;
            Routed::new(quotes, DataSourceHandle::Fallback, warnings, started)
        }
        .instrument(route_span("quotes"))
        .await
    }

    pub async fn series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Routed<BarSeries> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            if self.use_primary(&mut warnings).await {
                match self.primary_series.try_series(symbol, period, interval).await {
                    Ok(series) => {
                        return Routed::new(series, DataSourceHandle::Primary, warnings, started)
                    }
                    Err(error) => warnings.push(primary_failed("series", symbol, &error)),
                }
            }
            let series = self
                .fallback_series
                .get_series(symbol, period, interval)
                .await;
            Routed::new(series, DataSourceHandle::Fallback, warnings, started)
        }
        .instrument(route_span("series"))
        .await
    }

    pub async fn indicators(&self, symbol: &Symbol) -> Routed<IndicatorSnapshot> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            if self.use_primary(&mut warnings).await {
                match self
                    .backend
                    .technical_indicators(symbol, Period::OneMonth)
                    .await
                {
                    Ok(snapshot) => {
                        return Routed::new(snapshot, DataSourceHandle::Primary, warnings, started)
                    }
                    Err(error) => warnings.push(primary_failed("indicators", symbol, &error)),
                }
            }
            let snapshot = self.fallback_series.get_indicator_snapshot(symbol).await;
            Routed::new(snapshot, DataSourceHandle::Fallback, warnings, started)
        }
        .instrument(route_span("indicators"))
        .await
    }

    /// Symbol search. Upstream failures yield an empty list; only a blank
    /// query is an error.
    pub async fn search(&self, query: &str) -> Result<Routed<Vec<Instrument>>, ValidationError> {
        let request = SearchRequest::new(query, MAX_SEARCH_RESULTS)?;
        let routed = async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            if self.use_primary(&mut warnings).await {
                match self.backend.search(&request).await {
                    Ok(results) => {
                        return Routed::new(results, DataSourceHandle::Primary, warnings, started)
                    }
                    Err(error) => {
                        warn!(
                            query = %request.query,
                            code = error.code(),
                            error = error.message(),
                            "primary search failed, using fallback"
                        );
                        warnings.push(format!("primary search failed: {}", error.message()));
                    }
                }
            }
            let results = match self.fallback_source.search(&request).await {
                Ok(results) => results,
                Err(error) => {
                    warn!(
                        query = %request.query,
                        source = %self.fallback_source.id(),
                        code = error.code(),
                        error = error.message(),
                        "search failed, returning no results"
                    );
                    warnings.push(format!("search failed: {}", error.message()));
                    Vec::new()
                }
            };
            Routed::new(results, DataSourceHandle::Fallback, warnings, started)
        }
        .instrument(route_span("search"))
        .await;
        Ok(routed)
    }

    /// Quotes for the headline indices plus an up/down sentiment summary.
    pub async fn market_overview(&self) -> Routed<MarketOverview> {
        let symbols: Vec<Symbol> = MARKET_OVERVIEW_SYMBOLS
            .iter()
            .filter_map(|name| Symbol::parse(name).ok())
            .collect();
        self.quotes(&symbols).await.map_data(|indices| MarketOverview {
            sentiment: MarketSentiment::from_quotes(&indices),
            indices,
            timestamp: UtcDateTime::now(),
        })
    }

    /// Quote, one-month indicators and the 1d/5m chart, fetched concurrently
    /// from whichever side the probe selects. No synthetic substitution:
    /// failed parts stay empty.
    pub async fn enhanced_quote(&self, symbol: &Symbol) -> Routed<EnhancedQuote> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            let primary = self.use_primary(&mut warnings).await;

            let (quote, indicators, chart) = if primary {
                tokio::join!(
                    self.primary_quotes.try_quote(symbol),
                    self.backend.technical_indicators(symbol, Period::OneMonth),
                    self.primary_series
                        .try_series(symbol, Period::OneDay, Interval::FiveMinutes),
                )
            } else {
                tokio::join!(
                    self.fallback_quotes.try_quote(symbol),
                    self.fallback_series.try_indicator_snapshot(symbol),
                    self.fallback_series
                        .try_series(symbol, Period::OneDay, Interval::FiveMinutes),
                )
            };

            let mut errors = Vec::new();
            let quote = part_or_error(quote, "Quote", &mut errors);
            let indicators = part_or_error(indicators, "Indicators", &mut errors);
            let chart = part_or_error(chart, "Chart", &mut errors);
            if !errors.is_empty() {
                warn!(symbol = %symbol, failed = errors.len(), "enhanced quote incomplete");
            }

            let handle = if primary {
                DataSourceHandle::Primary
            } else {
                DataSourceHandle::Fallback
            };
            let data = EnhancedQuote {
                symbol: symbol.clone(),
                quote,
                indicators,
                chart,
                errors,
                timestamp: UtcDateTime::now(),
            };
            Routed::new(data, handle, warnings, started)
        }
        .instrument(route_span("enhanced_quote"))
        .await
    }

    /// Every `(symbol, kind)` pair is resolved exactly once, concurrently.
    ///
    /// With the backend up each pair is a single primary attempt and a
    /// failure becomes an [`ErrorResult`] for that pair alone. With it down
    /// the fallback providers answer every pair.
    pub async fn get_batch(&self, symbols: &[Symbol], kinds: &[DataKind]) -> Routed<BatchResult> {
        async {
            let started = Instant::now();
            let mut warnings = Vec::new();
            let primary = self.use_primary(&mut warnings).await;

            let symbols: BTreeSet<&Symbol> = symbols.iter().collect();
            let kinds: BTreeSet<DataKind> = kinds.iter().copied().collect();
            let pairs: Vec<(&Symbol, DataKind)> = symbols
                .iter()
                .flat_map(|symbol| kinds.iter().map(move |kind| (*symbol, *kind)))
                .collect();

            let entries = join_all(
                pairs
                    .iter()
                    .map(|(symbol, kind)| self.batch_entry(symbol, *kind, primary)),
            )
            .await;

            let mut result = BatchResult::new();
            for ((symbol, kind), entry) in pairs.into_iter().zip(entries) {
                result.entry(symbol.clone()).or_default().insert(kind, entry);
            }

            let handle = if primary {
                DataSourceHandle::Primary
            } else {
                DataSourceHandle::Fallback
            };
            Routed::new(result, handle, warnings, started)
        }
        .instrument(route_span("batch"))
        .await
    }

    async fn batch_entry(&self, symbol: &Symbol, kind: DataKind, primary: bool) -> BatchEntry {
        if !primary {
            return match kind {
                DataKind::Quote => BatchEntry::Quote(self.fallback_quotes.get_quote(symbol).await),
                DataKind::Chart => BatchEntry::Series(
                    self.fallback_series
                        .get_series(symbol, Period::OneDay, Interval::FiveMinutes)
                        .await,
                ),
                DataKind::Indicators => BatchEntry::Indicators(
                    self.fallback_series.get_indicator_snapshot(symbol).await,
                ),
            };
        }

        let result = match kind {
            DataKind::Quote => self
                .primary_quotes
                .try_quote(symbol)
                .await
                .map(BatchEntry::Quote),
            DataKind::Chart => self
                .primary_series
                .try_series(symbol, Period::OneDay, Interval::FiveMinutes)
                .await
                .map(BatchEntry::Series),
            DataKind::Indicators => self
                .backend
                .technical_indicators(symbol, Period::OneMonth)
                .await
                .map(BatchEntry::Indicators),
        };

        result.unwrap_or_else(|error| {
            warn!(
                symbol = %symbol,
                kind = %kind,
                code = error.code(),
                error = error.message(),
                "batch entry failed"
            );
            BatchEntry::error(error.message())
        })
    }

    /// Opens a live subscription on the backend WebSocket. The connect is
    /// bounded by the request timeout. Must be called from within a tokio
    /// runtime.
    pub fn subscribe<M, E, C>(
        &self,
        symbol: Symbol,
        on_message: M,
        on_error: E,
        on_close: C,
    ) -> SubscriptionHandle
    where
        M: FnMut(StreamMessage) + Send + 'static,
        E: FnMut(SourceError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        streaming::subscribe(
            self.backend.ws_url(),
            symbol,
            Duration::from_millis(self.backend.timeout_ms()),
            on_message,
            on_error,
            on_close,
        )
    }
}

/// Builder assembling a [`BackendRouter`] from [`MarketDataConfig`].
///
/// ```rust,ignore
/// use tickdesk_core::BackendRouterBuilder;
///
/// // Real clients, configured from the environment
/// let router = BackendRouterBuilder::from_env().build();
///
/// // Every upstream refused; all answers synthetic and reproducible
/// let offline = BackendRouterBuilder::new().offline().with_seed(7).build();
/// ```
#[derive(Clone, Default)]
pub struct BackendRouterBuilder {
    config: MarketDataConfig,
    offline: bool,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl BackendRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from [`MarketDataConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new().with_config(MarketDataConfig::from_env())
    }

    pub fn with_config(mut self, config: MarketDataConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Use a transport that refuses every request.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Shares one transport between the backend and the fallback adapter.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    pub fn build(self) -> BackendRouter {
        let http_client: Arc<dyn HttpClient> = if self.offline {
            Arc::new(OfflineHttpClient)
        } else if let Some(http_client) = self.http_client {
            http_client
        } else {
            Arc::new(ReqwestHttpClient::new())
        };
        let config = self.config;

        let auth = config
            .backend_token
            .clone()
            .map(HttpAuth::BearerToken)
            .unwrap_or(HttpAuth::None);
        let backend = BackendClient::new(Arc::clone(&http_client), config.backend_url.as_str())
            .with_auth(auth)
            .with_timeout_ms(config.request_timeout_ms)
            .with_health_timeout_ms(config.health_timeout_ms);

        let auth_manager = Arc::new(YahooAuthManager::new(
            config.yahoo_cookie.clone(),
            DEFAULT_AUTH_TTL,
        ));
        let yahoo = YahooAdapter::with_auth_manager(http_client, auth_manager)
            .with_timeout_ms(config.request_timeout_ms);

        let rng = match config.seed {
            Some(seed) => FastRandSource::seeded(seed),
            None => FastRandSource::new(),
        };
        let generator = FallbackGenerator::new(config.fallback.clone(), Box::new(rng));

        BackendRouter::new(Arc::new(backend), Arc::new(yahoo), Arc::new(generator))
    }
}

fn route_span(op: &'static str) -> Span {
    debug_span!("route", op, request_id = %Uuid::new_v4())
}

fn primary_failed(op: &str, symbol: &Symbol, error: &SourceError) -> String {
    warn!(
        symbol = %symbol,
        op,
        code = error.code(),
        error = error.message(),
        "primary call failed, using fallback"
    );
    format!("primary {op} for {symbol} failed: {}", error.message())
}

fn part_or_error<T>(
    result: Result<T, SourceError>,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            errors.push(format!("{label}: {}", error.message()));
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    let elapsed: Duration = started.elapsed();
    elapsed.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpRequest, HttpResponse};
    use std::future::Future;
    use std::pin::Pin;

    /// Answers backend paths by suffix; everything else is refused.
    struct ScriptedBackend {
        healthy: bool,
        routes: Vec<(&'static str, String)>,
    }

    impl HttpClient for ScriptedBackend {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                if request.url.ends_with("/health") {
                    return if self.healthy {
                        Ok(HttpResponse::ok_json("{\"status\":\"healthy\"}"))
                    } else {
                        Err(HttpError::new("connection refused"))
                    };
                }
                self.routes
                    .iter()
                    .find(|(suffix, _)| request.url.ends_with(suffix))
                    .map(|(_, body)| HttpResponse::ok_json(body.clone()))
                    .ok_or_else(|| HttpError::new(format!("no route for {}", request.url)))
            })
        }
    }

    fn router(healthy: bool, routes: Vec<(&'static str, String)>) -> BackendRouter {
        BackendRouterBuilder::new()
            .with_http_client(Arc::new(ScriptedBackend { healthy, routes }))
            .with_seed(42)
            .build()
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn quote_body(price: f64, previous: f64) -> String {
        format!(
            "{{\"currentPrice\":{price},\"previousClose\":{previous},\"volume\":10,\
             \"timestamp\":\"2024-03-01T09:15:00\"}}"
        )
    }

    #[tokio::test]
    async fn starts_unknown_and_records_health_check() {
        let router = router(false, Vec::new());
        assert_eq!(router.availability(), Availability::Unknown);

        assert_eq!(router.health().await, Availability::Unavailable);
        assert_eq!(router.availability(), Availability::Unavailable);
    }

    #[tokio::test]
    async fn available_backend_answers_quote() {
        let router = router(true, vec![("/api/quote", quote_body(101.0, 100.0))]);

        let routed = router.quote(&symbol("TCS")).await;

        assert_eq!(routed.handle, DataSourceHandle::Primary);
        assert!(!routed.data.is_synthetic);
        assert_eq!(routed.data.current_price, 101.0);
        assert!(routed.warnings.is_empty());
        assert_eq!(router.availability(), Availability::Available);
    }

    #[tokio::test]
    async fn failed_primary_call_falls_back_for_that_call() {
        let router = router(true, Vec::new());

        let routed = router.quote(&symbol("NIFTY")).await;

        assert_eq!(routed.handle, DataSourceHandle::Fallback);
        assert!(routed.data.is_synthetic);
        assert_eq!(routed.warnings.len(), 1);
        assert_eq!(router.availability(), Availability::Available);
    }

    #[tokio::test]
    async fn unreachable_backend_routes_batch_to_fallback() {
        let router = router(false, Vec::new());
        let symbols = vec![symbol("NIFTY"), symbol("TCS")];

        let routed = router
            .get_batch(&symbols, &[DataKind::Quote, DataKind::Chart])
            .await;

        assert_eq!(routed.handle, DataSourceHandle::Fallback);
        assert_eq!(routed.data.len(), 2);
        for entries in routed.data.values() {
            assert_eq!(entries.len(), 2);
            assert!(entries.values().all(|entry| !entry.is_error()));
        }
    }

    #[tokio::test]
    async fn search_failure_is_an_empty_list() {
        let router = router(false, Vec::new());

        let routed = router.search("hdfc").await.expect("valid query");

        assert!(routed.data.is_empty());
        assert!(!routed.warnings.is_empty());
        assert!(matches!(
            router.search("   ").await,
            Err(ValidationError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn enhanced_quote_collects_part_errors() {
        let router = router(true, vec![("/api/quote", quote_body(50.0, 49.0))]);

        let routed = router.enhanced_quote(&symbol("INFY")).await;

        assert_eq!(routed.handle, DataSourceHandle::Primary);
        assert!(routed.data.quote.is_some());
        assert!(routed.data.indicators.is_none());
        assert!(routed.data.chart.is_none());
        assert_eq!(routed.data.errors.len(), 2);
        assert!(routed.data.errors[0].starts_with("Indicators: "));
        assert!(routed.data.errors[1].starts_with("Chart: "));
    }

    #[test]
    fn sentiment_counts_direction() {
        let ts = UtcDateTime::now();
        let quotes = vec![
            Quote::new(symbol("A"), 11.0, 10.0, 0, ts).expect("quote"),
            Quote::new(symbol("B"), 12.0, 10.0, 0, ts).expect("quote"),
            Quote::new(symbol("C"), 9.0, 10.0, 0, ts).expect("quote"),
            Quote::new(symbol("D"), 10.0, 10.0, 0, ts).expect("quote"),
        ];

        let sentiment = MarketSentiment::from_quotes(&quotes);

        assert_eq!(sentiment.sentiment, Sentiment::Bullish);
        assert_eq!((sentiment.up, sentiment.down, sentiment.flat), (2, 1, 1));
        assert_eq!(sentiment.total, 4);
        assert_eq!(MarketSentiment::from_quotes(&[]).sentiment, Sentiment::Neutral);
    }

    #[test]
    fn data_kind_parses_case_insensitively() {
        assert_eq!("Chart".parse::<DataKind>(), Ok(DataKind::Chart));
        assert!(matches!(
            "depth".parse::<DataKind>(),
            Err(ValidationError::InvalidDataKind { .. })
        ));
    }
}
