use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::data_source::{ChartRequest, DataSource, SearchRequest, SourceError, SourceId};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{
    AssetClass, Bar, Instrument, Interval, MarketState, Quote, Symbol, UtcDateTime,
};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const REFERER: &str = "https://finance.yahoo.com/";
const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default lifetime of a cookie/crumb session.
pub const DEFAULT_AUTH_TTL: Duration = Duration::from_secs(3_600);

/// Maps well-known NSE names onto the tickers Yahoo expects. Anything else
/// passes through unchanged.
pub fn yahoo_ticker(symbol: &Symbol) -> String {
    let mapped = match symbol.as_str() {
        "NIFTY" => "^NSEI",
        "BANKNIFTY" => "^NSEBANK",
        "NIFTYIT" => "^CNXIT",
        "NIFTYPHARMA" => "^CNXPHARMA",
        "NIFTYAUTO" => "^CNXAUTO",
        "NIFTYMETAL" => "^CNXMETAL",
        "NIFTYENERGY" => "^CNXENERGY",
        "NIFTYNXT50" => "^NSMIDCP",
        "HDFCBANK" | "ICICIBANK" | "SBIN" | "AXISBANK" | "KOTAKBANK" | "TCS" | "INFY"
        | "WIPRO" => return format!("{}.NS", symbol.as_str()),
        other => other,
    };
    mapped.to_owned()
}

const fn yahoo_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1m",
        Interval::FiveMinutes => "5m",
        Interval::FifteenMinutes => "15m",
        Interval::OneHour => "60m",
        Interval::OneDay => "1d",
        Interval::OneWeek => "1wk",
    }
}

struct CrumbSession {
    crumb: String,
    fetched_at: Instant,
}

/// Cookie/crumb session for Yahoo's unofficial API.
///
/// The session cookie lives in the HTTP client's cookie jar (or is supplied
/// explicitly through `YAHOO_COOKIE`); the crumb is appended to every data URL.
pub struct YahooAuthManager {
    session: Mutex<Option<CrumbSession>>,
    ttl: Duration,
    cookie: Option<String>,
}

impl YahooAuthManager {
    pub fn new(cookie: Option<String>, ttl: Duration) -> Self {
        Self {
            session: Mutex::new(None),
            ttl,
            cookie,
        }
    }

    fn auth(&self) -> HttpAuth {
        match &self.cookie {
            Some(cookie) => HttpAuth::Cookie(cookie.clone()),
            None => HttpAuth::None,
        }
    }

    fn cached_crumb(&self) -> Option<String> {
        let guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|session| session.fetched_at.elapsed() < self.ttl)
            .map(|session| session.crumb.clone())
    }

    /// Returns the cached crumb, or performs the cookie/crumb handshake.
    pub async fn crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        let crumb = self.handshake(http_client).await?;
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(CrumbSession {
            crumb: crumb.clone(),
            fetched_at: Instant::now(),
        });
        Ok(crumb)
    }

    pub fn invalidate(&self) {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    async fn handshake(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        let auth = self.auth();
        let cookie_request = HttpRequest::get(COOKIE_URL)
            .with_header("referer", REFERER)
            .with_auth(&auth)
            .with_timeout_ms(HANDSHAKE_TIMEOUT_MS);
        // fc.yahoo.com answers 404 but still sets the session cookie
        http_client.execute(cookie_request).await.map_err(|e| {
            SourceError::transport(format!("failed to fetch Yahoo cookie: {}", e.message()))
        })?;

        for endpoint in CRUMB_URLS {
            let crumb_request = HttpRequest::get(endpoint)
                .with_header("referer", REFERER)
                .with_auth(&auth)
                .with_timeout_ms(HANDSHAKE_TIMEOUT_MS);

            let response = match http_client.execute(crumb_request).await {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    debug!(status = response.status, endpoint, "crumb endpoint rejected request");
                    continue;
                }
                Err(error) => {
                    debug!(error = %error, endpoint, "crumb endpoint unreachable");
                    continue;
                }
            };

            let body = response.body.trim();
            if body.to_ascii_lowercase().contains("too many requests") {
                return Err(SourceError::transport(
                    "Yahoo rate limited while fetching crumb",
                ));
            }
            let looks_valid = !body.is_empty()
                && body.len() < 100
                && !body.contains(' ')
                && !body.contains('<');
            if looks_valid {
                return Ok(body.to_owned());
            }
        }

        Err(SourceError::transport(
            "failed to fetch Yahoo crumb from all endpoints",
        ))
    }
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self::new(None, DEFAULT_AUTH_TTL)
    }
}

/// Third-party quote API adapter (Yahoo Finance public endpoints).
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    auth_manager: Arc<YahooAuthManager>,
    timeout_ms: u64,
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_auth_manager(http_client, Arc::new(YahooAuthManager::default()))
    }

    pub fn with_auth_manager(
        http_client: Arc<dyn HttpClient>,
        auth_manager: Arc<YahooAuthManager>,
    ) -> Self {
        Self {
            http_client,
            auth_manager,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// GETs `base_url` with the session crumb appended. A 401/429 invalidates
    /// the session and repeats the request once with a fresh crumb.
    async fn get_with_crumb(&self, base_url: &str) -> Result<String, SourceError> {
        let crumb = self.auth_manager.crumb(self.http_client.as_ref()).await?;
        let response = self.send(base_url, &crumb).await?;

        let response = if response.status == 401 || response.status == 429 {
            warn!(status = response.status, "yahoo session rejected, refreshing crumb");
            self.auth_manager.invalidate();
            let crumb = self.auth_manager.crumb(self.http_client.as_ref()).await?;
            self.send(base_url, &crumb).await?
        } else {
            response
        };

        if !response.is_success() {
            return Err(SourceError::http_status(response.status, base_url));
        }
        Ok(response.body)
    }

    async fn send(
        &self,
        base_url: &str,
        crumb: &str,
    ) -> Result<crate::http_client::HttpResponse, SourceError> {
        let url = format!("{base_url}&crumb={}", urlencoding::encode(crumb));
        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_auth(&self.auth_manager.auth())
            .with_timeout_ms(self.timeout_ms);
        debug!(url = base_url, "yahoo request");
        Ok(self.http_client.execute(request).await?)
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let ticker = yahoo_ticker(symbol);
        let url = format!("{QUOTE_URL}?symbols={}", urlencoding::encode(&ticker));
        let body = self.get_with_crumb(&url).await?;
        parse_quote_response(symbol, &body)
    }

    async fn fetch_chart(&self, req: &ChartRequest) -> Result<Vec<Bar>, SourceError> {
        let end = UtcDateTime::now();
        let start = req.period.start_from(end);
        let url = format!(
            "{CHART_URL}/{}?period1={}&period2={}&interval={}",
            urlencoding::encode(&yahoo_ticker(&req.symbol)),
            start.unix_seconds(),
            end.unix_seconds(),
            yahoo_interval(req.interval),
        );
        let body = self.get_with_crumb(&url).await?;
        parse_chart_response(&body)
    }

    async fn fetch_search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let url = format!(
            "{SEARCH_URL}?q={}&quotesCount={}&newsCount=0",
            urlencoding::encode(&req.query),
            req.limit
        );
        let body = self.get_with_crumb(&url).await?;
        parse_search_response(&body, req.limit)
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> SourceId {
        SourceId::Yahoo
    }

    fn quote<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_quote(symbol))
    }

    fn chart<'a>(
        &'a self,
        req: &'a ChartRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Bar>, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_chart(req))
    }

    fn search<'a>(
        &'a self,
        req: &'a SearchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Instrument>, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_search(req))
    }
}

fn parse_quote_response(symbol: &Symbol, body: &str) -> Result<Quote, SourceError> {
    let response: YahooQuoteResponse = serde_json::from_str(body)?;
    let data = response
        .quote_response
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::empty_result(format!("no quote returned for {symbol}")))?;

    let current = data
        .regular_market_price
        .or(data.price)
        .ok_or_else(|| SourceError::parse(format!("yahoo quote for {symbol} has no price")))?;
    let previous = data
        .regular_market_previous_close
        .or(data.previous_close)
        .unwrap_or(current);
    let volume = data.regular_market_volume.or(data.volume).unwrap_or(0.0);
    let timestamp = data
        .regular_market_time
        .and_then(|secs| UtcDateTime::from_unix_seconds(secs).ok())
        .unwrap_or_else(UtcDateTime::now);

    let mut quote = Quote::new(
        symbol.clone(),
        current,
        previous,
        volume.max(0.0) as u64,
        timestamp,
    )
    .map_err(|e| SourceError::parse(format!("invalid yahoo quote for {symbol}: {e}")))?;

    quote.market_cap = data.market_cap.unwrap_or(0.0);
    quote.fifty_two_week_high = data.fifty_two_week_high.unwrap_or(0.0);
    quote.fifty_two_week_low = data.fifty_two_week_low.unwrap_or(0.0);
    if let Some(exchange) = data.full_exchange_name {
        quote.exchange_name = exchange;
    }
    if let Some(state) = data.market_state.as_deref() {
        quote.market_state = MarketState::normalize(state);
    }
    match data.currency.as_deref() {
        Some(currency) => quote.with_currency(currency).map_err(|e| {
            SourceError::parse(format!("invalid yahoo currency for {symbol}: {e}"))
        }),
        None => Ok(quote),
    }
}

fn parse_chart_response(body: &str) -> Result<Vec<Bar>, SourceError> {
    let response: YahooChartResponse = serde_json::from_str(body)?;
    if let Some(error) = response.chart.error.filter(|value| !value.is_null()) {
        return Err(SourceError::empty_result(format!("yahoo chart error: {error}")));
    }

    let Some(result) = response.chart.result.unwrap_or_default().into_iter().next() else {
        return Err(SourceError::empty_result("yahoo chart returned no result"));
    };
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Err(SourceError::empty_result("yahoo chart returned no quote block"));
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts_value) in timestamps.iter().copied().enumerate() {
        let ohlc = (
            value_at(&quote.open, i),
            value_at(&quote.high, i),
            value_at(&quote.low, i),
            value_at(&quote.close, i),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = ohlc else {
            continue;
        };
        let Ok(ts) = UtcDateTime::from_unix_seconds(ts_value) else {
            continue;
        };
        let volume = value_at(&quote.volume, i).unwrap_or(0.0).max(0.0) as u64;

        match Bar::new(ts, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(error) => debug!(error = %error, ts = ts_value, "skipping malformed yahoo bar"),
        }
    }

    if bars.is_empty() {
        return Err(SourceError::empty_result("yahoo chart contained no bars"));
    }
    Ok(bars)
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

fn parse_search_response(body: &str, limit: usize) -> Result<Vec<Instrument>, SourceError> {
    let response: YahooSearchResponse = serde_json::from_str(body)?;
    let results = response
        .quotes
        .into_iter()
        .filter_map(|entry| {
            let symbol = Symbol::parse(&entry.symbol).ok()?;
            let name = entry
                .short_name
                .or(entry.long_name)
                .unwrap_or_else(|| symbol.as_str().to_owned());
            Some(Instrument {
                symbol,
                name,
                exchange: entry.exch_disp.or(entry.exchange),
                currency: entry.currency,
                asset_class: entry
                    .quote_type
                    .as_deref()
                    .map(AssetClass::from_quote_type)
                    .unwrap_or(AssetClass::Other),
            })
        })
        .take(limit)
        .collect();
    Ok(results)
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResponseData,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResponseData {
    #[serde(default)]
    result: Option<Vec<YahooQuoteData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuoteData {
    regular_market_price: Option<f64>,
    price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<f64>,
    volume: Option<f64>,
    regular_market_time: Option<i64>,
    market_cap: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    currency: Option<String>,
    full_exchange_name: Option<String>,
    market_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<YahooSearchQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooSearchQuote {
    symbol: String,
    #[serde(rename = "shortname")]
    short_name: Option<String>,
    #[serde(rename = "longname")]
    long_name: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "exchDisp")]
    exch_disp: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
    currency: Option<String>,
}
