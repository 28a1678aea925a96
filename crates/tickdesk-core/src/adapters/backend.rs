use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::data_source::{ChartRequest, DataSource, SearchRequest, SourceError, SourceId};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{
    AssetClass, Bar, BollingerBands, IndicatorSnapshot, Instrument, Interval, MarketState, Period,
    Quote, Symbol, UtcDateTime,
};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;

/// Client for the primary analytics backend.
///
/// Every call is a single attempt bounded by the configured timeout.
#[derive(Clone)]
pub struct BackendClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout_ms: u64,
    health_timeout_ms: u64,
}

impl BackendClient {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http_client,
            base_url,
            auth: HttpAuth::None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_health_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.health_timeout_ms = timeout_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// WebSocket endpoint derived from the base URL.
    pub fn ws_url(&self) -> String {
        ws_url_for(&self.base_url)
    }

    /// `GET /health`; any 2xx answer counts as healthy.
    pub async fn health(&self) -> Result<(), SourceError> {
        let url = format!("{}/health", self.base_url);
        let request = HttpRequest::get(&url)
            .with_auth(&self.auth)
            .with_timeout_ms(self.health_timeout_ms);
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(SourceError::http_status(response.status, &url));
        }
        Ok(())
    }

    pub async fn quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let body = json!({
            "symbol": symbol.as_str(),
            "period": Period::OneDay.as_str(),
            "interval": Interval::FiveMinutes.as_str(),
        });
        let payload: BackendQuote = self.post("/api/quote", &body).await?;
        payload.into_quote(symbol)
    }

    /// `POST /api/quotes`. The answer must contain one quote per symbol.
    pub async fn quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, SourceError> {
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        let payload: Vec<BackendQuote> = self
            .post("/api/quotes", &json!({ "symbols": names }))
            .await?;
        if payload.len() != symbols.len() {
            return Err(SourceError::parse(format!(
                "backend returned {} quotes for {} symbols",
                payload.len(),
                symbols.len()
            )));
        }
        payload
            .into_iter()
            .zip(symbols)
            .map(|(quote, symbol)| quote.into_quote(symbol))
            .collect()
    }

    pub async fn chart(&self, req: &ChartRequest) -> Result<Vec<Bar>, SourceError> {
        let body = json!({
            "symbol": req.symbol.as_str(),
            "period": req.period.as_str(),
            "interval": req.interval.as_str(),
        });
        let payload: Vec<BackendBar> = self.post("/api/chart", &body).await?;
        let bars: Vec<Bar> = payload.into_iter().filter_map(BackendBar::into_bar).collect();
        if bars.is_empty() {
            return Err(SourceError::empty_result(format!(
                "backend chart for {} contained no bars",
                req.symbol
            )));
        }
        Ok(bars)
    }

    pub async fn technical_indicators(
        &self,
        symbol: &Symbol,
        period: Period,
    ) -> Result<IndicatorSnapshot, SourceError> {
        let body = json!({ "symbol": symbol.as_str(), "period": period.as_str() });
        let payload: BackendIndicators = self.post("/api/technical-indicators", &body).await?;
        Ok(payload.into_snapshot(symbol))
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let url = format!(
            "{}/api/search/{}",
            self.base_url,
            urlencoding::encode(&req.query)
        );
        let request = HttpRequest::get(&url)
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);
        let payload: Vec<BackendSearchResult> = self.send(request, &url).await?;
        Ok(payload
            .into_iter()
            .filter_map(BackendSearchResult::into_instrument)
            .take(req.limit)
            .collect())
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, SourceError> {
        let url = format!("{}{path}", self.base_url);
        let request = HttpRequest::post_json(&url, body.to_string())
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);
        self.send(request, &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        url: &str,
    ) -> Result<T, SourceError> {
        debug!(url, "backend request");
        let response = self.http_client.execute(request).await?;
        debug!(url, status = response.status, "backend response");
        if !response.is_success() {
            return Err(SourceError::http_status(response.status, url));
        }
        Ok(serde_json::from_str(&response.body)?)
    }
}

impl DataSource for BackendClient {
    fn id(&self) -> SourceId {
        SourceId::Backend
    }

    fn quote<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>> {
        Box::pin(BackendClient::quote(self, symbol))
    }

    fn chart<'a>(
        &'a self,
        req: &'a ChartRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Bar>, SourceError>> + Send + 'a>> {
        Box::pin(BackendClient::chart(self, req))
    }

    fn search<'a>(
        &'a self,
        req: &'a SearchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Instrument>, SourceError>> + Send + 'a>> {
        Box::pin(BackendClient::search(self, req))
    }
}

/// `http` becomes `ws`, `https` becomes `wss`, a trailing slash is dropped
/// and `/ws` is appended.
pub fn ws_url_for(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    let ws_base = if lower.starts_with("https:") {
        format!("wss:{}", &trimmed["https:".len()..])
    } else if lower.starts_with("http:") {
        format!("ws:{}", &trimmed["http:".len()..])
    } else {
        trimmed.to_owned()
    };
    format!("{ws_base}/ws")
}

/// Decodes a quote pushed over the WebSocket, using the same schema as
/// `POST /api/quote`.
pub(crate) fn quote_from_value(
    value: &serde_json::Value,
    symbol: &Symbol,
) -> Result<Quote, SourceError> {
    let raw = BackendQuote::deserialize(value)?;
    raw.into_quote(symbol)
}

/// Accepts RFC3339, offset-less ISO-8601 (read as UTC) or unix milliseconds.
fn parse_loose_timestamp(value: &serde_json::Value) -> Option<UtcDateTime> {
    match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|ms| ms as i64))
            .and_then(|ms| UtcDateTime::from_unix_millis(ms).ok()),
        serde_json::Value::String(text) => UtcDateTime::parse(text)
            .or_else(|_| UtcDateTime::parse(&format!("{text}Z")))
            .ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendQuote {
    current_price: Option<f64>,
    price: Option<f64>,
    previous_close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    market_cap: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    currency: Option<String>,
    exchange_name: Option<String>,
    market_state: Option<String>,
    #[serde(default)]
    timestamp: serde_json::Value,
    #[serde(default, alias = "isError")]
    is_fallback: bool,
    error_message: Option<String>,
}

impl BackendQuote {
    fn into_quote(self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let current = self.current_price.or(self.price).ok_or_else(|| {
            SourceError::parse(format!("backend quote for {symbol} has no price"))
        })?;
        let previous = self.previous_close.unwrap_or(current);
        let timestamp = parse_loose_timestamp(&self.timestamp).unwrap_or_else(UtcDateTime::now);

        let mut quote = Quote::new(
            symbol.clone(),
            current,
            previous,
            self.volume.unwrap_or(0.0).max(0.0) as u64,
            timestamp,
        )
        .map_err(|e| SourceError::parse(format!("invalid backend quote for {symbol}: {e}")))?;

        quote.market_cap = self.market_cap.unwrap_or(0.0);
        quote.fifty_two_week_high = self.fifty_two_week_high.unwrap_or(0.0);
        quote.fifty_two_week_low = self.fifty_two_week_low.unwrap_or(0.0);
        if let Some(exchange) = self.exchange_name.filter(|value| !value.is_empty()) {
            quote.exchange_name = exchange;
        }
        if let Some(state) = self.market_state.as_deref() {
            quote.market_state = MarketState::normalize(state);
        }
        if let Some(currency) = self.currency.as_deref().filter(|value| !value.is_empty()) {
            quote = quote.with_currency(currency).map_err(|e| {
                SourceError::parse(format!("invalid backend currency for {symbol}: {e}"))
            })?;
        }
        if self.is_fallback {
            let message = self
                .error_message
                .unwrap_or_else(|| String::from("backend served fallback data"));
            quote = quote.into_synthetic(message);
        }
        Ok(quote)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendBar {
    #[serde(default)]
    timestamp: serde_json::Value,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    price: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    vwap: Option<f64>,
    #[serde(default)]
    is_fallback: bool,
}

impl BackendBar {
    fn into_bar(self) -> Option<Bar> {
        let ts = parse_loose_timestamp(&self.timestamp)?;
        let close = self.close.or(self.price)?;
        let open = self.open.unwrap_or(close);
        let high = self.high.unwrap_or(open.max(close));
        let low = self.low.unwrap_or(open.min(close));
        let volume = self.volume.unwrap_or(0.0).max(0.0) as u64;

        match Bar::new(ts, open, high, low, close, volume) {
            Ok(bar) => {
                let mut bar = bar.with_vwap(self.vwap);
                bar.is_synthetic = self.is_fallback;
                Some(bar)
            }
            Err(error) => {
                debug!(error = %error, "skipping malformed backend bar");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendIndicators {
    rsi: f64,
    macd: f64,
    macd_signal: Option<f64>,
    atr: f64,
    #[serde(default)]
    volume: Option<f64>,
    bollinger_upper: Option<f64>,
    bollinger_middle: Option<f64>,
    bollinger_lower: Option<f64>,
    #[serde(default)]
    timestamp: serde_json::Value,
    #[serde(default)]
    is_fallback: bool,
}

impl BackendIndicators {
    fn into_snapshot(self, symbol: &Symbol) -> IndicatorSnapshot {
        let bollinger = match (self.bollinger_upper, self.bollinger_middle, self.bollinger_lower) {
            (Some(upper), Some(middle), Some(lower)) if middle != 0.0 => Some(BollingerBands {
                upper,
                middle,
                lower,
            }),
            _ => None,
        };

        IndicatorSnapshot {
            symbol: symbol.clone(),
            rsi: self.rsi,
            macd: self.macd,
            macd_signal: self
                .macd_signal
                .unwrap_or(self.macd * crate::indicators::MACD_SIGNAL_FACTOR),
            atr: self.atr,
            volume: self.volume.unwrap_or(0.0).max(0.0) as u64,
            bollinger,
            timestamp: parse_loose_timestamp(&self.timestamp).unwrap_or_else(UtcDateTime::now),
            is_synthetic: self.is_fallback,
            error_message: self
                .is_fallback
                .then(|| String::from("backend served fallback indicators")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BackendSearchResult {
    symbol: String,
    #[serde(default)]
    name: String,
    exchange: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    currency: Option<String>,
}

impl BackendSearchResult {
    fn into_instrument(self) -> Option<Instrument> {
        let symbol = Symbol::parse(&self.symbol).ok()?;
        let name = if self.name.is_empty() {
            symbol.as_str().to_owned()
        } else {
            self.name
        };
        Some(Instrument {
            symbol,
            name,
            exchange: self.exchange.filter(|value| !value.is_empty()),
            currency: self.currency.filter(|value| !value.is_empty()),
            asset_class: self
                .kind
                .as_deref()
                .map(AssetClass::from_quote_type)
                .unwrap_or(AssetClass::Other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpError, HttpMethod, HttpResponse};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn answering(body: &str) -> Self {
            Self {
                response: Ok(HttpResponse::ok_json(body)),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn status(status: u16) -> Self {
            Self {
                response: Ok(HttpResponse::with_status(status, "")),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn derives_websocket_urls() {
        assert_eq!(ws_url_for("http://localhost:8000"), "ws://localhost:8000/ws");
        assert_eq!(ws_url_for("https://api.example.com/"), "wss://api.example.com/ws");
        assert_eq!(ws_url_for("HTTPS://Api.Example.com"), "wss://Api.Example.com/ws");
    }

    #[test]
    fn parses_naive_and_millisecond_timestamps() {
        let naive = parse_loose_timestamp(&json!("2024-01-01T09:15:00.123456"))
            .expect("naive iso timestamp");
        assert_eq!(naive.unix_seconds(), 1_704_100_500);

        let millis = parse_loose_timestamp(&json!(1_704_067_200_000_i64)).expect("millis");
        assert_eq!(millis.format_rfc3339(), "2024-01-01T00:00:00Z");

        assert!(parse_loose_timestamp(&json!(null)).is_none());
    }

    #[tokio::test]
    async fn quote_posts_symbol_period_and_interval() {
        let client = Arc::new(RecordingHttpClient::answering(
            r#"{"symbol":"NIFTY","currentPrice":22100.5,"previousClose":22000.0,
                "volume":1500,"marketCap":0,"currency":"INR","exchangeName":"NSE",
                "marketState":"REGULAR","timestamp":"2024-01-01T09:15:00"}"#,
        ));
        let backend = BackendClient::new(client.clone(), "http://localhost:8000/")
            .with_auth(HttpAuth::BearerToken(String::from("secret")));

        let quote = BackendClient::quote(&backend, &symbol("NIFTY"))
            .await
            .expect("quote");

        assert!((quote.daily_change - 100.5).abs() < 1e-9);
        assert!(!quote.is_synthetic);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://localhost:8000/api/quote");
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer secret")
        );
        let sent: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(sent, json!({"symbol": "NIFTY", "period": "1d", "interval": "5m"}));
    }

    #[tokio::test]
    async fn backend_fallback_quote_is_flagged_synthetic() {
        let client = Arc::new(RecordingHttpClient::answering(
            r#"{"currentPrice":45300.0,"previousClose":45250,"isFallback":true,
                "errorMessage":"Using fallback data - Yahoo Finance API unavailable"}"#,
        ));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);

        let quote = BackendClient::quote(&backend, &symbol("BANKNIFTY"))
            .await
            .expect("quote");

        assert!(quote.is_synthetic);
        assert_eq!(
            quote.error_message.as_deref(),
            Some("Using fallback data - Yahoo Finance API unavailable")
        );
    }

    #[tokio::test]
    async fn quote_without_price_is_parse_error() {
        let client = Arc::new(RecordingHttpClient::answering(r#"{"status":"ok"}"#));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);

        let error = BackendClient::quote(&backend, &symbol("NIFTY"))
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let client = Arc::new(RecordingHttpClient::status(500));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);

        let error = backend.health().await.expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Transport);
        assert!(error.message().contains("status: 500"));
    }

    #[tokio::test]
    async fn health_uses_probe_timeout() {
        let client = Arc::new(RecordingHttpClient::answering(r#"{"status":"healthy"}"#));
        let backend =
            BackendClient::new(client.clone(), DEFAULT_BACKEND_URL).with_health_timeout_ms(750);

        backend.health().await.expect("healthy");

        let requests = client.recorded_requests();
        assert_eq!(requests[0].url, "http://localhost:8000/health");
        assert_eq!(requests[0].timeout_ms, 750);
    }

    #[tokio::test]
    async fn chart_keeps_vwap_and_fallback_flag() {
        let client = Arc::new(RecordingHttpClient::answering(
            r#"[{"timestamp":1704067200000,"open":10,"high":12,"low":9,"close":11,
                 "volume":100,"rsi":50,"macd":0,"vwap":10.5,"isFallback":true}]"#,
        ));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);
        let request = ChartRequest::new(symbol("NIFTY"), Period::OneDay, Interval::FiveMinutes);

        let bars = BackendClient::chart(&backend, &request).await.expect("chart");

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].vwap, Some(10.5));
        assert!(bars[0].is_synthetic);
    }

    #[tokio::test]
    async fn quotes_require_one_entry_per_symbol() {
        let client = Arc::new(RecordingHttpClient::answering(r#"[{"currentPrice":1.0}]"#));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);

        let error = backend
            .quotes(&[symbol("A"), symbol("B")])
            .await
            .expect_err("length mismatch");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }

    #[tokio::test]
    async fn indicators_drop_zeroed_bollinger_bands() {
        let client = Arc::new(RecordingHttpClient::answering(
            r#"{"symbol":"NIFTY","rsi":61.2,"macd":12.0,"macdSignal":10.8,"atr":140.0,
                "bollingerUpper":0,"bollingerMiddle":0,"bollingerLower":0,"volume":2000}"#,
        ));
        let backend = BackendClient::new(client, DEFAULT_BACKEND_URL);

        let snapshot = backend
            .technical_indicators(&symbol("NIFTY"), Period::OneMonth)
            .await
            .expect("indicators");

        assert_eq!(snapshot.rsi, 61.2);
        assert_eq!(snapshot.macd_signal, 10.8);
        assert!(snapshot.bollinger.is_none());
        assert_eq!(snapshot.volume, 2_000);
    }

    #[tokio::test]
    async fn search_encodes_query_in_path() {
        let client = Arc::new(RecordingHttpClient::answering(
            r#"[{"symbol":"TCS.NS","name":"Tata Consultancy","exchange":"NSI","type":"EQUITY","currency":"INR"}]"#,
        ));
        let backend = BackendClient::new(client.clone(), DEFAULT_BACKEND_URL);
        let request = SearchRequest::new("tata consultancy", 10).expect("request");

        let results = BackendClient::search(&backend, &request).await.expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].asset_class, AssetClass::Equity);
        assert_eq!(
            client.recorded_requests()[0].url,
            "http://localhost:8000/api/search/tata%20consultancy"
        );
    }
}
