//! Contract shared by every upstream data source: the same request shapes
//! produce the same domain invariants regardless of which upstream answered.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tickdesk_core::{
    BackendClient, ChartRequest, DataSource, HttpClient, HttpError, HttpRequest, HttpResponse,
    Interval, Period, SearchRequest, SourceErrorKind, SourceId, YahooAdapter,
};
use tickdesk_tests::symbol;

/// Serves canned payloads for both the backend and Yahoo endpoints.
struct CannedHttpClient;

const YAHOO_QUOTE: &str = r#"{"quoteResponse":{"result":[{
    "regularMarketPrice": 1650.5,
    "regularMarketPreviousClose": 1640.0,
    "regularMarketVolume": 250000,
    "regularMarketTime": 1709280000,
    "currency": "INR",
    "fullExchangeName": "NSE",
    "marketState": "REGULAR"
}]}}"#;

const YAHOO_CHART: &str = r#"{"chart":{"result":[{
    "timestamp": [1709280000, 1709280300, 1709280600],
    "indicators": {"quote": [{
        "open":   [100.0, 101.0, 102.0],
        "high":   [101.5, 102.5, 103.0],
        "low":    [99.5, 100.5, 101.5],
        "close":  [101.0, 102.0, 102.5],
        "volume": [1000, 1200, 900]
    }]}
}],"error":null}}"#;

const YAHOO_SEARCH: &str = r#"{"quotes":[
    {"symbol":"HDFCBANK.NS","shortname":"HDFC Bank","exchDisp":"NSE","quoteType":"EQUITY","currency":"INR"},
    {"symbol":"HDFCLIFE.NS","shortname":"HDFC Life","exchDisp":"NSE","quoteType":"EQUITY","currency":"INR"},
    {"symbol":"HDFCAMC.NS","longname":"HDFC AMC","exchDisp":"NSE","quoteType":"EQUITY","currency":"INR"}
]}"#;

const BACKEND_QUOTE: &str = r#"{"symbol":"HDFCBANK","currentPrice":1650.5,"previousClose":1640.0,
    "volume":250000,"currency":"INR","exchangeName":"NSE","marketState":"REGULAR",
    "timestamp":"2024-03-01T09:15:00"}"#;

const BACKEND_CHART: &str = r#"[
    {"timestamp":1709280000000,"open":100.0,"high":101.5,"low":99.5,"close":101.0,"volume":1000},
    {"timestamp":1709280300000,"open":101.0,"high":102.5,"low":100.5,"close":102.0,"volume":1200},
    {"timestamp":1709280600000,"open":102.0,"high":103.0,"low":101.5,"close":102.5,"volume":900}
]"#;

const BACKEND_SEARCH: &str = r#"[
    {"symbol":"HDFCBANK","name":"HDFC Bank","exchange":"NSE","type":"EQUITY","currency":"INR"},
    {"symbol":"HDFCLIFE","name":"HDFC Life","exchange":"NSE","type":"EQUITY","currency":"INR"},
    {"symbol":"HDFCAMC","name":"HDFC AMC","exchange":"NSE","type":"EQUITY","currency":"INR"}
]"#;

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let url = request.url.as_str();
            let body = if url.contains("fc.yahoo.com") {
                return Ok(HttpResponse::with_status(404, ""));
            } else if url.contains("/getcrumb") {
                "crumb123"
            } else if url.contains("/v7/finance/quote") {
                YAHOO_QUOTE
            } else if url.contains("/v8/finance/chart") {
                YAHOO_CHART
            } else if url.contains("/v1/finance/search") {
                YAHOO_SEARCH
            } else if url.ends_with("/api/quote") {
                BACKEND_QUOTE
            } else if url.ends_with("/api/chart") {
                BACKEND_CHART
            } else if url.contains("/api/search/") {
                BACKEND_SEARCH
            } else {
                return Err(HttpError::new(format!("unexpected url {url}")));
            };
            Ok(HttpResponse::ok_json(body))
        })
    }
}

/// Refuses every request.
struct DownHttpClient;

impl HttpClient for DownHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async { Err(HttpError::new("connection refused")) })
    }
}

fn sources(http_client: Arc<dyn HttpClient>) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(BackendClient::new(
            Arc::clone(&http_client),
            "http://backend.test",
        )),
        Arc::new(YahooAdapter::new(http_client)),
    ]
}

#[tokio::test]
async fn quote_keeps_caller_symbol_and_change_invariant() {
    for source in sources(Arc::new(CannedHttpClient)) {
        let quote = source
            .quote(&symbol("HDFCBANK"))
            .await
            .unwrap_or_else(|error| panic!("source '{}' quote failed: {error}", source.id()));

        assert_eq!(quote.symbol.as_str(), "HDFCBANK", "source '{}'", source.id());
        assert_eq!(quote.current_price, 1650.5, "source '{}'", source.id());
        assert!(
            (quote.daily_change - (quote.current_price - quote.previous_close)).abs() < 1e-6,
            "source '{}': daily_change invariant",
            source.id()
        );
        assert_eq!(quote.currency, "INR", "source '{}'", source.id());
        assert!(!quote.is_synthetic, "source '{}'", source.id());
    }
}

#[tokio::test]
async fn chart_bars_satisfy_ohlc_invariants() {
    let request = ChartRequest::new(symbol("NIFTY"), Period::OneDay, Interval::FiveMinutes);

    for source in sources(Arc::new(CannedHttpClient)) {
        let bars = source
            .chart(&request)
            .await
            .unwrap_or_else(|error| panic!("source '{}' chart failed: {error}", source.id()));

        assert_eq!(bars.len(), 3, "source '{}': bar count", source.id());
        for bar in &bars {
            assert!(bar.low <= bar.open.min(bar.close), "source '{}'", source.id());
            assert!(bar.high >= bar.open.max(bar.close), "source '{}'", source.id());
        }
        for pair in bars.windows(2) {
            assert!(pair[0].ts < pair[1].ts, "source '{}': ascending", source.id());
        }
    }
}

#[tokio::test]
async fn search_respects_limit() {
    let request = SearchRequest::new("hdfc", 2).expect("valid query");

    for source in sources(Arc::new(CannedHttpClient)) {
        let results = source
            .search(&request)
            .await
            .unwrap_or_else(|error| panic!("source '{}' search failed: {error}", source.id()));

        assert_eq!(results.len(), 2, "source '{}': limit", source.id());
        assert_eq!(results[0].name, "HDFC Bank", "source '{}'", source.id());
    }
}

#[tokio::test]
async fn unreachable_upstream_is_a_recoverable_transport_error() {
    for source in sources(Arc::new(DownHttpClient)) {
        let error = source
            .quote(&symbol("TCS"))
            .await
            .expect_err("refused transport must fail");

        assert_eq!(error.kind(), SourceErrorKind::Transport, "source '{}'", source.id());
        assert!(error.is_recoverable(), "source '{}'", source.id());
    }
}

#[test]
fn source_ids_are_distinct() {
    assert_ne!(SourceId::Backend.as_str(), SourceId::Yahoo.as_str());
}
