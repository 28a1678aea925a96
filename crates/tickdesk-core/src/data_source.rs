//! Upstream adapter contract and request types.
//!
//! Both the primary backend and the third-party quote API implement
//! [`DataSource`], so [`QuoteProvider`](crate::QuoteProvider) and
//! [`SeriesProvider`](crate::SeriesProvider) can wrap either one.
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | Quote | [`Symbol`] | [`Quote`] |
//! | Chart | [`ChartRequest`] | `Vec<Bar>` |
//! | Search | [`SearchRequest`] | `Vec<Instrument>` |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::http_client::{HttpError, HttpErrorKind};
use crate::{Bar, Instrument, Interval, Period, Quote, Symbol, ValidationError};

/// Maximum number of search results returned by any source.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Identifies an upstream adapter in logs and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Backend,
    Yahoo,
}

impl SourceId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Yahoo => "yahoo",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Connection failure, timeout or non-success status.
    Transport,
    /// The payload could not be decoded into the expected shape.
    Parse,
    /// The upstream answered but had no data for the request.
    EmptyResult,
    /// The request itself was malformed.
    InvalidInput,
}

/// Structured upstream error. Providers turn every kind except
/// `InvalidInput` into a synthetic result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, url: &str) -> Self {
        Self::transport(format!("HTTP error! status: {status} ({url})"))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn empty_result(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::EmptyResult,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidInput,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_recoverable(&self) -> bool {
        !matches!(self.kind, SourceErrorKind::InvalidInput)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Transport => "source.transport",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::EmptyResult => "source.empty_result",
            SourceErrorKind::InvalidInput => "source.invalid_input",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<HttpError> for SourceError {
    fn from(value: HttpError) -> Self {
        match value.kind() {
            HttpErrorKind::Timeout => Self::transport(format!("request timeout: {value}")),
            HttpErrorKind::Connect => Self::transport(format!("connection failed: {value}")),
            HttpErrorKind::Body | HttpErrorKind::Other => Self::transport(value.message()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(value: serde_json::Error) -> Self {
        Self::parse(format!("failed to decode response: {value}"))
    }
}

/// Request payload for chart endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
}

impl ChartRequest {
    pub fn new(symbol: Symbol, period: Period, interval: Interval) -> Self {
        Self {
            symbol,
            period,
            interval,
        }
    }
}

/// Request payload for search endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
}

impl SearchRequest {
    /// Limit is clamped to `1..=MAX_SEARCH_RESULTS`.
    pub fn new(query: impl Into<String>, limit: usize) -> Result<Self, ValidationError> {
        let query = query.into().trim().to_owned();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(Self {
            query,
            limit: limit.clamp(1, MAX_SEARCH_RESULTS),
        })
    }
}

/// Upstream adapter contract.
///
/// Implementations perform exactly one attempt per call and report failures
/// as [`SourceError`]; fallback policy lives in the providers and router.
pub trait DataSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Fetches a single normalized quote.
    fn quote<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>>;

    /// Fetches raw OHLCV bars. Ordering and indicator columns are the
    /// caller's concern.
    fn chart<'a>(
        &'a self,
        req: &'a ChartRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Bar>, SourceError>> + Send + 'a>>;

    fn search<'a>(
        &'a self,
        req: &'a SearchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Instrument>, SourceError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_clamps_limit() {
        let request = SearchRequest::new("  reliance ", 50).expect("valid");
        assert_eq!(request.query, "reliance");
        assert_eq!(request.limit, MAX_SEARCH_RESULTS);
        assert_eq!(SearchRequest::new("x", 0).expect("valid").limit, 1);
    }

    #[test]
    fn search_request_rejects_blank_query() {
        assert_eq!(
            SearchRequest::new("   ", 5),
            Err(ValidationError::EmptyQuery)
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::transport("x").code(), "source.transport");
        assert_eq!(SourceError::parse("x").code(), "source.parse");
        assert_eq!(SourceError::empty_result("x").code(), "source.empty_result");
        assert!(!SourceError::invalid_input("x").is_recoverable());
        assert!(SourceError::http_status(503, "http://h/api").is_recoverable());
    }

    #[test]
    fn http_errors_map_to_transport() {
        let err = SourceError::from(HttpError::new("connection failed"));
        assert_eq!(err.kind(), SourceErrorKind::Transport);
        assert_eq!(err.message(), "connection failed");
    }
}
