//! # Tickdesk Core
//!
//! Market data access layer for the Tickdesk analytics desk.
//!
//! ## Overview
//!
//! - **Domain models** for quotes, bars, series and indicator snapshots
//! - **Indicator math** (EMA, RSI, MACD, ATR, Bollinger bands, VWAP)
//! - **Upstream adapters** for the primary analytics backend and Yahoo Finance
//! - **Providers** that never fail, degrading to flagged synthetic data
//! - **Routing** between the backend and the fallback source, driven by a
//!   health probe on every call
//! - **Streaming** quote subscriptions over the backend WebSocket
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Backend and Yahoo Finance clients |
//! | [`config`] | Environment-driven configuration |
//! | [`data_source`] | Data source trait, requests and `SourceError` |
//! | [`domain`] | Domain models (Symbol, Quote, Bar, BarSeries, ...) |
//! | [`error`] | Input validation errors |
//! | [`http_client`] | HTTP transport seam |
//! | [`indicators`] | Technical indicator functions |
//! | [`quote_provider`] | Quote access with synthetic fallback |
//! | [`random`] | Injectable randomness |
//! | [`routing`] | Backend router, batch and overview operations |
//! | [`series_provider`] | Historical series and indicator snapshots |
//! | [`streaming`] | WebSocket subscriptions |
//! | [`synthetic`] | Synthetic quote and series generation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickdesk_core::{BackendRouterBuilder, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = BackendRouterBuilder::from_env().build();
//!
//!     let routed = router.quote(&Symbol::parse("BANKNIFTY")?).await;
//!     println!(
//!         "{} {:.2} ({:+.2}%) via {}",
//!         routed.data.symbol,
//!         routed.data.current_price,
//!         routed.data.daily_change_percent,
//!         routed.handle
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  BackendRouter  │────▶│ Streaming (WS)   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Quote / Series  │────▶│ Fallback         │
//! │ providers       │     │ generator        │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Source     │────▶│ HTTP Client      │
//! │ (Backend/Yahoo) │     │ (reqwest/offline)│
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Invalid input is rejected with [`ValidationError`]. Upstream failures are
//! [`SourceError`]s; the providers turn them into synthetic results:
//!
//! ```rust
//! use tickdesk_core::{SourceError, SourceErrorKind};
//!
//! fn describe(error: &SourceError) -> &'static str {
//!     match error.kind() {
//!         SourceErrorKind::Transport => "upstream unreachable",
//!         SourceErrorKind::Parse => "unexpected payload",
//!         SourceErrorKind::EmptyResult => "no data",
//!         SourceErrorKind::InvalidInput => "bad request",
//!     }
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod indicators;
pub mod quote_provider;
pub mod random;
pub mod routing;
pub mod series_provider;
pub mod streaming;
pub mod synthetic;

// Adapter implementations
pub use adapters::{BackendClient, YahooAdapter, YahooAuthManager};

// Configuration
pub use config::MarketDataConfig;

// Data source trait and types
pub use data_source::{
    ChartRequest, DataSource, SearchRequest, SourceError, SourceErrorKind, SourceId,
};

// Domain models
pub use domain::{
    change_between, validate_currency_code, AssetClass, Bar, BarSeries, BollingerBands,
    DataSourceHandle, IndicatorSnapshot, Instrument, Interval, MarketState, Period, Quote, Symbol,
    UtcDateTime,
};

// Error types
pub use error::ValidationError;

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    OfflineHttpClient, ReqwestHttpClient,
};

// Providers
pub use quote_provider::QuoteProvider;
pub use series_provider::{snapshot_from_series, SeriesProvider};

// Randomness and synthetic data
pub use random::{FastRandSource, RandomSource};
pub use synthetic::{fallback_message, FallbackConfig, FallbackGenerator, FALLBACK_MESSAGE};

// Routing types
pub use routing::{
    Availability, BackendRouter, BackendRouterBuilder, BatchEntry, BatchResult, DataKind,
    EnhancedQuote, ErrorResult, MarketOverview, MarketSentiment, Routed, Sentiment,
};

// Streaming
pub use streaming::{StreamMessage, SubscriptionHandle};
