use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::data_source::{DataSource, SourceError, SourceId};
use crate::synthetic::{fallback_message, FallbackGenerator};
use crate::{Quote, Symbol};

/// Quote access over one upstream source.
///
/// `get_quote` never fails: transport, parse and empty-result errors are
/// replaced by a synthetic quote.
#[derive(Clone)]
pub struct QuoteProvider {
    source: Arc<dyn DataSource>,
    fallback: Arc<FallbackGenerator>,
}

impl QuoteProvider {
    pub fn new(source: Arc<dyn DataSource>, fallback: Arc<FallbackGenerator>) -> Self {
        Self { source, fallback }
    }

    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    /// Single upstream attempt with the raw outcome.
    pub async fn try_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        self.source.quote(symbol).await
    }

    pub async fn get_quote(&self, symbol: &Symbol) -> Quote {
        match self.try_quote(symbol).await {
            Ok(quote) => quote,
            Err(error) => self.synthetic_quote(symbol, &error),
        }
    }

    /// One quote per input symbol, in input order. Symbols are fetched
    /// concurrently and a failure only affects its own entry.
    pub async fn get_multiple_quotes(&self, symbols: &[Symbol]) -> Vec<Quote> {
        join_all(symbols.iter().map(|symbol| self.get_quote(symbol))).await
    }

    pub(crate) fn synthetic_quote(&self, symbol: &Symbol, error: &SourceError) -> Quote {
        warn!(
            symbol = %symbol,
            source = %self.source.id(),
            code = error.code(),
            error = error.message(),
            "quote fetch failed, serving synthetic quote"
        );
        self.fallback.quote(symbol, fallback_message(error))
    }
}
