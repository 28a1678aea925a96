//! CLI argument definitions for Tickdesk.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Latest quote(s) for symbols |
//! | `series` | Historical OHLCV series with RSI/MACD columns |
//! | `indicators` | Indicator snapshot for a symbol |
//! | `enhanced` | Quote, indicators and intraday chart in one call |
//! | `search` | Symbol search |
//! | `batch` | Several data kinds for several symbols |
//! | `overview` | Headline indices and market sentiment |
//! | `health` | Probe the primary backend |
//! | `watch` | Stream live quote updates |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--offline` | `false` | Never touch the network; all data synthetic |
//! | `--backend-url` | env / `http://localhost:8000` | Primary backend base URL |
//! | `--timeout-ms` | env / `30000` | Request timeout in ms |
//! | `--seed` | none | Seed for synthetic data |
//!
//! # Examples
//!
//! ```bash
//! tickdesk quote BANKNIFTY NIFTY --pretty
//! tickdesk series HDFCBANK --period 3mo --interval 1d --format table
//! tickdesk batch NIFTY TCS --kind quote --kind indicators
//! tickdesk --offline --seed 7 overview
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Tickdesk - NSE market data desk
///
/// Quotes, series and indicators from the analytics backend, with Yahoo
/// Finance and synthetic data as fallbacks.
#[derive(Debug, Parser)]
#[command(
    name = "tickdesk",
    author,
    version,
    about = "NSE market data desk CLI",
    long_about = "Tickdesk fetches quotes, historical series and technical indicators from \
the analytics backend. When the backend is down it falls back to Yahoo Finance, and when \
that fails too it answers with clearly flagged synthetic data.\n\
\n\
Logging goes to stderr and is controlled by TICKDESK_LOG (default: warn)."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Refuse every upstream request; all results are synthetic.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Primary backend base URL (overrides TICKDESK_BACKEND_URL).
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Per-request timeout in milliseconds (overrides TICKDESK_REQUEST_TIMEOUT_MS).
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Seed for synthetic data, for reproducible offline output.
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text for terminal display.
    Table,
    /// Single JSON object.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch latest quote(s) for one or more symbols.
    ///
    ///   tickdesk quote BANKNIFTY
    ///   tickdesk quote NIFTY TCS INFY --pretty
    Quote(QuoteArgs),

    /// Fetch a historical series.
    ///
    ///   tickdesk series NIFTY --period 5d --interval 15m
    Series(SeriesArgs),

    /// Technical indicator snapshot over the last month of daily bars.
    Indicators(SymbolArgs),

    /// Quote, indicators and intraday chart, reporting failed parts.
    Enhanced(SymbolArgs),

    /// Search symbols by name or ticker.
    Search(SearchArgs),

    /// Fetch several data kinds for several symbols at once.
    ///
    ///   tickdesk batch NIFTY BANKNIFTY --kind quote --kind chart
    Batch(BatchArgs),

    /// Headline NSE indices with an up/down sentiment summary.
    Overview,

    /// Probe the primary backend.
    Health,

    /// Stream live quote updates from the backend WebSocket.
    ///
    ///   tickdesk watch BANKNIFTY --limit 5
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// One or more symbols (e.g., NIFTY, BANKNIFTY, HDFCBANK).
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    pub symbol: String,

    /// Lookback window: 1d, 5d, 1mo, 3mo, 6mo, 1y.
    #[arg(long, default_value = "1mo")]
    pub period: String,

    /// Bar spacing: 1m, 5m, 15m, 1h, 1d, 1w.
    #[arg(long, default_value = "1d")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-text query.
    pub query: String,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// Data kinds to fetch: quote, chart, indicators. Repeatable; all kinds
    /// when omitted.
    #[arg(long = "kind")]
    pub kinds: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub symbol: String,

    /// Stop after this many messages.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tickdesk", "quote", "NIFTY", "TCS", "--offline", "--seed", "7", "--pretty",
        ])
        .expect("valid arguments");

        assert!(cli.offline);
        assert!(cli.pretty);
        assert_eq!(cli.seed, Some(7));
        match cli.command {
            Command::Quote(args) => assert_eq!(args.symbols, vec!["NIFTY", "TCS"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn series_defaults() {
        let cli = Cli::try_parse_from(["tickdesk", "series", "NIFTY"]).expect("valid arguments");
        match cli.command {
            Command::Series(args) => {
                assert_eq!(args.period, "1mo");
                assert_eq!(args.interval, "1d");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn batch_collects_repeated_kinds() {
        let cli = Cli::try_parse_from([
            "tickdesk", "batch", "A", "B", "--kind", "quote", "--kind", "chart",
        ])
        .expect("valid arguments");
        match cli.command {
            Command::Batch(args) => {
                assert_eq!(args.symbols, vec!["A", "B"]);
                assert_eq!(args.kinds, vec!["quote", "chart"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quote_requires_a_symbol() {
        assert!(Cli::try_parse_from(["tickdesk", "quote"]).is_err());
    }
}
