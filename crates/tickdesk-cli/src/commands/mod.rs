mod batch;
mod overview;
mod quote;
mod search;
mod series;
mod watch;

use serde::Serialize;
use serde_json::Value;
use tickdesk_core::{
    Availability, BackendRouter, BackendRouterBuilder, DataSourceHandle, Routed, Symbol,
    UtcDateTime,
};
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output::{Report, ReportMeta};

pub struct CommandResult {
    pub data: Value,
    pub handle: Option<DataSourceHandle>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
    /// Some part of the answer is an error entry; the process exits with 3.
    pub partial: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            handle: None,
            warnings: Vec::new(),
            latency_ms: 0,
            partial: false,
        }
    }

    pub fn from_routed<T: Serialize>(routed: Routed<T>) -> Result<Self, CliError> {
        Ok(Self {
            data: serde_json::to_value(&routed.data)?,
            handle: Some(routed.handle),
            warnings: routed.warnings,
            latency_ms: routed.latency_ms,
            partial: false,
        })
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn into_report(self) -> Report {
        Report {
            meta: ReportMeta {
                request_id: Uuid::new_v4(),
                generated_at: UtcDateTime::now(),
                handle: self.handle,
                latency_ms: self.latency_ms,
                warnings: self.warnings,
            },
            data: self.data,
        }
    }
}

pub fn build_router(cli: &Cli) -> BackendRouter {
    let mut builder = BackendRouterBuilder::from_env();
    if cli.offline {
        builder = builder.offline();
    }
    if let Some(url) = &cli.backend_url {
        builder = builder.with_backend_url(url.as_str());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        builder = builder.with_timeout_ms(timeout_ms);
    }
    if let Some(seed) = cli.seed {
        builder = builder.with_seed(seed);
    }
    builder.build()
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let router = build_router(cli);

    match &cli.command {
        Command::Quote(args) => quote::run(args, &router).await,
        Command::Series(args) => series::run(args, &router).await,
        Command::Indicators(args) => series::indicators(args, &router).await,
        Command::Enhanced(args) => quote::enhanced(args, &router).await,
        Command::Search(args) => search::run(args, &router).await,
        Command::Batch(args) => batch::run(args, &router).await,
        Command::Overview => overview::run(&router).await,
        Command::Health => health(&router).await,
        Command::Watch(args) => watch::run(args, &router, cli.format, cli.pretty).await,
    }
}

async fn health(router: &BackendRouter) -> Result<CommandResult, CliError> {
    let availability = router.health().await;
    let data = serde_json::json!({
        "backend_url": router.backend().base_url(),
        "status": availability,
    });
    Ok(CommandResult::ok(data).with_partial(availability != Availability::Available))
}

pub(crate) fn parse_symbols(raw: &[String]) -> Result<Vec<Symbol>, CliError> {
    raw.iter()
        .map(|value| Symbol::parse(value).map_err(CliError::from))
        .collect()
}
