use tickdesk_core::{BackendRouter, Interval, Period, Symbol};

use crate::cli::{SeriesArgs, SymbolArgs};
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SeriesArgs, router: &BackendRouter) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let period: Period = args.period.parse()?;
    let interval: Interval = args.interval.parse()?;

    CommandResult::from_routed(router.series(&symbol, period, interval).await)
}

pub async fn indicators(
    args: &SymbolArgs,
    router: &BackendRouter,
) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    CommandResult::from_routed(router.indicators(&symbol).await)
}
