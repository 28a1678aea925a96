use tickdesk_core::{BackendRouter, Symbol};

use crate::cli::{QuoteArgs, SymbolArgs};
use crate::error::CliError;

use super::{parse_symbols, CommandResult};

pub async fn run(args: &QuoteArgs, router: &BackendRouter) -> Result<CommandResult, CliError> {
    let symbols = parse_symbols(&args.symbols)?;

    if let [symbol] = symbols.as_slice() {
        let routed = router.quote(symbol).await;
        return CommandResult::from_routed(routed.map_data(|quote| vec![quote]));
    }
    CommandResult::from_routed(router.quotes(&symbols).await)
}

pub async fn enhanced(args: &SymbolArgs, router: &BackendRouter) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let routed = router.enhanced_quote(&symbol).await;
    let partial = !routed.data.errors.is_empty();
    Ok(CommandResult::from_routed(routed)?.with_partial(partial))
}
