use tickdesk_core::{BackendRouter, DataKind};

use crate::cli::BatchArgs;
use crate::error::CliError;

use super::{parse_symbols, CommandResult};

pub async fn run(args: &BatchArgs, router: &BackendRouter) -> Result<CommandResult, CliError> {
    let symbols = parse_symbols(&args.symbols)?;
    let kinds = if args.kinds.is_empty() {
        DataKind::ALL.to_vec()
    } else {
        args.kinds
            .iter()
            .map(|raw| raw.parse::<DataKind>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let routed = router.get_batch(&symbols, &kinds).await;
    let failed = routed
        .data
        .values()
        .flat_map(|entries| entries.values())
        .filter(|entry| entry.is_error())
        .count();

    let mut result = CommandResult::from_routed(routed)?.with_partial(failed > 0);
    if failed > 0 {
        result
            .warnings
            .push(format!("{failed} batch entr{} failed", if failed == 1 { "y" } else { "ies" }));
    }
    Ok(result)
}
