use tickdesk_core::BackendRouter;

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SearchArgs, router: &BackendRouter) -> Result<CommandResult, CliError> {
    let routed = router.search(&args.query).await?;
    CommandResult::from_routed(routed)
}
