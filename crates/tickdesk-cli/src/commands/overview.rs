use tickdesk_core::BackendRouter;

use crate::error::CliError;

use super::CommandResult;

pub async fn run(router: &BackendRouter) -> Result<CommandResult, CliError> {
    CommandResult::from_routed(router.market_overview().await)
}
