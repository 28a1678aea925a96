use serde_json::json;
use tickdesk_core::{BackendRouter, SourceError, StreamMessage, Symbol};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::render_line;

use super::CommandResult;

enum StreamEvent {
    Message(StreamMessage),
    Error(SourceError),
    Closed,
}

/// Prints every inbound frame as it arrives, then a summary report.
pub async fn run(
    args: &WatchArgs,
    router: &BackendRouter,
    format: OutputFormat,
    pretty: bool,
) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let message_tx = tx.clone();
    let error_tx = tx.clone();

    let handle = router.subscribe(
        symbol.clone(),
        move |message| {
            let _ = message_tx.send(StreamEvent::Message(message));
        },
        move |error| {
            let _ = error_tx.send(StreamEvent::Error(error));
        },
        move || {
            let _ = tx.send(StreamEvent::Closed);
        },
    );
    info!(symbol = %symbol, url = %router.backend().ws_url(), "watching");

    let mut received = 0_usize;
    let mut errors = Vec::new();
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        match event {
            Some(StreamEvent::Message(message)) => {
                render_line(message.as_value(), format, pretty)?;
                received += 1;
                if args.limit.is_some_and(|limit| received >= limit) {
                    break;
                }
            }
            Some(StreamEvent::Error(error)) => {
                warn!(symbol = %symbol, error = %error, "stream error");
                errors.push(error.to_string());
            }
            Some(StreamEvent::Closed) | None => break,
        }
    }
    handle.close();

    if received == 0 && !errors.is_empty() {
        return Err(CliError::Stream(errors.join("; ")));
    }

    let data = json!({
        "symbol": symbol,
        "url": router.backend().ws_url(),
        "received": received,
        "errors": errors,
    });
    Ok(CommandResult::ok(data).with_partial(!errors.is_empty()))
}
