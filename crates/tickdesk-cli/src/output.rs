use serde::Serialize;
use serde_json::Value;
use tickdesk_core::{DataSourceHandle, UtcDateTime};
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Metadata printed alongside every command's data.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub request_id: Uuid,
    pub generated_at: UtcDateTime,
    pub handle: Option<DataSourceHandle>,
    pub latency_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub data: Value,
}

pub fn render(report: &Report, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", to_json(report, pretty)?),
        OutputFormat::Table => render_table(report)?,
    }
    Ok(())
}

/// One streamed value per line, in the chosen format.
pub fn render_line(value: &Value, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", to_json(value, pretty)?),
        OutputFormat::Table => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(payload)
}

fn render_table(report: &Report) -> Result<(), CliError> {
    println!("request_id  : {}", report.meta.request_id);
    println!("generated_at: {}", report.meta.generated_at);
    if let Some(handle) = report.meta.handle {
        println!("source      : {handle}");
    }
    println!("latency_ms  : {}", report.meta.latency_ms);

    if !report.meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.meta.warnings {
            println!("  - {warning}");
        }
    }

    println!("data:");
    let pretty_data = serde_json::to_string_pretty(&report.data)?;
    for line in pretty_data.lines() {
        println!("  {line}");
    }

    Ok(())
}
