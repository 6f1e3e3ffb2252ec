use crate::cli::OutputFormat;
use crate::reconcile::duplicates;
use crate::types::ReconciliationResult;
use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use std::io::Write;

/// Header printed above every report.
pub fn banner(now: DateTime<Local>) -> String {
    format!(
        " ================ {} ===============  ",
        now.format("%Y-%m-%d %H:%M:%S%.f %z")
    )
}

/// Serialize the result map; JSON is indented with two spaces.
pub fn render(result: &ReconciliationResult, format: OutputFormat) -> anyhow::Result<String> {
    let body = match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Yaml => serde_yaml::to_string(result)?,
    };
    Ok(body)
}

/// One block per stream that more than one agent claims.
pub fn duplicate_summary(result: &ReconciliationResult) -> Vec<String> {
    duplicates(result)
        .into_iter()
        .map(|(stream, pods)| {
            format!(
                " ============ Multi-MA own the same stream!! ============\n | Stream ID: {}\n | MA: {}",
                stream,
                pods.join(", ")
            )
        })
        .collect()
}

pub fn write_report<W: Write>(
    out: &mut W,
    result: &ReconciliationResult,
    format: OutputFormat,
    color: bool,
) -> anyhow::Result<()> {
    writeln!(out, "{}", banner(Local::now()))?;
    let body = render(result, format)?;
    writeln!(out, "{}", body.trim_end())?;
    for block in duplicate_summary(result) {
        if color {
            writeln!(out, "{}", block.red().bold())?;
        } else {
            writeln!(out, "{}", block)?;
        }
    }
    out.flush()?;
    Ok(())
}
