//! Output renderers for tracker views, history rows and command results.

use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rushia_tracker::projector::{project_progress, project_record};
use rushia_tracker::{
    HistoryRow, ProgressView, RestoreOutcome, RowAction, TaskRecord, TaskSnapshot, ViewState,
};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

fn print_json_pretty<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

/// One line per progress update; JSON lines when watching in JSON mode.
pub(crate) fn render_progress(view: &ProgressView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(view),
        OutputFormat::Table => {
            println!("{}", progress_line(view));
            Ok(())
        }
    }
}

pub(crate) fn progress_line(view: &ProgressView) -> String {
    let title = view.title.as_deref().unwrap_or("-");
    format!(
        "{} {:>6} | {} | eta {} | {} | {}",
        view.label, view.percent_text, view.speed, view.eta, view.size, title
    )
}

/// Render a settled or idle view.
pub(crate) fn render_view(view: &ViewState, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json_pretty(view),
        OutputFormat::Table => {
            match view {
                ViewState::Idle => println!("No task is being followed."),
                ViewState::Progress(progress) => println!("{}", progress_line(progress)),
                ViewState::Completed {
                    task_id,
                    title,
                    filename,
                } => {
                    println!("✅ Completed: {}", title.as_deref().unwrap_or(task_id));
                    if let Some(filename) = filename {
                        println!("file: {filename}");
                        println!("run `rushia save` to fetch it");
                    }
                }
                ViewState::Failed { task_id, message } => {
                    match task_id {
                        Some(task_id) => println!("❌ Failed ({task_id}): {message}"),
                        None => println!("❌ Failed: {message}"),
                    }
                }
            }
            Ok(())
        }
    }
}

/// Render the history table.
pub(crate) fn render_history(
    rows: &[HistoryRow],
    active_count: usize,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct HistoryDocument<'a> {
                active_count: usize,
                rows: &'a [HistoryRow],
            }
            print_json_pretty(&HistoryDocument { active_count, rows })
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No downloads in the last few hours.");
                return Ok(());
            }
            println!("{active_count} in progress");
            println!("{}", table_line(["ID", "FMT", "STATUS", "AGE", "ACTION", "TITLE"]));
            for row in rows {
                let label = row.label.to_string();
                let action = action_text(&row.action);
                println!(
                    "{}",
                    table_line([
                        &row.task_id,
                        row.format,
                        &label,
                        &row.age,
                        &action,
                        &row.title,
                    ])
                );
            }
            Ok(())
        }
    }
}

fn table_line([id, format, status, age, action, title]: [&str; 6]) -> String {
    format!("{id:<36} {format:<4} {status:<16} {age:<18} {action:<10} {title}")
}

/// Project `records` at `now` in ledger order.
pub(crate) fn history_rows(records: &[TaskRecord], now: DateTime<Utc>) -> Vec<HistoryRow> {
    records.iter().map(|record| project_record(record, now)).collect()
}

fn action_text(action: &RowAction) -> String {
    match action {
        RowAction::Download { .. } => "save".to_string(),
        RowAction::Progress { percent } => percent.clone(),
        RowAction::None => "-".to_string(),
    }
}

/// Render the session restore result.
pub(crate) fn render_restore(outcome: &RestoreOutcome, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Table => {
            match outcome {
                RestoreOutcome::AlreadyRan | RestoreOutcome::NoPointer => {
                    println!("No task to resume.");
                }
                RestoreOutcome::Expired { task_id } => {
                    println!("Task {task_id} is too old to resume; forgotten.");
                }
                RestoreOutcome::Discarded { task_id, .. } => {
                    println!("Task {task_id} could not be resumed; forgotten.");
                }
                RestoreOutcome::Completed { task_id }
                | RestoreOutcome::Failed { task_id }
                | RestoreOutcome::Resumed { task_id } => {
                    println!("Resumed task {task_id}.");
                }
            }
            Ok(())
        }
    }
}

/// Render the id of a freshly submitted task.
pub(crate) fn render_submitted(task_id: &str, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "task_id": task_id })),
        OutputFormat::Table => {
            println!("Task submitted (id: {task_id})");
            Ok(())
        }
    }
}

/// Render the service's view of one task.
pub(crate) fn render_status(
    task_id: &str,
    snapshot: &TaskSnapshot,
    format: OutputFormat,
) -> CliResult<()> {
    let view = project_progress(task_id, snapshot);
    match format {
        OutputFormat::Json => print_json_pretty(&serde_json::json!({
            "view": view,
            "filename": snapshot.filename,
            "error": snapshot.error_message,
        })),
        OutputFormat::Table => {
            println!("id: {task_id}");
            println!("{}", progress_line(&view));
            if let Some(filename) = &snapshot.filename {
                println!("file: {filename}");
            }
            if let Some(message) = &snapshot.error_message {
                println!("reason: {message}");
            }
            Ok(())
        }
    }
}

/// Render the id returned by a cookie upload.
pub(crate) fn render_cookie_uploaded(cookie_id: &str, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "cookie_id": cookie_id })),
        OutputFormat::Table => {
            println!("Cookie uploaded (id: {cookie_id})");
            Ok(())
        }
    }
}

/// Render a one-line acknowledgement.
pub(crate) fn render_notice(message: &str, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "message": message })),
        OutputFormat::Table => {
            println!("{message}");
            Ok(())
        }
    }
}

/// Render the result of saving an artifact.
pub(crate) fn render_saved(path: &Path, bytes: u64, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "bytes": bytes,
        })),
        OutputFormat::Table => {
            println!("Saved {} ({bytes} bytes)", path.display());
            Ok(())
        }
    }
}
