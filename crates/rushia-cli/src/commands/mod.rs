//! Command handlers grouped by concern.

pub(crate) mod cookie;
pub(crate) mod download;
pub(crate) mod history;
pub(crate) mod session;

use anyhow::anyhow;
use rushia_tracker::{Tracker, ViewState};
use tokio::signal;

use crate::client::{AppContext, CliError, CliResult};
use crate::output::{render_progress, render_view};

/// Render progress updates until the followed task settles or the user interrupts.
///
/// Returns the last view observed.
pub(crate) async fn watch_until_settled(ctx: &AppContext, tracker: &Tracker) -> CliResult<ViewState> {
    let mut views = tracker.watch_view();
    loop {
        let view = views.borrow_and_update().clone();
        let ViewState::Progress(progress) = &view else {
            return Ok(view);
        };
        render_progress(progress, ctx.output)?;

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(tracker.view());
                }
            }
            _ = signal::ctrl_c() => {
                eprintln!("Stopped watching; run `rushia resume` to pick the task up again.");
                return Ok(view);
            }
        }
    }
}

/// Render a final view, turning a failed task into a command failure.
pub(crate) fn settle(view: &ViewState, ctx: &AppContext) -> CliResult<()> {
    if let ViewState::Failed { message, .. } = view {
        return Err(CliError::failure(anyhow!(message.clone())));
    }
    render_view(view, ctx.output)
}
