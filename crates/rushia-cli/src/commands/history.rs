use rushia_events::{Event, EventStream};
use rushia_tracker::Tracker;
use tokio::signal;
use tokio::time::sleep;
use tracing::debug;

use crate::cli::HistoryArgs;
use crate::client::{AppContext, CliResult};
use crate::output::{history_rows, render_history};

pub(crate) async fn handle_history(ctx: &AppContext, args: HistoryArgs) -> CliResult<()> {
    let tracker = ctx.tracker();
    let restored = tracker.bootstrap().await;
    debug!(outcome = restored.as_str(), "history loaded");
    if !args.watch || tracker.active_count() == 0 {
        let changed = tracker.refresh_history().await;
        debug!(changed, "history reconciled");
        return render_current(ctx, &tracker);
    }

    let mut events = tracker.events().subscribe(None);
    tracker.show_history();
    loop {
        let interrupted = tokio::select! {
            () = next_history_change(&mut events) => false,
            () = sleep(ctx.config.history_poll_interval) => false,
            _ = signal::ctrl_c() => true,
        };
        if interrupted || tracker.active_count() == 0 {
            break;
        }
        render_current(ctx, &tracker)?;
    }
    tracker.hide_history();
    render_current(ctx, &tracker)
}

async fn next_history_change(events: &mut EventStream) {
    while let Some(envelope) = events.next().await {
        if matches!(envelope.event, Event::HistoryChanged { .. }) {
            return;
        }
    }
    std::future::pending::<()>().await;
}

fn render_current(ctx: &AppContext, tracker: &Tracker) -> CliResult<()> {
    let rows = history_rows(&tracker.history(), tracker.clock().now());
    render_history(&rows, tracker.active_count(), ctx.output)
}
