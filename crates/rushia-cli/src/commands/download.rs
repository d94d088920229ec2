use rushia_tracker::{CookieApi, Tracker, ViewState};
use tracing::{debug, info};

use crate::cli::{DownloadArgs, WatchArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{settle, watch_until_settled};
use crate::output::render_submitted;

pub(crate) async fn handle_download(ctx: &AppContext, args: DownloadArgs) -> CliResult<()> {
    let cookie_id = match &args.cookie_file {
        Some(path) => {
            let cookie_id = ctx.client.upload_cookie(path).await?;
            info!(cookie_id = %cookie_id, "cookie file uploaded");
            Some(cookie_id)
        }
        None => args.cookie_id.clone(),
    };

    let tracker = ctx.tracker();
    let restored = tracker.bootstrap().await;
    debug!(outcome = restored.as_str(), "previous session loaded");

    let submitted = tracker
        .submit(&args.url, args.format.into(), cookie_id)
        .await;
    if !args.watch {
        let task_id = submitted?;
        return render_submitted(&task_id, ctx.output);
    }

    let mut attempts_left = args.retries;
    let mut submitted = submitted.map(drop);
    loop {
        let failure = match submitted {
            Ok(()) => match follow(ctx, &tracker).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            },
            Err(err) => CliError::from(err),
        };
        if attempts_left == 0 || matches!(failure, CliError::Validation(_)) {
            return Err(failure);
        }
        attempts_left -= 1;
        eprintln!(
            "attempt failed: {}; retrying ({attempts_left} retries left)",
            failure.display_message()
        );
        submitted = tracker.retry().await.map(drop);
    }
}

/// Resubmit the most recent task in the history.
pub(crate) async fn handle_retry(ctx: &AppContext, args: WatchArgs) -> CliResult<()> {
    let tracker = ctx.tracker();
    tracker.bootstrap().await;
    let latest = tracker
        .history()
        .into_iter()
        .next()
        .ok_or_else(|| CliError::validation("No recent download to retry"))?;

    let task_id = tracker.submit(&latest.url, latest.format, None).await?;
    if args.watch {
        follow(ctx, &tracker).await
    } else {
        render_submitted(&task_id, ctx.output)
    }
}

async fn follow(ctx: &AppContext, tracker: &Tracker) -> CliResult<()> {
    let view = watch_until_settled(ctx, tracker).await?;
    if let ViewState::Completed { task_id, .. } = &view {
        info!(task_id = %task_id, "download ready");
    }
    settle(&view, ctx)
}
