use std::path::{Path, PathBuf};

use anyhow::anyhow;
use rushia_tracker::{RestoreOutcome, TaskApi, ViewState};

use crate::cli::{SaveArgs, StatusArgs, WatchArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{settle, watch_until_settled};
use crate::output::{render_notice, render_restore, render_saved, render_status};

/// Restore the previously followed task and report (or keep watching) it.
pub(crate) async fn handle_resume(ctx: &AppContext, args: WatchArgs) -> CliResult<()> {
    let tracker = ctx.tracker();
    let outcome = tracker.bootstrap().await;
    render_restore(&outcome, ctx.output)?;

    let view = match outcome {
        RestoreOutcome::Resumed { .. } if args.watch => watch_until_settled(ctx, &tracker).await?,
        RestoreOutcome::Resumed { .. }
        | RestoreOutcome::Completed { .. }
        | RestoreOutcome::Failed { .. } => tracker.view(),
        _ => return Ok(()),
    };
    settle(&view, ctx)
}

pub(crate) async fn handle_status(ctx: &AppContext, args: StatusArgs) -> CliResult<()> {
    let snapshot = ctx.client.query(&args.task_id).await?;
    render_status(&args.task_id, &snapshot, ctx.output)
}

/// Download the completed artifact, then stop following the task.
pub(crate) async fn handle_save(ctx: &AppContext, args: SaveArgs) -> CliResult<()> {
    let tracker = ctx.tracker();
    tracker.bootstrap().await;

    let ViewState::Completed { filename, .. } = tracker.view() else {
        return Err(CliError::validation("No completed download to save"));
    };
    let filename = filename
        .ok_or_else(|| CliError::failure(anyhow!("the service did not report a filename")))?;

    let dest_dir = args.dest.unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&dest_dir).await.map_err(|err| {
        CliError::failure(anyhow!(
            "failed to create '{}': {err}",
            dest_dir.display()
        ))
    })?;
    let dest = dest_dir.join(local_name(&filename)?);

    let bytes = ctx.client.fetch_artifact(&filename, &dest).await?;
    tracker.acknowledge();
    render_saved(&dest, bytes, ctx.output)
}

/// Stop following the current task without touching the history.
pub(crate) fn handle_reset(ctx: &AppContext) -> CliResult<()> {
    ctx.tracker().reset();
    render_notice("Stopped following the current task.", ctx.output)
}

/// Final path component of a service-provided filename.
fn local_name(filename: &str) -> CliResult<&Path> {
    Path::new(filename)
        .file_name()
        .map(Path::new)
        .ok_or_else(|| CliError::failure(anyhow!("unusable artifact filename '{filename}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context_for, session_in};
    use httpmock::prelude::*;
    use rushia_tracker::ActiveTaskPointer;
    use serde_json::json;

    #[tokio::test]
    async fn save_fetches_artifact_and_forgets_the_task() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/status/t-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"status": "completed", "progress": 100, "filename": "Song.m4a"}));
        });
        let artifact = server.mock(|when, then| {
            when.method(GET).path("/api/download/Song.m4a");
            then.status(200).body("audio-bytes");
        });
        let state = tempfile::tempdir().expect("tempdir");
        let out = tempfile::tempdir().expect("tempdir");
        session_in(state.path())
            .save_pointer(&ActiveTaskPointer::new("t-1", chrono::Utc::now()))
            .expect("seed pointer");
        let ctx = context_for(&server, state.path());

        handle_save(
            &ctx,
            SaveArgs {
                dest: Some(out.path().to_path_buf()),
            },
        )
        .await
        .expect("save");

        artifact.assert();
        let saved = std::fs::read_to_string(out.path().join("Song.m4a")).expect("artifact");
        assert_eq!(saved, "audio-bytes");
        assert!(session_in(state.path()).load_pointer().expect("pointer").is_none());
    }

    #[tokio::test]
    async fn save_without_completed_task_is_rejected() {
        let server = MockServer::start_async().await;
        let state = tempfile::tempdir().expect("tempdir");
        let ctx = context_for(&server, state.path());

        let err = handle_save(&ctx, SaveArgs::default())
            .await
            .expect_err("nothing to save");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn status_of_unknown_task_fails() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/status/nope");
            then.status(404);
        });
        let state = tempfile::tempdir().expect("tempdir");
        let ctx = context_for(&server, state.path());

        let err = handle_status(
            &ctx,
            StatusArgs {
                task_id: "nope".into(),
            },
        )
        .await
        .expect_err("unknown task");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "Task no longer exists on the server");
    }

    #[tokio::test]
    async fn resume_reports_running_task_and_reset_clears_pointer() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/status/t-3");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"status": "downloading", "progress": 12.5}));
        });
        let state = tempfile::tempdir().expect("tempdir");
        session_in(state.path())
            .save_pointer(&ActiveTaskPointer::new("t-3", chrono::Utc::now()))
            .expect("seed pointer");
        let ctx = context_for(&server, state.path());

        handle_resume(&ctx, WatchArgs::default())
            .await
            .expect("resume without watching");
        assert!(session_in(state.path()).load_pointer().expect("pointer").is_some());

        handle_reset(&ctx).expect("reset");
        assert!(session_in(state.path()).load_pointer().expect("pointer").is_none());
        handle_resume(&ctx, WatchArgs::default())
            .await
            .expect("nothing to resume");
    }

    #[test]
    fn artifact_names_cannot_escape_the_destination() {
        assert_eq!(local_name("../../etc/passwd").expect("name"), Path::new("passwd"));
        assert!(local_name("..").is_err());
    }
}
