//! One-shot restoration of the followed task at startup.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::ledger::is_expired;
use crate::model::{RecordPatch, TaskStatus};
use crate::projector::project_progress;
use crate::tracker::{DEFAULT_FAILURE_MESSAGE, TrackerState, ViewState};

/// Why a persisted pointer was dropped during restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The service does not know the task.
    NotFound,
    /// The service could not be reached or answered garbage.
    Unreachable,
    /// The service reported a status the client does not understand.
    UnknownStatus(String),
}

/// Result of [`crate::Tracker::bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Restoration already happened for this tracker.
    AlreadyRan,
    /// Nothing was being followed.
    NoPointer,
    /// The pointer was older than the expiry window; no request was made.
    Expired {
        /// Discarded task.
        task_id: String,
    },
    /// The pointer was dropped after querying the service.
    Discarded {
        /// Discarded task.
        task_id: String,
        /// Why it was dropped.
        reason: DiscardReason,
    },
    /// The task finished while the client was away.
    Completed {
        /// Finished task.
        task_id: String,
    },
    /// The task failed while the client was away.
    Failed {
        /// Failed task.
        task_id: String,
    },
    /// The task is still running; active polling resumed.
    Resumed {
        /// Resumed task.
        task_id: String,
    },
}

impl RestoreOutcome {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyRan => "already_ran",
            Self::NoPointer => "no_pointer",
            Self::Expired { .. } => "expired",
            Self::Discarded { .. } => "discarded",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Resumed { .. } => "resumed",
        }
    }
}

fn discard(state: &TrackerState, task_id: String, reason: DiscardReason) -> RestoreOutcome {
    state.clear_pointer();
    RestoreOutcome::Discarded { task_id, reason }
}

/// Rebuild the view from the persisted pointer and the service's answer.
pub(crate) async fn restore_session(state: &TrackerState) -> RestoreOutcome {
    let pointer = match state.session.load_pointer() {
        Ok(Some(pointer)) => pointer,
        Ok(None) => return RestoreOutcome::NoPointer,
        Err(err) => {
            warn!(error = %err, "failed to read active task pointer");
            return RestoreOutcome::NoPointer;
        }
    };
    let task_id = pointer.task_id;

    if is_expired(pointer.saved_at, state.clock.now(), state.settings.expiry_window) {
        info!(task_id = %task_id, "active task pointer expired; discarding");
        state.clear_pointer();
        return RestoreOutcome::Expired { task_id };
    }

    let snapshot = match state.api.query(&task_id).await {
        Ok(snapshot) => snapshot,
        Err(TrackerError::NotFound { .. }) => {
            info!(task_id = %task_id, "restored task unknown to the service");
            return discard(state, task_id, DiscardReason::NotFound);
        }
        Err(err) => {
            warn!(task_id = %task_id, error = %err, "could not query restored task");
            return discard(state, task_id, DiscardReason::Unreachable);
        }
    };

    match &snapshot.status {
        TaskStatus::Unknown(raw) => {
            warn!(task_id = %task_id, status = %raw, "restored task has an unrecognised status");
            discard(state, task_id, DiscardReason::UnknownStatus(raw.clone()))
        }
        TaskStatus::Completed => {
            state.merge_record(&task_id, &RecordPatch::from_snapshot(&snapshot));
            state.set_view(ViewState::Completed {
                task_id: task_id.clone(),
                title: snapshot.title.clone(),
                filename: snapshot.filename.clone(),
            });
            RestoreOutcome::Completed { task_id }
        }
        TaskStatus::Error => {
            state.merge_record(&task_id, &RecordPatch::from_snapshot(&snapshot));
            state.clear_pointer();
            state.set_view(ViewState::Failed {
                task_id: Some(task_id.clone()),
                message: snapshot
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            });
            RestoreOutcome::Failed { task_id }
        }
        TaskStatus::Pending | TaskStatus::Downloading | TaskStatus::Processing => {
            state.merge_record(&task_id, &RecordPatch::from_snapshot(&snapshot));
            state.set_view(ViewState::Progress(project_progress(&task_id, &snapshot)));
            RestoreOutcome::Resumed { task_id }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_discriminators_are_stable() {
        assert_eq!(RestoreOutcome::NoPointer.as_str(), "no_pointer");
        let discarded = RestoreOutcome::Discarded {
            task_id: "t1".into(),
            reason: DiscardReason::UnknownStatus("paused".into()),
        };
        assert_eq!(discarded.as_str(), "discarded");
        let json = serde_json::to_value(&discarded).expect("serialize");
        assert_eq!(json["outcome"], "discarded");
        assert_eq!(json["reason"]["unknown_status"], "paused");
    }
}
