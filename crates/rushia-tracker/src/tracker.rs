//! Tracker facade and the shared state its loops operate on.
//!
//! # Design
//! - `TrackerState` is the only shared object; it is injected, never global.
//! - Locks are std mutexes held for short synchronous sections, never across an await.
//! - Lock order is `active` before `ledger`.
//! - The persisted history is reloaded under the ledger lock before every read
//!   and write, so trackers sharing a store never overwrite each other.
//! - The view is a `watch` channel; every change also lands on the event bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rushia_config::ClientConfig;
use rushia_config::defaults::{
    DEFAULT_ACTIVE_POLL_INTERVAL_MS, DEFAULT_EXPIRY_WINDOW_SECS, DEFAULT_HISTORY_POLL_INTERVAL_MS,
};
use rushia_events::{Event, EventBus};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{SubmitRequest, TaskApi};
use crate::clock::Clock;
use crate::error::TrackerResult;
use crate::ledger::HistoryLedger;
use crate::model::{
    ActiveTaskPointer, MediaFormat, RecordPatch, TaskRecord, TaskSnapshot, TaskStatus,
};
use crate::projector::{ProgressView, project_progress};
use crate::reconcile::{self, Flow, InFlight, PollHandle, PollToken};
use crate::restore::{self, RestoreOutcome};
use crate::store::{SessionStore, StateStore};

/// Message shown when the service reports a failure without detail.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Download failed";
/// Message shown when the followed task disappeared from the service.
pub const MISSING_TASK_MESSAGE: &str = "Task no longer exists on the server";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timing knobs for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Interval between active-task queries.
    pub active_poll_interval: Duration,
    /// Interval between history reconciliation passes.
    pub history_poll_interval: Duration,
    /// Age after which the pointer and history entries are discarded.
    pub expiry_window: chrono::Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            active_poll_interval: Duration::from_millis(DEFAULT_ACTIVE_POLL_INTERVAL_MS),
            history_poll_interval: Duration::from_millis(DEFAULT_HISTORY_POLL_INTERVAL_MS),
            expiry_window: i64::try_from(DEFAULT_EXPIRY_WINDOW_SECS)
                .map_or(chrono::Duration::MAX, chrono::Duration::seconds),
        }
    }
}

impl From<&ClientConfig> for TrackerSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            active_poll_interval: config.active_poll_interval,
            history_poll_interval: config.history_poll_interval,
            expiry_window: chrono::Duration::from_std(config.expiry_window)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

/// What the presentation layer should show for the followed task.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewState {
    /// Submission form; nothing followed.
    #[default]
    Idle,
    /// Task in progress.
    Progress(ProgressView),
    /// Artifact ready.
    Completed {
        /// Finished task.
        task_id: String,
        /// Media title when known.
        title: Option<String>,
        /// Artifact filename.
        filename: Option<String>,
    },
    /// Submission or task failed.
    Failed {
        /// Failed task, absent when submission itself failed.
        task_id: Option<String>,
        /// User-facing message.
        message: String,
    },
}

impl ViewState {
    /// Task the view refers to.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Progress(view) => Some(&view.task_id),
            Self::Completed { task_id, .. } => Some(task_id),
            Self::Failed { task_id, .. } => task_id.as_deref(),
        }
    }

    /// Whether the view shows a final result.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Task currently followed by the active poller.
struct ActiveTracking {
    task_id: String,
    token: PollToken,
}

/// State shared between the facade and its polling loops.
pub(crate) struct TrackerState {
    pub(crate) api: Arc<dyn TaskApi>,
    pub(crate) session: SessionStore,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: TrackerSettings,
    pub(crate) in_flight: InFlight,
    events: EventBus,
    ledger: Mutex<HistoryLedger>,
    view: watch::Sender<ViewState>,
    active: Mutex<Option<ActiveTracking>>,
}

impl TrackerState {
    pub(crate) fn publish(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        debug!(event_id = id, kind, "tracker event published");
    }

    pub(crate) fn set_view(&self, view: ViewState) {
        self.view.send_replace(view);
    }

    /// Lock the ledger after reloading it from the store.
    ///
    /// The store is the source of truth; another tracker sharing it may have
    /// written since our last look. On a read failure the cached copy is kept.
    fn synced_ledger(&self) -> MutexGuard<'_, HistoryLedger> {
        let mut ledger = lock(&self.ledger);
        match self.session.load_history() {
            Ok(records) => *ledger = HistoryLedger::from_records(records, ledger.window()),
            Err(err) => warn!(error = %err, "failed to reload history; using cached copy"),
        }
        ledger
    }

    pub(crate) fn read_ledger<R>(&self, read: impl FnOnce(&HistoryLedger) -> R) -> R {
        read(&self.synced_ledger())
    }

    /// Reload, run `update`, and persist the ledger when it reports a change.
    pub(crate) fn update_ledger(&self, update: impl FnOnce(&mut HistoryLedger) -> bool) -> bool {
        let mut ledger = self.synced_ledger();
        let changed = update(&mut ledger);
        if changed && let Err(err) = self.session.save_history(ledger.records()) {
            warn!(error = %err, "failed to persist history");
        }
        changed
    }

    pub(crate) fn merge_record(&self, task_id: &str, patch: &RecordPatch) -> bool {
        self.update_ledger(|ledger| ledger.update(task_id, patch))
    }

    pub(crate) fn clear_pointer(&self) {
        if let Err(err) = self.session.clear_pointer() {
            warn!(error = %err, "failed to clear active task pointer");
        }
    }

    fn history_counts(&self) -> (usize, usize) {
        self.read_ledger(|ledger| (ledger.active_count(), ledger.len()))
    }

    pub(crate) fn publish_history_changed(&self) {
        let (active_count, records) = self.history_counts();
        self.publish(Event::HistoryChanged {
            active_count,
            records,
        });
    }

    /// Id followed by a live active poller, if any.
    pub(crate) fn live_active_id(&self) -> Option<String> {
        lock(&self.active)
            .as_ref()
            .filter(|tracking| tracking.token.is_relevant())
            .map(|tracking| tracking.task_id.clone())
    }

    /// Run `apply` only if `token` still belongs to the live poller.
    pub(crate) fn apply_if_current<R>(
        &self,
        token: &PollToken,
        apply: impl FnOnce() -> R,
    ) -> Option<R> {
        let _active = lock(&self.active);
        token.is_relevant().then(apply)
    }

    fn track_active(&self, task_id: &str, token: PollToken) {
        *lock(&self.active) = Some(ActiveTracking {
            task_id: task_id.to_string(),
            token,
        });
    }

    /// Forget the tracking entry if it still belongs to `token`.
    pub(crate) fn release_active(&self, token: &PollToken) {
        let mut active = lock(&self.active);
        if active
            .as_ref()
            .is_some_and(|tracking| tracking.token.same_as(token))
        {
            *active = None;
        }
    }

    fn cancel_active(&self) {
        if let Some(tracking) = lock(&self.active).take() {
            tracking.token.cancel();
        }
    }

    /// Fold a successful active query into the view and ledger.
    pub(crate) fn apply_active_snapshot(&self, task_id: &str, snapshot: &TaskSnapshot) -> Flow {
        self.merge_record(task_id, &RecordPatch::from_snapshot(snapshot));
        match &snapshot.status {
            TaskStatus::Completed => {
                info!(task_id, filename = ?snapshot.filename, "task completed");
                self.set_view(ViewState::Completed {
                    task_id: task_id.to_string(),
                    title: snapshot.title.clone(),
                    filename: snapshot.filename.clone(),
                });
                self.publish(Event::ActiveCompleted {
                    task_id: task_id.to_string(),
                    filename: snapshot.filename.clone(),
                    title: snapshot.title.clone(),
                });
                Flow::Stop
            }
            TaskStatus::Error => {
                let message = snapshot
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                warn!(task_id, message = %message, "task failed");
                self.clear_pointer();
                self.set_view(ViewState::Failed {
                    task_id: Some(task_id.to_string()),
                    message: message.clone(),
                });
                self.publish(Event::ActiveFailed {
                    task_id: Some(task_id.to_string()),
                    message,
                });
                Flow::Stop
            }
            status => {
                self.set_view(ViewState::Progress(project_progress(task_id, snapshot)));
                self.publish(Event::ActiveProgress {
                    task_id: task_id.to_string(),
                    status: status.to_string(),
                    progress: snapshot.progress,
                });
                Flow::Continue
            }
        }
    }

    /// The followed task vanished from the service.
    pub(crate) fn resolve_active_missing(&self, task_id: &str) {
        warn!(task_id, "followed task no longer exists");
        self.clear_pointer();
        self.update_ledger(|ledger| ledger.mark_error(task_id));
        self.set_view(ViewState::Failed {
            task_id: Some(task_id.to_string()),
            message: MISSING_TASK_MESSAGE.to_string(),
        });
        self.publish(Event::ActiveFailed {
            task_id: Some(task_id.to_string()),
            message: MISSING_TASK_MESSAGE.to_string(),
        });
    }
}

/// Client-side controller for download tasks.
///
/// Owns the polling handles; dropping the tracker stops both loops.
pub struct Tracker {
    state: Arc<TrackerState>,
    active_poll: Mutex<Option<PollHandle>>,
    history_poll: Mutex<Option<PollHandle>>,
    restored: AtomicBool,
    last_submission: Mutex<Option<SubmitRequest>>,
}

impl Tracker {
    /// Build a tracker over `api` and `store`.
    #[must_use]
    pub fn new(
        api: Arc<dyn TaskApi>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        Self::with_events(api, store, clock, settings, EventBus::new())
    }

    /// Build a tracker publishing on an existing event bus.
    #[must_use]
    pub fn with_events(
        api: Arc<dyn TaskApi>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
        events: EventBus,
    ) -> Self {
        let state = TrackerState {
            api,
            session: SessionStore::new(store),
            clock,
            settings,
            in_flight: InFlight::default(),
            events,
            ledger: Mutex::new(HistoryLedger::new(settings.expiry_window)),
            view: watch::Sender::new(ViewState::Idle),
            active: Mutex::new(None),
        };
        Self {
            state: Arc::new(state),
            active_poll: Mutex::new(None),
            history_poll: Mutex::new(None),
            restored: AtomicBool::new(false),
            last_submission: Mutex::new(None),
        }
    }

    /// Purge expired history, then restore the previous session.
    ///
    /// Only the first call does any work; later calls return
    /// [`RestoreOutcome::AlreadyRan`].
    pub async fn bootstrap(&self) -> RestoreOutcome {
        if self.restored.swap(true, Ordering::SeqCst) {
            return RestoreOutcome::AlreadyRan;
        }

        let now = self.state.clock.now();
        let mut purged = 0;
        self.state.update_ledger(|ledger| {
            purged = ledger.purge_expired(now);
            purged > 0
        });
        if purged > 0 {
            info!(purged, "expired history entries removed");
        }
        self.state.publish_history_changed();

        let outcome = restore::restore_session(&self.state).await;
        if let RestoreOutcome::Resumed { task_id } = &outcome {
            self.start_active_polling(task_id);
        }
        info!(outcome = outcome.as_str(), "session restore finished");
        self.state.publish(Event::SessionRestored {
            outcome: outcome.as_str().to_string(),
        });
        outcome
    }

    /// Submit a new task and start following it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::Validation`] for a blank URL (no request is made),
    /// or the client error when the service rejects or cannot be reached.
    pub async fn submit(
        &self,
        url: &str,
        format: MediaFormat,
        cookie_id: Option<String>,
    ) -> TrackerResult<String> {
        let request = SubmitRequest::new(url, format, cookie_id)?;
        *lock(&self.last_submission) = Some(request.clone());
        self.submit_request(&request).await
    }

    /// Re-submit the last submission, or return to the form when there is none.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Tracker::submit`].
    pub async fn retry(&self) -> TrackerResult<Option<String>> {
        let last = lock(&self.last_submission).clone();
        match last {
            Some(request) => self.submit_request(&request).await.map(Some),
            None => {
                self.back_to_form();
                Ok(None)
            }
        }
    }

    async fn submit_request(&self, request: &SubmitRequest) -> TrackerResult<String> {
        self.stop_active_polling();
        let task_id = match self.state.api.submit(request).await {
            Ok(task_id) => task_id,
            Err(err) => {
                warn!(error = %err, "task submission failed");
                let message = err.user_message();
                self.state.set_view(ViewState::Failed {
                    task_id: None,
                    message: message.clone(),
                });
                self.state.publish(Event::ActiveFailed {
                    task_id: None,
                    message,
                });
                return Err(err);
            }
        };

        let now = self.state.clock.now();
        if let Err(err) = self
            .state
            .session
            .save_pointer(&ActiveTaskPointer::new(&task_id, now))
        {
            warn!(task_id = %task_id, error = %err, "failed to persist active task pointer");
        }
        self.state.update_ledger(|ledger| {
            ledger.add(TaskRecord::pending(
                &task_id,
                request.url(),
                request.format(),
                now,
            ));
            true
        });
        self.state.set_view(ViewState::Progress(project_progress(
            &task_id,
            &TaskSnapshot::default(),
        )));
        info!(task_id = %task_id, format = %request.format(), "task submitted");
        self.state.publish(Event::TaskSubmitted {
            task_id: task_id.clone(),
            url: request.url().to_string(),
            format: request.format().wire().to_string(),
        });
        self.state.publish_history_changed();
        self.start_active_polling(&task_id);
        Ok(task_id)
    }

    /// Acknowledge a completed task (its artifact was saved) and forget the pointer.
    ///
    /// Returns the acknowledged task id; the completed view stays in place.
    pub fn acknowledge(&self) -> Option<String> {
        let ViewState::Completed { task_id, .. } = self.view() else {
            return None;
        };
        self.stop_active_polling();
        self.state.clear_pointer();
        self.state.publish(Event::ActiveCleared {
            task_id: task_id.clone(),
        });
        Some(task_id)
    }

    /// Stop following the current task and return to the submission form.
    pub fn back_to_form(&self) {
        self.stop_active_polling();
        self.state.clear_pointer();
        let previous = self.view();
        self.state.set_view(ViewState::Idle);
        if let Some(task_id) = previous.task_id() {
            self.state.publish(Event::ActiveCleared {
                task_id: task_id.to_string(),
            });
        }
    }

    /// Like [`Tracker::back_to_form`], also forgetting the last submission.
    pub fn reset(&self) {
        self.back_to_form();
        *lock(&self.last_submission) = None;
    }

    /// Start reconciling the history (replacing any running history loop).
    pub fn show_history(&self) {
        let mut slot = lock(&self.history_poll);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(reconcile::spawn_history(Arc::clone(&self.state)));
    }

    /// Run a single history reconciliation pass outside the polling loop.
    ///
    /// Returns whether any record changed.
    pub async fn refresh_history(&self) -> bool {
        reconcile::reconcile_history_once(&self.state, &PollToken::new()).await
    }

    /// Stop reconciling the history.
    pub fn hide_history(&self) {
        if let Some(handle) = lock(&self.history_poll).take() {
            handle.cancel();
        }
    }

    /// Whether the history loop is running.
    #[must_use]
    pub fn is_history_visible(&self) -> bool {
        lock(&self.history_poll)
            .as_ref()
            .is_some_and(PollHandle::is_live)
    }

    /// Whether the active-task loop is running.
    #[must_use]
    pub fn is_polling_active(&self) -> bool {
        lock(&self.active_poll)
            .as_ref()
            .is_some_and(PollHandle::is_live)
    }

    fn start_active_polling(&self, task_id: &str) {
        let mut slot = lock(&self.active_poll);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        self.state.cancel_active();
        let handle = reconcile::spawn_active(Arc::clone(&self.state), task_id.to_string());
        self.state.track_active(task_id, handle.token().clone());
        *slot = Some(handle);
    }

    fn stop_active_polling(&self) {
        self.state.cancel_active();
        if let Some(handle) = lock(&self.active_poll).take() {
            handle.cancel();
        }
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> ViewState {
        self.state.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn watch_view(&self) -> watch::Receiver<ViewState> {
        self.state.view.subscribe()
    }

    /// History records, most recent first.
    #[must_use]
    pub fn history(&self) -> Vec<TaskRecord> {
        self.state.read_ledger(|ledger| ledger.records().to_vec())
    }

    /// Number of history records still in progress.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.read_ledger(HistoryLedger::active_count)
    }

    /// Event bus the tracker publishes on.
    #[must_use]
    pub fn events(&self) -> EventBus {
        self.state.events.clone()
    }

    /// Persisted active pointer, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::Store`] when the backend fails.
    pub fn active_pointer(&self) -> TrackerResult<Option<ActiveTaskPointer>> {
        self.state.session.load_pointer()
    }

    /// Timing knobs in effect.
    #[must_use]
    pub fn settings(&self) -> TrackerSettings {
        self.state.settings
    }

    /// Clock used for expiry and relative times.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.state.clock)
    }
}
