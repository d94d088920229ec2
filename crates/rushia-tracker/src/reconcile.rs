//! Polling loops keeping local state aligned with the service.
//!
//! # Design
//! - Each loop is a spawned task owned by a [`PollHandle`]; dropping or cancelling the
//!   handle stops it without aborting a request already in flight.
//! - Responses that arrive after cancellation are discarded via the relevance flag.
//! - An in-flight set keyed by task id keeps overlapping ticks (from either loop) from
//!   querying the same task twice.
//! - Missed ticks are skipped rather than replayed in a burst.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, warn};

use crate::error::TrackerError;
use crate::ledger::HistoryLedger;
use crate::model::RecordPatch;
use crate::tracker::TrackerState;

/// Relevance flag shared between a [`PollHandle`] and its loop.
#[derive(Clone)]
pub(crate) struct PollToken {
    live: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollToken {
    pub(crate) fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn is_relevant(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.wake.notify_one();
        }
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.live, &other.live)
    }

    async fn cancelled(&self) {
        self.wake.notified().await;
    }
}

/// Owner of one polling loop.
///
/// Cancellation is idempotent and happens automatically on drop.
pub struct PollHandle {
    token: PollToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(PollToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = PollToken::new();
        let task = tokio::spawn(body(token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    /// Stop the loop; a request already sent is left to finish and its result dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the loop is still running and relevant.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.token.is_relevant() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the loop to exit.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "polling task terminated abnormally");
        }
    }

    pub(crate) const fn token(&self) -> &PollToken {
        &self.token
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Set of task ids with a status query outstanding.
#[derive(Default)]
pub(crate) struct InFlight {
    ids: Mutex<HashSet<String>>,
}

/// Claim on one task id, released on drop.
pub(crate) struct InFlightClaim<'a> {
    ids: &'a Mutex<HashSet<String>>,
    task_id: String,
}

impl InFlight {
    pub(crate) fn claim(&self, task_id: &str) -> Option<InFlightClaim<'_>> {
        let inserted = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string());
        inserted.then(|| InFlightClaim {
            ids: &self.ids,
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

/// Whether a loop should keep going after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

async fn next_tick(ticker: &mut Interval, token: &PollToken) -> bool {
    tokio::select! {
        _ = ticker.tick() => token.is_relevant(),
        () = token.cancelled() => false,
    }
}

/// Start polling `task_id` as the followed task.
pub(crate) fn spawn_active(state: Arc<TrackerState>, task_id: String) -> PollHandle {
    let period = state.settings.active_poll_interval;
    PollHandle::spawn(move |token| async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        while next_tick(&mut ticker, &token).await {
            if poll_active_once(&state, &task_id, &token).await == Flow::Stop {
                break;
            }
        }
        state.release_active(&token);
        token.cancel();
        debug!(task_id = %task_id, "active polling stopped");
    })
}

/// Start reconciling the history: once immediately, then on the interval.
pub(crate) fn spawn_history(state: Arc<TrackerState>) -> PollHandle {
    let period = state.settings.history_poll_interval;
    PollHandle::spawn(move |token| async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        while next_tick(&mut ticker, &token).await {
            reconcile_history_once(&state, &token).await;
        }
        token.cancel();
        debug!("history polling stopped");
    })
}

/// One active-context tick.
pub(crate) async fn poll_active_once(
    state: &TrackerState,
    task_id: &str,
    token: &PollToken,
) -> Flow {
    let Some(_claim) = state.in_flight.claim(task_id) else {
        debug!(task_id, "status query still pending; skipping tick");
        return Flow::Continue;
    };
    let result = state.api.query(task_id).await;

    state
        .apply_if_current(token, || match result {
            Ok(snapshot) => state.apply_active_snapshot(task_id, &snapshot),
            Err(TrackerError::NotFound { .. }) => {
                state.resolve_active_missing(task_id);
                Flow::Stop
            }
            Err(err) => {
                warn!(task_id, error = %err, "active status query failed; retrying next tick");
                Flow::Continue
            }
        })
        .unwrap_or_else(|| {
            debug!(task_id, "discarding status for a cancelled poller");
            Flow::Stop
        })
}

/// One history-context tick; returns whether any record changed.
pub(crate) async fn reconcile_history_once(state: &TrackerState, token: &PollToken) -> bool {
    let followed = state.live_active_id();
    let candidates = state.read_ledger(HistoryLedger::pending_ids);
    let claims: Vec<_> = candidates
        .into_iter()
        .filter(|task_id| followed.as_deref() != Some(task_id.as_str()))
        .filter_map(|task_id| {
            state
                .in_flight
                .claim(&task_id)
                .map(|claim| (task_id, claim))
        })
        .collect();
    if claims.is_empty() {
        return false;
    }

    let results = join_all(claims.iter().map(|(task_id, _)| async move {
        (task_id.as_str(), state.api.query(task_id).await)
    }))
    .await;
    if !token.is_relevant() {
        debug!("discarding history results for a cancelled poller");
        return false;
    }

    let changed = state.update_ledger(|ledger| {
        let mut changed = false;
        for (task_id, result) in &results {
            match result {
                Ok(snapshot) => {
                    changed |= ledger.reconcile(task_id, &RecordPatch::from_snapshot(snapshot));
                }
                Err(TrackerError::NotFound { .. }) => {
                    changed |= ledger.mark_error(task_id);
                }
                Err(err) => {
                    warn!(task_id, error = %err, "history status query failed; retrying next tick");
                }
            }
        }
        changed
    });
    drop(claims);

    if changed {
        state.publish_history_changed();
    }
    changed
}
