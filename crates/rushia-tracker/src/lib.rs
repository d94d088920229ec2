#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Client-side tracking of remote media-download tasks.
//!
//! Layout:
//! - `model.rs`: statuses, formats, history records and patches
//! - `store.rs`: persistent key/value backends and the typed session layer
//! - `ledger.rs`: the deduplicated, expiring history ledger
//! - `client.rs`: HTTP client for the download service
//! - `reconcile.rs`: cancellable polling loops for the active task and the history
//! - `restore.rs`: one-shot session restoration at startup
//! - `projector.rs`: pure mapping from raw status fields to display strings
//! - `tracker.rs`: the facade tying the pieces together

pub mod client;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod model;
pub mod projector;
pub mod reconcile;
pub mod restore;
pub mod store;
pub mod tracker;

pub use client::{CookieApi, HttpTaskClient, SubmitRequest, TaskApi, clear_cookie};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{TrackerError, TrackerResult};
pub use ledger::HistoryLedger;
pub use model::{ActiveTaskPointer, MediaFormat, RecordPatch, TaskRecord, TaskSnapshot, TaskStatus};
pub use projector::{HistoryRow, ProgressView, RowAction, StatusLabel};
pub use reconcile::PollHandle;
pub use restore::{DiscardReason, RestoreOutcome};
pub use store::{FileStore, HISTORY_KEY, MemoryStore, SessionStore, StateStore, TASK_KEY};
pub use tracker::{Tracker, TrackerSettings, ViewState};
