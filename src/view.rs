//! Admin records view.
//!
//! [`ViewState`] is an immutable value; every event produces a new one via
//! [`ViewState::apply`]. [`RecordsView`] owns the event loop around it: it
//! loads on mount, re-loads on every change signal, and discards load
//! results that were superseded or timed out.

use crate::access::can_delete;
use crate::client::RecordStoreClient;
use crate::error::{ClientError, ClientResult};
use crate::export::export_csv;
use crate::feed::{ChangeKind, Subscription};
use crate::models::{Actor, SUBMISSIONS_TABLE, SubmissionRecord};
use crate::query::{Criteria, filter_sort};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Transient message shown to the admin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    /// Store failure; a manual refresh may succeed
    Retryable(String),
    AccessDenied(String),
    Invalid(String),
}

impl From<&ClientError> for Notice {
    fn from(err: &ClientError) -> Self {
        let message = err.to_string();
        match err {
            _ if err.is_retryable() => Notice::Retryable(message),
            ClientError::Validation(_) => Notice::Invalid(message),
            _ => Notice::AccessDenied(message),
        }
    }
}

#[derive(Debug)]
pub enum Update {
    LoadStarted,
    Loaded(Vec<SubmissionRecord>),
    LoadFailed(ClientError),
    CriteriaChanged(Criteria),
    DeleteRequested(String),
    DeleteCancelled,
    Deleted(String),
    OperationFailed(ClientError),
    DismissNotice,
}

/// Snapshot of everything the records browser renders
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Last successfully loaded list; replaced wholesale, never edited
    pub records: Arc<[SubmissionRecord]>,
    pub criteria: Criteria,
    pub loading: bool,
    pub notice: Option<Notice>,
    /// Id awaiting confirmation
    pub pending_delete: Option<String>,
}

impl ViewState {
    pub fn apply(&self, update: Update) -> ViewState {
        let mut next = self.clone();
        match update {
            Update::LoadStarted => next.loading = true,
            Update::Loaded(rows) => {
                next.records = rows.into();
                next.loading = false;
            }
            Update::LoadFailed(err) => {
                // Previous records stay on screen
                next.loading = false;
                next.notice = Some(Notice::from(&err));
            }
            Update::CriteriaChanged(criteria) => next.criteria = criteria,
            Update::DeleteRequested(id) => next.pending_delete = Some(id),
            Update::DeleteCancelled => next.pending_delete = None,
            Update::Deleted(id) => {
                next.records = self.records.iter().filter(|r| r.id != id).cloned().collect();
                next.pending_delete = None;
                next.notice = Some(Notice::Info("Submission deleted".to_string()));
            }
            Update::OperationFailed(err) => {
                next.pending_delete = None;
                next.notice = Some(Notice::from(&err));
            }
            Update::DismissNotice => next.notice = None,
        }
        next
    }

    /// Filtered and ordered rows for the current criteria
    pub fn visible(&self) -> Vec<SubmissionRecord> {
        filter_sort(&self.records, &self.criteria)
    }

    /// CSV of exactly what is visible
    pub fn export(&self) -> String {
        export_csv(&self.visible())
    }
}

enum ViewEvent {
    Loaded {
        generation: u64,
        result: ClientResult<Vec<SubmissionRecord>>,
    },
    Changed(ChangeKind),
}

struct PendingLoad {
    generation: u64,
    deadline: Instant,
}

/// What one turn of the event loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pumped {
    Idle,
    Reloaded,
    LoadFailed,
    /// A superseded or expired load result arrived and was dropped
    Discarded,
    Changed(ChangeKind),
    TimedOut,
}

pub struct RecordsView {
    client: RecordStoreClient,
    state: ViewState,
    events_tx: Sender<ViewEvent>,
    events_rx: Receiver<ViewEvent>,
    subscription: Option<Subscription>,
    generation: u64,
    pending: Option<PendingLoad>,
    load_timeout: Duration,
}

impl RecordsView {
    /// Subscribe to submission changes and start the first load
    pub fn mount(client: RecordStoreClient, load_timeout: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel();

        let notify_tx = events_tx.clone();
        let subscription = client.subscribe(SUBMISSIONS_TABLE, move |kind| {
            let _ = notify_tx.send(ViewEvent::Changed(kind));
        });

        let mut view = Self {
            client,
            state: ViewState::default(),
            events_tx,
            events_rx,
            subscription: Some(subscription),
            generation: 0,
            pending: None,
            load_timeout,
        };

        info!(timeout_ms = load_timeout.as_millis() as u64, "Records view mounted");
        view.refresh();
        view
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn update(&mut self, update: Update) {
        self.state = self.state.apply(update);
    }

    pub fn set_criteria(&mut self, criteria: Criteria) {
        self.update(Update::CriteriaChanged(criteria));
    }

    pub fn dismiss_notice(&mut self) {
        self.update(Update::DismissNotice);
    }

    /// Start a load, superseding any load still in flight
    pub fn refresh(&mut self) {
        self.generation += 1;
        let generation = self.generation;

        if let Some(old) = self.pending.replace(PendingLoad {
            generation,
            deadline: Instant::now() + self.load_timeout,
        }) {
            debug!(superseded = old.generation, generation, "Superseding pending load");
        }
        self.update(Update::LoadStarted);

        let client = self.client.clone();
        let tx = self.events_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("records-load-{}", generation))
            .spawn(move || {
                let result = client.load_submissions();
                let _ = tx.send(ViewEvent::Loaded { generation, result });
            });

        if let Err(e) = spawned {
            warn!(error = ?e, "Failed to start load");
            self.pending = None;
            self.update(Update::LoadFailed(ClientError::Fetch(format!("could not start load: {}", e))));
        }
    }

    /// Handle at most one event, waiting up to `wait` for it
    ///
    /// An idle wait also checks for writes from other processes; any found
    /// arrive as `Changed` on a later call.
    pub fn pump(&mut self, wait: Duration) -> Pumped {
        if self.expire_pending() {
            return Pumped::TimedOut;
        }

        let wait = match &self.pending {
            Some(p) => wait.min(p.deadline.saturating_duration_since(Instant::now())),
            None => wait,
        };

        match self.events_rx.recv_timeout(wait) {
            Ok(ViewEvent::Loaded { generation, result }) => self.on_loaded(generation, result),
            Ok(ViewEvent::Changed(kind)) => {
                debug!(?kind, "Submissions changed, reloading");
                self.refresh();
                Pumped::Changed(kind)
            }
            Err(RecvTimeoutError::Timeout) => {
                if self.expire_pending() {
                    return Pumped::TimedOut;
                }
                if let Err(e) = self.client.poll_changes() {
                    warn!(error = %e, "Failed to check for external writes");
                }
                Pumped::Idle
            }
            // The view holds a sender, so this only happens during teardown
            Err(RecvTimeoutError::Disconnected) => Pumped::Idle,
        }
    }

    /// Pump until no load is pending or `limit` elapses
    pub fn settle(&mut self, limit: Duration) -> Pumped {
        let deadline = Instant::now() + limit;
        let mut last = Pumped::Idle;
        while self.pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            last = self.pump(remaining);
        }
        last
    }

    fn on_loaded(&mut self, generation: u64, result: ClientResult<Vec<SubmissionRecord>>) -> Pumped {
        if self.pending.as_ref().map(|p| p.generation) != Some(generation) {
            debug!(generation, current = self.generation, "Discarding stale load result");
            return Pumped::Discarded;
        }
        self.pending = None;

        match result {
            Ok(rows) => {
                debug!(generation, count = rows.len(), "Load complete");
                self.update(Update::Loaded(rows));
                Pumped::Reloaded
            }
            Err(err) => {
                warn!(generation, error = %err, "Load failed");
                self.update(Update::LoadFailed(err));
                Pumped::LoadFailed
            }
        }
    }

    fn expire_pending(&mut self) -> bool {
        let expired = self.pending.as_ref().is_some_and(|p| Instant::now() >= p.deadline);
        if expired {
            if let Some(p) = self.pending.take() {
                warn!(generation = p.generation, "Load timed out");
            }
            self.update(Update::LoadFailed(ClientError::Timeout(self.load_timeout.as_secs())));
        }
        expired
    }

    // ========================================================================
    // Delete flow
    // ========================================================================

    pub fn request_delete(&mut self, id: &str) {
        self.update(Update::DeleteRequested(id.to_string()));
    }

    pub fn cancel_delete(&mut self) {
        self.update(Update::DeleteCancelled);
    }

    /// Delete the row awaiting confirmation. Returns true on success.
    ///
    /// Failures land in the notice; the record list is left as it was.
    pub fn confirm_delete(&mut self, actor: &Actor) -> bool {
        let Some(id) = self.state.pending_delete.clone() else {
            return false;
        };

        if !can_delete(actor.role) {
            self.update(Update::OperationFailed(ClientError::permission(format!(
                "{} role cannot delete submissions",
                actor.role
            ))));
            return false;
        }

        match self.client.delete_submission(actor, &id) {
            Ok(()) => {
                self.update(Update::Deleted(id));
                true
            }
            Err(err) => {
                self.update(Update::OperationFailed(err));
                false
            }
        }
    }

    /// Release the change subscription; later load results are dropped
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            info!("Records view torn down");
        }
    }
}

impl Drop for RecordsView {
    fn drop(&mut self) {
        self.release();
    }
}
