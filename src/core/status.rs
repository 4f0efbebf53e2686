use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::{PileupError, PileupResult},
    persist::StoreHandle,
    qso::{StatusChange, SystemStatus},
    runtime::{
        broadcaster::Broadcaster,
        events::{Event, EventPayload, QueueAction, QueueSnapshot, StatusSummary},
    },
    types::{OperatorId, now},
};

/// Owner of the active/inactive switch.
#[derive(Clone)]
pub struct StatusGate {
    store: StoreHandle,
    events: Arc<Broadcaster>,
    capacity: usize,
}

impl StatusGate {
    /// `capacity` is only echoed in the queue snapshot a transition emits.
    pub fn new(store: StoreHandle, events: Arc<Broadcaster>, capacity: usize) -> Self {
        Self {
            store,
            events,
            capacity,
        }
    }

    /// Current status; writes the inactive default the first time.
    pub async fn get(&self) -> PileupResult<SystemStatus> {
        let default = SystemStatus::initial(now());
        self.store
            .call("get_status", move |s| s.get_or_init_status(&default))
            .await
    }

    /// True only when the status can be read and says active.
    pub async fn is_active(&self) -> bool {
        match self.store.call("get_status", |s| s.get_status()).await {
            Ok(status) => status.is_some_and(|s| s.active),
            Err(err) => {
                warn!(error = %err, "status unreadable, treating system as inactive");
                false
            }
        }
    }

    /// Switches the system, wiping the queue and the current QSO first.
    ///
    /// Every transition starts a new operating session, activation included.
    /// If a later step fails after an earlier one applied, or a step's outcome
    /// is unknown, the error is [`PileupError::PartialStatusChange`] and
    /// whatever was already cleared is still announced.
    pub async fn set(&self, active: bool, operator: OperatorId) -> PileupResult<StatusChange> {
        let mut completed = Vec::new();

        let cleared_count = self
            .store
            .mutate("clear_queue", |s| s.delete_all_entries())
            .await
            .map_err(|err| partial(active, &completed, "clear_queue", err))?;
        completed.push("clear_queue");

        let cleared_qso = match self
            .store
            .mutate("clear_current_qso", |s| s.take_current())
            .await
        {
            Ok(qso) => qso,
            Err(err) => {
                self.announce_partial(cleared_count, false).await;
                return Err(partial(active, &completed, "clear_current_qso", err));
            }
        };
        completed.push("clear_current_qso");

        let status = SystemStatus {
            active,
            last_changed_at: now(),
            changed_by: operator,
        };
        let doc = status.clone();
        if let Err(err) = self
            .store
            .mutate("put_status", move |s| s.put_status(&doc))
            .await
        {
            self.announce_partial(cleared_count, cleared_qso.is_some())
                .await;
            return Err(partial(active, &completed, "put_status", err));
        }

        info!(
            active,
            operator = %status.changed_by,
            cleared_count,
            cleared_qso = cleared_qso.is_some(),
            "system status changed"
        );

        let change = StatusChange {
            status,
            cleared_count,
            cleared_qso,
        };
        self.events.publish(Event::new(EventPayload::Status(StatusSummary {
            active: change.status.active,
            updated_by: change.status.changed_by.clone(),
            cleared_count: change.cleared_count,
            cleared_qso: change.cleared_qso.is_some(),
        })));
        self.announce_cleared(
            change.cleared_count,
            change.cleared_qso.is_some(),
            change.status.active,
        );
        Ok(change)
    }

    async fn announce_partial(&self, cleared_count: usize, cleared_qso: bool) {
        let system_active = self.is_active().await;
        self.announce_cleared(cleared_count, cleared_qso, system_active);
    }

    fn announce_cleared(&self, cleared_count: usize, cleared_qso: bool, system_active: bool) {
        if cleared_count > 0 {
            self.events.publish(Event::new(EventPayload::Queue(QueueSnapshot {
                action: QueueAction::StatusChange,
                callsign: None,
                queue: Vec::new(),
                total: 0,
                max_size: self.capacity,
                system_active,
            })));
        }
        if cleared_qso {
            self.events.publish(Event::new(EventPayload::CurrentQso(None)));
        }
    }
}

fn partial(
    active: bool,
    completed: &[&'static str],
    failed: &'static str,
    err: PileupError,
) -> PileupError {
    if completed.is_empty() && !err.outcome_unknown() {
        return err;
    }
    warn!(active, ?completed, failed, error = %err, "status change partially applied");
    PileupError::PartialStatusChange {
        active,
        completed: completed.to_vec(),
        failed,
        reason: err.to_string(),
    }
}
