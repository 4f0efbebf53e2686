use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::{PileupError, PileupResult},
    persist::StoreHandle,
    qso::{QueueDraft, QueueEntry},
    runtime::{
        broadcaster::Broadcaster,
        events::{Event, EventPayload, QueueAction, QueueSnapshot},
    },
    types::{Callsign, LookupInfo, now},
};

use super::status::StatusGate;

/// FIFO queue of callsigns waiting for a contact.
///
/// Positions are never stored. Every read ranks the entries present at that
/// moment by `(enqueued_at, seq)`, so removals never leave gaps behind.
#[derive(Clone)]
pub struct QueueEngine {
    store: StoreHandle,
    status: StatusGate,
    events: Arc<Broadcaster>,
    capacity: usize,
}

impl QueueEngine {
    /// Creates an engine admitting at most `capacity` entries.
    pub fn new(
        store: StoreHandle,
        status: StatusGate,
        events: Arc<Broadcaster>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            status,
            events,
            capacity,
        }
    }

    /// Configured maximum queue size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The status gate consulted on registration.
    pub fn status(&self) -> &StatusGate {
        &self.status
    }

    /// Adds `callsign` to the tail of the queue.
    pub async fn register(&self, callsign: Callsign, lookup: LookupInfo) -> PileupResult<QueueEntry> {
        if !self.status.is_active().await {
            return Err(PileupError::SystemInactive);
        }

        let call = callsign.clone();
        let existing = self
            .store
            .call("find_entry", move |s| s.find_entry(&call))
            .await?;
        if existing.is_some() {
            return Err(PileupError::AlreadyQueued(callsign));
        }

        let count = self.store.call("count_entries", |s| s.count_entries()).await?;
        if count >= self.capacity {
            return Err(PileupError::QueueFull {
                capacity: self.capacity,
            });
        }

        let draft = QueueDraft {
            callsign,
            enqueued_at: now(),
            lookup,
        };
        let record = self
            .store
            .mutate("insert_entry", move |s| s.insert_entry(draft))
            .await?;
        let entry = record.at_position(count + 1);

        info!(callsign = %entry.callsign, position = entry.position, "callsign registered");
        self.announce(QueueAction::Register, Some(entry.callsign.clone()))
            .await;
        Ok(entry)
    }

    /// Looks up `callsign` with its position as of now.
    pub async fn find(&self, callsign: &Callsign) -> PileupResult<Option<QueueEntry>> {
        let call = callsign.clone();
        self.store
            .call("find_entry", move |s| {
                let Some(record) = s.find_entry(&call)? else {
                    return Ok(None);
                };
                let ahead = s.count_entries_before(&record)?;
                Ok(Some(record.at_position(ahead + 1)))
            })
            .await
    }

    /// Whole queue in FIFO order, positions `1..=N`.
    pub async fn list(&self) -> PileupResult<Vec<QueueEntry>> {
        let records = self.store.call("list_entries", |s| s.list_entries()).await?;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(idx, record)| record.at_position(idx + 1))
            .collect())
    }

    /// Removes `callsign`, returning it with the position it held.
    pub async fn remove(&self, callsign: &Callsign) -> PileupResult<Option<QueueEntry>> {
        let call = callsign.clone();
        let removed = self
            .store
            .mutate("delete_entry", move |s| {
                let ahead = match s.find_entry(&call)? {
                    Some(record) => s.count_entries_before(&record)?,
                    None => 0,
                };
                Ok(s.delete_entry(&call)?.map(|record| record.at_position(ahead + 1)))
            })
            .await?;

        if let Some(entry) = &removed {
            info!(callsign = %entry.callsign, "callsign removed from queue");
            self.announce(QueueAction::Remove, Some(entry.callsign.clone()))
                .await;
        }
        Ok(removed)
    }

    /// Empties the queue, returning how many entries were dropped.
    pub async fn clear(&self) -> PileupResult<usize> {
        let cleared = self
            .store
            .mutate("delete_all_entries", |s| s.delete_all_entries())
            .await?;
        info!(cleared, "queue cleared");
        self.announce(QueueAction::Clear, None).await;
        Ok(cleared)
    }

    /// Pops the head of the queue. Emits nothing; the caller reports the move.
    pub async fn dequeue_oldest(&self) -> PileupResult<Option<QueueEntry>> {
        let record = self
            .store
            .mutate("pop_oldest_entry", |s| s.pop_oldest_entry())
            .await?;
        Ok(record.map(|record| record.at_position(1)))
    }

    /// Number of queued entries, 0 if the store cannot be reached.
    pub async fn count(&self) -> usize {
        match self.store.call("count_entries", |s| s.count_entries()).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "queue count unavailable, reporting 0");
                0
            }
        }
    }

    /// Current queue state as carried by queue-update events.
    pub async fn snapshot(
        &self,
        action: QueueAction,
        callsign: Option<Callsign>,
    ) -> PileupResult<QueueSnapshot> {
        let queue = self.list().await?;
        Ok(QueueSnapshot {
            action,
            callsign,
            total: queue.len(),
            queue,
            max_size: self.capacity,
            system_active: self.status.is_active().await,
        })
    }

    pub(crate) async fn announce(&self, action: QueueAction, callsign: Option<Callsign>) {
        match self.snapshot(action, callsign).await {
            Ok(snapshot) => self.events.publish(Event::new(EventPayload::Queue(snapshot))),
            Err(err) => warn!(error = %err, ?action, "queue update not broadcast"),
        }
    }
}
