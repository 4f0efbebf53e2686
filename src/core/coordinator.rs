use std::sync::Arc;

use tracing::{error, info};

use crate::{
    error::{PileupError, PileupResult},
    persist::StoreHandle,
    qso::{AdvanceResult, CurrentQso},
    runtime::{
        broadcaster::Broadcaster,
        events::{Event, EventPayload, QueueAction},
    },
    types::{Callsign, LookupInfo, OperatorId, now},
};

use super::queue::QueueEngine;

/// Owner of the single current-QSO slot.
///
/// Slot states are `Empty` and `Occupied(callsign)`. [`QsoCoordinator::advance`]
/// moves `Empty -> Occupied` or `Occupied -> Occupied` when the queue has a
/// head, `Occupied -> Empty` when it does not. [`QsoCoordinator::complete`]
/// and status transitions move `Occupied -> Empty`.
#[derive(Clone)]
pub struct QsoCoordinator {
    store: StoreHandle,
    queue: QueueEngine,
    events: Arc<Broadcaster>,
}

impl QsoCoordinator {
    /// Couples the slot to `queue` for advancing.
    pub fn new(store: StoreHandle, queue: QueueEngine, events: Arc<Broadcaster>) -> Self {
        Self {
            store,
            queue,
            events,
        }
    }

    /// The queue this coordinator pulls from.
    pub fn queue(&self) -> &QueueEngine {
        &self.queue
    }

    /// Occupant of the slot, if any.
    pub async fn get_current(&self) -> PileupResult<Option<CurrentQso>> {
        self.store.call("get_current", |s| s.get_current()).await
    }

    /// Puts `callsign` in the slot, replacing any occupant.
    ///
    /// Does not consult the queue.
    pub async fn set_current(
        &self,
        callsign: Callsign,
        lookup: LookupInfo,
        operator: OperatorId,
    ) -> PileupResult<CurrentQso> {
        let qso = CurrentQso {
            callsign,
            started_at: now(),
            lookup,
            started_by: operator,
        };
        let doc = qso.clone();
        self.store
            .mutate("put_current", move |s| s.put_current(&doc))
            .await?;

        info!(callsign = %qso.callsign, operator = %qso.started_by, "current qso set");
        self.events
            .publish(Event::new(EventPayload::CurrentQso(Some(qso.clone()))));
        Ok(qso)
    }

    /// Empties the slot, returning what was there. Emits nothing.
    pub async fn clear_current(&self) -> PileupResult<Option<CurrentQso>> {
        self.store.mutate("take_current", |s| s.take_current()).await
    }

    /// Ends the current contact and promotes the head of the queue.
    pub async fn advance(&self, operator: OperatorId) -> PileupResult<AdvanceResult> {
        let cleared = self.clear_current().await?;
        let popped = match self.queue.dequeue_oldest().await {
            Ok(popped) => popped,
            Err(err) => {
                if let Some(qso) = &cleared {
                    error!(callsign = %qso.callsign, error = %err, "advance failed after clearing current qso");
                    self.events.publish(Event::new(EventPayload::CurrentQso(None)));
                }
                return Err(err);
            }
        };

        let Some(entry) = popped else {
            let Some(qso) = cleared else {
                return Err(PileupError::NothingToAdvance);
            };
            info!(cleared = %qso.callsign, %operator, "qso cleared, queue empty");
            self.events.publish(Event::new(EventPayload::CurrentQso(None)));
            return Ok(AdvanceResult {
                cleared: Some(qso),
                processed: None,
                current: None,
                remaining: 0,
            });
        };

        let lookup = if entry.lookup.is_empty() {
            LookupInfo::unavailable(&entry.callsign)
        } else {
            entry.lookup.clone()
        };
        let current = CurrentQso {
            callsign: entry.callsign.clone(),
            started_at: now(),
            lookup,
            started_by: operator,
        };
        let doc = current.clone();
        if let Err(err) = self
            .store
            .mutate("put_current", move |s| s.put_current(&doc))
            .await
        {
            error!(callsign = %entry.callsign, error = %err, "popped entry could not be promoted");
            self.queue
                .announce(QueueAction::Advance, Some(entry.callsign.clone()))
                .await;
            return Err(err);
        }

        let remaining = self.queue.count().await;
        info!(
            callsign = %current.callsign,
            cleared = cleared.as_ref().map(|q| q.callsign.as_str()),
            remaining,
            "advanced to next callsign"
        );

        self.events
            .publish(Event::new(EventPayload::CurrentQso(Some(current.clone()))));
        self.queue
            .announce(QueueAction::Advance, Some(entry.callsign.clone()))
            .await;

        Ok(AdvanceResult {
            cleared,
            processed: Some(entry),
            current: Some(current),
            remaining,
        })
    }

    /// Ends the current contact, leaving the slot empty.
    ///
    /// With an empty slot this returns `None` and touches nothing.
    pub async fn complete(&self, operator: OperatorId) -> PileupResult<Option<CurrentQso>> {
        let cleared = self.clear_current().await?;
        if let Some(qso) = &cleared {
            info!(callsign = %qso.callsign, %operator, "qso completed");
            self.events.publish(Event::new(EventPayload::CurrentQso(None)));
        }
        Ok(cleared)
    }
}
