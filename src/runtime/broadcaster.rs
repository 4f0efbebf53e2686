//! Best-effort fan-out of [`Event`]s to subscribed listeners.
//!
//! Each listener owns a bounded channel. [`Broadcaster::publish`] never waits
//! on a listener: a full buffer earns the listener a strike, a closed one is
//! removed on the spot, and a listener that overflows `max_strikes` times in a
//! row is dropped. Nothing here ever reports failure to the publisher.

use std::sync::{
    Arc, Mutex, MutexGuard, Weak,
    atomic::{AtomicU64, Ordering},
};

use hashbrown::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::events::Event;

/// Registry key of a listener.
pub type ListenerId = u64;

struct Slot {
    tx: mpsc::Sender<Event>,
    strikes: u32,
}

/// Fan-out hub.
pub struct Broadcaster {
    listeners: Mutex<HashMap<ListenerId, Slot>>,
    next_id: AtomicU64,
    buffer: usize,
    max_strikes: u32,
}

impl Broadcaster {
    /// Creates a hub whose listeners buffer `buffer` events each.
    pub fn new(buffer: usize, max_strikes: u32) -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            max_strikes: max_strikes.max(1),
        })
    }

    /// Registers a new listener.
    pub fn subscribe(self: &Arc<Self>) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let total = {
            let mut listeners = self.lock();
            listeners.insert(id, Slot { tx, strikes: 0 });
            listeners.len()
        };
        debug!(listener = id, total, "listener subscribed");
        Listener {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let (removed, total) = {
            let mut listeners = self.lock();
            let removed = listeners.remove(&id).is_some();
            (removed, listeners.len())
        };
        if removed {
            debug!(listener = id, total, "listener unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every listener without waiting on any of them.
    pub fn publish(&self, event: Event) {
        let kind = event.kind().as_str();
        let mut listeners = self.lock();
        if listeners.is_empty() {
            debug!(kind, "no event listeners");
            return;
        }

        let max_strikes = self.max_strikes;
        listeners.retain(|id, slot| match slot.tx.try_send(event.clone()) {
            Ok(()) => {
                slot.strikes = 0;
                true
            }
            Err(TrySendError::Full(_)) => {
                slot.strikes += 1;
                if slot.strikes >= max_strikes {
                    warn!(listener = *id, kind, strikes = slot.strikes, "dropping stalled listener");
                    false
                } else {
                    debug!(listener = *id, kind, strikes = slot.strikes, "listener buffer full, event skipped");
                    true
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(listener = *id, kind, "dropping disconnected listener");
                false
            }
        });
    }

    /// Drops listeners whose receiving side has gone away.
    pub fn prune_closed(&self) -> usize {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|_, slot| !slot.tx.is_closed());
        before - listeners.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ListenerId, Slot>> {
        // Registry state stays consistent even if a holder panicked.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a subscription. Unsubscribes when dropped.
pub struct Listener {
    id: ListenerId,
    rx: mpsc::Receiver<Event>,
    hub: Weak<Broadcaster>,
}

impl Listener {
    /// Registry key.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next event; `None` once the listener was dropped from the hub.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Removes this listener from the hub. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::events::EventPayload;

    fn event() -> Event {
        Event::new(EventPayload::CurrentQso(None))
    }

    #[tokio::test]
    async fn every_listener_gets_the_same_event() {
        let hub = Broadcaster::new(8, 3);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let sent = event();
        hub.publish(sent.clone());

        assert_eq!(a.recv().await, Some(sent.clone()));
        assert_eq!(b.recv().await, Some(sent));
    }

    #[test]
    fn publish_without_listeners_is_a_no_op() {
        let hub = Broadcaster::new(8, 3);
        hub.publish(event());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = Broadcaster::new(8, 3);
        let listener = hub.subscribe();
        let id = listener.id();

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        listener.unsubscribe();
        drop(listener);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn stalled_listener_is_dropped_after_max_strikes() {
        let hub = Broadcaster::new(1, 2);
        let mut stalled = hub.subscribe();
        let mut healthy = hub.subscribe();

        hub.publish(event());
        assert!(healthy.try_recv().is_some());
        hub.publish(event());
        assert!(healthy.try_recv().is_some());
        assert_eq!(hub.listener_count(), 2, "first overflow is a strike only");
        hub.publish(event());
        assert!(healthy.try_recv().is_some());

        assert_eq!(hub.listener_count(), 1);
        assert!(stalled.try_recv().is_some(), "buffered event still readable");
        assert!(stalled.try_recv().is_none());
    }

    #[test]
    fn successful_delivery_resets_strikes() {
        let hub = Broadcaster::new(1, 2);
        let mut slow = hub.subscribe();

        hub.publish(event());
        hub.publish(event());
        assert!(slow.try_recv().is_some());
        hub.publish(event());
        hub.publish(event());

        assert_eq!(hub.listener_count(), 1, "strike count restarted after delivery");
    }

    #[test]
    fn closed_listener_is_removed_on_publish() {
        let hub = Broadcaster::new(4, 3);
        let mut listener = hub.subscribe();
        listener.rx.close();

        hub.publish(event());
        assert_eq!(hub.listener_count(), 0);
        listener.unsubscribe();
    }
}
