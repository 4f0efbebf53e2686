//! Queue engine, QSO coordinator, status gate and frequency board.

/// Current-QSO slot and the advance transition.
pub mod coordinator;
/// Operating frequency announcements.
pub mod frequency;
/// FIFO queue with derived positions.
pub mod queue;
/// Active/inactive switch.
pub mod status;

use std::sync::Arc;

use crate::{
    config::PileupConfig,
    persist::{PileupStore, StoreHandle},
    runtime::broadcaster::Broadcaster,
};

use self::{coordinator::QsoCoordinator, frequency::FrequencyBoard, queue::QueueEngine, status::StatusGate};

/// All components wired to one store and one broadcaster.
#[derive(Clone)]
pub struct Pileup {
    /// Active/inactive switch.
    pub status: StatusGate,
    /// Callsign queue.
    pub queue: QueueEngine,
    /// Current-QSO slot.
    pub qso: QsoCoordinator,
    /// Operating frequency.
    pub frequency: FrequencyBoard,
    /// Event hub shared by the components.
    pub events: Arc<Broadcaster>,
}

impl Pileup {
    /// Wires every component to `store`.
    pub fn new(store: Arc<dyn PileupStore>, config: &PileupConfig) -> Self {
        let events = Broadcaster::new(config.listener_buffer, config.listener_max_strikes);
        Self::with_broadcaster(store, config, events)
    }

    /// Same as [`Pileup::new`] with an existing hub.
    pub fn with_broadcaster(
        store: Arc<dyn PileupStore>,
        config: &PileupConfig,
        events: Arc<Broadcaster>,
    ) -> Self {
        let handle = StoreHandle::new(store, config.store_timeout);
        let status = StatusGate::new(handle.clone(), Arc::clone(&events), config.max_queue_size);
        let queue = QueueEngine::new(
            handle.clone(),
            status.clone(),
            Arc::clone(&events),
            config.max_queue_size,
        );
        let qso = QsoCoordinator::new(handle.clone(), queue.clone(), Arc::clone(&events));
        let frequency = FrequencyBoard::new(handle, Arc::clone(&events));
        Self {
            status,
            queue,
            qso,
            frequency,
            events,
        }
    }
}
